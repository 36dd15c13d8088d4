//! Typed client for the projector read API.

use futures_util::Stream;
use reqwest::Client;
use url::Url;

use super::stream::{intent_stream, snapshot_stream};
use super::{ClientError, parse_response};
use crate::objects::{
    ActionIntent, ChangeAgentRequest, FlowView, FlowsQuery, IntentEnvelope, IntentReceipt,
    ProjectionQuery, SnapshotResponse, SuperTokenView,
};

/// Typed HTTP client for the flowlens API.
#[derive(Debug, Clone)]
pub struct ProjectorClient {
    http: Client,
    base_url: Url,
}

impl ProjectorClient {
    /// Create a new `ProjectorClient`.
    ///
    /// * `base_url` – root URL of the flowlens server (e.g. `http://127.0.0.1:8080`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/v1/state` – the snapshot projected to `at` (server time if `None`).
    pub async fn state(&self, at: Option<u64>) -> Result<SnapshotResponse, ClientError> {
        let url = self.base_url.join("/api/v1/state")?;
        let resp = self
            .http
            .get(url)
            .query(&ProjectionQuery { at })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/tokens/{address}` – one super token.
    pub async fn token(
        &self,
        address: &str,
        at: Option<u64>,
    ) -> Result<SuperTokenView, ClientError> {
        let url = self.base_url.join(&format!("/api/v1/tokens/{address}"))?;
        let resp = self
            .http
            .get(url)
            .query(&ProjectionQuery { at })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/flows` – flows matching `query`.
    pub async fn flows(&self, query: &FlowsQuery) -> Result<Vec<FlowView>, ClientError> {
        let url = self.base_url.join("/api/v1/flows")?;
        let resp = self.http.get(url).query(query).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/agent` – switch the tracked agent.
    ///
    /// Returns once the projector runs subscriptions for the new agent.
    pub async fn change_agent(&self, address: &str) -> Result<SnapshotResponse, ClientError> {
        let url = self.base_url.join("/api/v1/agent")?;
        let resp = self
            .http
            .post(url)
            .json(&ChangeAgentRequest {
                address: address.to_owned(),
            })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/intents` – hand an action to the signing layer.
    pub async fn submit_intent(&self, intent: &ActionIntent) -> Result<IntentReceipt, ClientError> {
        let url = self.base_url.join("/api/v1/intents")?;
        let resp = self.http.post(url).json(intent).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/state/ws` – snapshots as they are produced.
    pub async fn stream_state(
        &self,
    ) -> Result<impl Stream<Item = Result<SnapshotResponse, ClientError>>, ClientError> {
        snapshot_stream(self.ws_url("/api/v1/state/ws")?).await
    }

    /// `GET /api/v1/intents/ws` – accepted intents as they arrive.
    pub async fn stream_intents(
        &self,
    ) -> Result<impl Stream<Item = Result<IntentEnvelope, ClientError>>, ClientError> {
        intent_stream(self.ws_url("/api/v1/intents/ws")?).await
    }

    fn ws_url(&self, path: &str) -> Result<Url, ClientError> {
        let mut url = self.base_url.join(path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::Scheme(other.to_owned())),
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Scheme(scheme.to_owned()))?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_follows_http_scheme() {
        let plain = ProjectorClient::new(Url::parse("http://127.0.0.1:8080").unwrap());
        assert_eq!(
            plain.ws_url("/api/v1/state/ws").unwrap().as_str(),
            "ws://127.0.0.1:8080/api/v1/state/ws"
        );
        let tls = ProjectorClient::new(Url::parse("https://flows.example.org/").unwrap());
        assert_eq!(
            tls.ws_url("/api/v1/intents/ws").unwrap().as_str(),
            "wss://flows.example.org/api/v1/intents/ws"
        );
        let other = ProjectorClient::new(Url::parse("ftp://example.org/").unwrap());
        assert!(matches!(other.ws_url("/x"), Err(ClientError::Scheme(_))));
    }
}
