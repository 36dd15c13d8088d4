//! WebSocket streams decoded into [`WsServerMessage`] payloads.

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::ClientError;
use crate::objects::{IntentEnvelope, SnapshotResponse, WsServerMessage};

/// Connect to `url` and yield every decoded server message.
///
/// Non-text frames are skipped; an `Error` message becomes
/// [`ClientError::Stream`].
async fn messages(
    url: Url,
) -> Result<impl Stream<Item = Result<WsServerMessage, ClientError>>, ClientError> {
    let (socket, _) = connect_async(url.as_str()).await?;
    Ok(socket.filter_map(|frame| async move {
        match frame {
            Ok(Message::Text(text)) => Some(
                serde_json::from_str::<WsServerMessage>(&text)
                    .map_err(ClientError::from)
                    .and_then(|message| match message {
                        WsServerMessage::Error { code, reason } => {
                            Err(ClientError::Stream { code, reason })
                        }
                        other => Ok(other),
                    }),
            ),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        }
    }))
}

pub(super) async fn snapshot_stream(
    url: Url,
) -> Result<impl Stream<Item = Result<SnapshotResponse, ClientError>>, ClientError> {
    Ok(messages(url).await?.filter_map(|message| async move {
        match message {
            Ok(WsServerMessage::Snapshot { state }) => Some(Ok(state)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

pub(super) async fn intent_stream(
    url: Url,
) -> Result<impl Stream<Item = Result<IntentEnvelope, ClientError>>, ClientError> {
    Ok(messages(url).await?.filter_map(|message| async move {
        match message {
            Ok(WsServerMessage::Intent { envelope }) => Some(Ok(envelope)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }))
}
