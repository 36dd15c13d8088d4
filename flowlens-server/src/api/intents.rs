use axum::{
    Json,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use flowlens_core::utils::unix_now;
use flowlens_sdk::objects::{
    ActionIntent, IntentEnvelope, IntentReceipt, WsCloseCode, WsServerMessage,
};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::ws::send_json;
use crate::state::AppState;

/// `POST /intents` — accept an action intent.
///
/// The intent is neither validated nor executed; it is stamped with an id
/// and broadcast to `/intents/ws` subscribers.
pub(super) async fn submit_intent(
    State(state): State<AppState>,
    Json(intent): Json<ActionIntent>,
) -> impl IntoResponse {
    let envelope = IntentEnvelope {
        id: Uuid::now_v7(),
        received_at: unix_now(),
        intent,
    };
    let id = envelope.id;
    match state.intents.send(envelope) {
        Ok(receivers) => tracing::info!(%id, receivers, "Intent accepted"),
        Err(_) => tracing::warn!(%id, "Intent accepted with no subscriber listening"),
    }
    (StatusCode::ACCEPTED, Json(IntentReceipt { id }))
}

/// `GET /intents/ws` — stream accepted intents.
pub(super) async fn intents_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_intents_ws(socket, state))
}

async fn handle_intents_ws(mut socket: WebSocket, state: AppState) {
    let mut intents = state.intents.subscribe();

    loop {
        tokio::select! {
            result = intents.recv() => {
                match result {
                    Ok(envelope) => {
                        if send_json(&mut socket, &WsServerMessage::Intent { envelope }).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "WS: intent subscriber lagged");
                        let msg = WsServerMessage::Error {
                            code: WsCloseCode::LAGGED,
                            reason: format!("lagged behind by {n} intents"),
                        };
                        if send_json(&mut socket, &msg).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
