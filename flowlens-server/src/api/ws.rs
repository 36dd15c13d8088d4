use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use flowlens_core::utils::unix_now;
use flowlens_sdk::objects::{WsCloseCode, WsServerMessage};

use crate::state::AppState;

/// `GET /state/ws` — WebSocket snapshot stream.
///
/// The first frame is the current snapshot; every later fold of the
/// projector sends another one. Intermediate snapshots may be skipped when
/// the client is slower than the projector, the latest one always arrives.
pub(super) async fn state_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_state_ws(socket, state))
}

async fn handle_state_ws(mut socket: WebSocket, state: AppState) {
    let mut updates = state.projector.subscribe();

    let current = updates.borrow_and_update().to_response(unix_now());
    if send_json(&mut socket, &WsServerMessage::Snapshot { state: current })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    tracing::debug!("WS: projector stopped, closing snapshot stream");
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: WsCloseCode::PROJECTOR_STOPPED,
                            reason: "projector stopped".into(),
                        })))
                        .await;
                    return;
                }
                let snapshot = updates.borrow_and_update().to_response(unix_now());
                if send_json(&mut socket, &WsServerMessage::Snapshot { state: snapshot }).await.is_err() {
                    return;
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
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
pub(super) async fn send_json<T: serde::Serialize>(
    socket: &mut WebSocket,
    value: &T,
) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
