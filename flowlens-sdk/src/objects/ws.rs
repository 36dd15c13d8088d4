//! WebSocket message types for the state and intent streams.
//!
//! # Protocol
//!
//! `GET /api/v1/state/ws`:
//! 1. The server sends a [`WsServerMessage::Snapshot`] with the current
//!    state immediately after the upgrade.
//! 2. A new snapshot follows every reduced event.
//! 3. When the projector stops, the server sends a close frame with
//!    [`WsCloseCode::PROJECTOR_STOPPED`].
//!
//! `GET /api/v1/intents/ws` sends one [`WsServerMessage::Intent`] per accepted
//! intent. A subscriber too slow to keep up receives
//! [`WsServerMessage::Error`] with [`WsCloseCode::LAGGED`] and keeps
//! receiving newer intents.

use serde::{Deserialize, Serialize};

use super::intents::IntentEnvelope;
use super::snapshot::SnapshotResponse;

/// Server-to-client WebSocket message.
///
/// Serialized as an internally-tagged JSON object so the client can
/// dispatch on the `"type"` field:
///
/// ```json
/// {"type":"snapshot","state":{ ... }}
/// {"type":"error","code":4008,"reason":"lagged behind by 3 intents"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    Snapshot { state: SnapshotResponse },

    Intent { envelope: IntentEnvelope },

    /// A server-side error that does **not** close the connection by
    /// itself.
    Error { code: u16, reason: String },
}

/// Well-known WebSocket close codes.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    pub const NORMAL: u16 = 1000;

    pub const INTERNAL_ERROR: u16 = 1011;

    /// The projector task ended; no further snapshots will come.
    pub const PROJECTOR_STOPPED: u16 = 4001;

    /// The subscriber missed broadcast messages.
    pub const LAGGED: u16 = 4008;
}
