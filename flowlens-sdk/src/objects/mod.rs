//! JSON objects exchanged over the flowlens HTTP and WebSocket API.
//!
//! Amounts and rates are decimal strings (they routinely exceed 64 bits);
//! addresses are checksummed hex strings; timestamps are unix seconds.

pub mod intents;
pub mod snapshot;
pub mod ws;

pub use intents::{ActionIntent, IntentEnvelope, IntentReceipt};
pub use snapshot::{
    ChangeAgentRequest, FlowDirection, FlowView, FlowsQuery, ProjectionQuery, SnapshotResponse,
    SuperTokenView, UnderlyingTokenView,
};
pub use ws::{WsCloseCode, WsServerMessage};
