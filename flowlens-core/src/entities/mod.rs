//! Projected state: super tokens, flows and the aggregate that owns them.

pub mod flow;
pub mod projector_snapshot;
pub mod state;
pub mod super_token;

pub use flow::{Flow, FlowDirection, FlowKey};
pub use projector_snapshot::{InMemorySnapshotStore, SnapshotStore, StoreError};
pub use state::{BlockNumbersCache, ProjectorState};
pub use super_token::{SuperToken, UnderlyingToken};

use flowlens_sdk::objects::FlowDirection as SdkFlowDirection;

impl From<FlowDirection> for SdkFlowDirection {
    fn from(value: FlowDirection) -> Self {
        match value {
            FlowDirection::Incoming => SdkFlowDirection::Incoming,
            FlowDirection::Outgoing => SdkFlowDirection::Outgoing,
        }
    }
}

impl From<SdkFlowDirection> for FlowDirection {
    fn from(value: SdkFlowDirection) -> Self {
        match value {
            SdkFlowDirection::Incoming => FlowDirection::Incoming,
            SdkFlowDirection::Outgoing => FlowDirection::Outgoing,
        }
    }
}
