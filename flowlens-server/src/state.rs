//! Application state shared across all request handlers.

use flowlens_core::processors::ProjectorHandle;
use flowlens_sdk::objects::IntentEnvelope;
use tokio::sync::broadcast;

/// Capacity of the intent broadcast; slower subscribers see `Lagged`.
const INTENT_BUFFER: usize = 64;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around.
#[derive(Clone)]
pub struct AppState {
    /// Queries and commands for the running projector.
    pub projector: ProjectorHandle,
    /// Accepted action intents, fanned out to WebSocket subscribers.
    pub intents: broadcast::Sender<IntentEnvelope>,
}

impl AppState {
    pub fn new(projector: ProjectorHandle) -> Self {
        let (intents, _) = broadcast::channel(INTENT_BUFFER);
        Self { projector, intents }
    }
}
