//! Channel factories for the projector pipeline.

use super::types::{PipelineMessage, ProjectorCommand};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for pipeline messages; cloned once per subscription.
pub type PipelineSender = mpsc::Sender<PipelineMessage>;
/// Receiver handle for pipeline messages; owned by the single consumer.
pub type PipelineReceiver = mpsc::Receiver<PipelineMessage>;

/// Sender handle for projector commands.
pub type CommandSender = mpsc::Sender<ProjectorCommand>;
/// Receiver handle for projector commands.
pub type CommandReceiver = mpsc::Receiver<ProjectorCommand>;

/// Create the merged pipeline channel.
///
/// Every subscription task sends into a clone of the returned sender; the
/// receiver is the serialization point for all state changes.
pub fn pipeline_channel() -> (PipelineSender, PipelineReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a projector command channel.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(16)
}
