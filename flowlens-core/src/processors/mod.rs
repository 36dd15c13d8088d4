//! Processors of the projector pipeline.
//!
//! - `normalizer`: raw log → `DomainEvent`
//! - `StateReducer`: `(ProjectorState, DomainEvent)` → `ProjectorState`
//! - `SubscriptionManager`: one per watched (contract, filter) pair, emits
//!   raw logs and lifecycle markers into the pipeline
//! - `ProjectorService`: consumes the pipeline, owns the state and every
//!   subscription

pub mod normalizer;
pub mod projector;
pub mod reducer;
pub mod subscription;

pub use normalizer::normalize;
pub use projector::{ProjectorError, ProjectorHandle, ProjectorService};
pub use reducer::{ReduceContext, Reduction, StateReducer};
pub use subscription::{ScanPlan, SubscriptionError, SubscriptionManager};
