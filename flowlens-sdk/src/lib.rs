//! Wire types shared between the flowlens server and its consumers, plus an
//! optional typed client (`client` feature).

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
