//! Contracts required from the external collaborators of the bridge.
//!
//! The upstream transport, the downstream publisher and the durable checkpoint
//! storage are only known through these traits.

pub mod checkpoint_backend;
pub mod publisher;
pub mod transport;
