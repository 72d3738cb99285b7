//! Checkpoint persistence: the per-channel debounced store and an in-memory backend.

mod memory;
mod store;

pub use memory::{MemoryCheckpointBackend, MemoryCheckpointTables};
pub use store::{CheckpointStore, DEFERRED_WRITE_MARGIN};
