//! Channel workers: one per bridged channel.

mod channel_worker;
mod delivery;
pub mod status;

pub use channel_worker::{ChannelWorker, StartError, MAX_CANCEL_ATTEMPTS};
pub use status::{ActivityLog, LogEntry, ReceivedEvent, WorkerState, WorkerStatus, RING_CAPACITY};
