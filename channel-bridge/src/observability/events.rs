//! Canonical structured event names used across `channel-bridge`.

// Worker lifecycle events.
pub const WORKER_START: &str = "worker_start";
pub const WORKER_START_OK: &str = "worker_start_ok";
pub const WORKER_START_FAILED: &str = "worker_start_failed";
pub const WORKER_START_SKIPPED: &str = "worker_start_skipped";
pub const WORKER_STOP: &str = "worker_stop";
pub const WORKER_STOP_OK: &str = "worker_stop_ok";
pub const WORKER_CANCEL_ATTEMPT: &str = "worker_cancel_attempt";
pub const WORKER_CANCEL_OK: &str = "worker_cancel_ok";
pub const WORKER_CANCEL_FAILED: &str = "worker_cancel_failed";
pub const WORKER_CANCEL_TIMEOUT: &str = "worker_cancel_timeout";
pub const WORKER_CANCEL_EXHAUSTED: &str = "worker_cancel_exhausted";
pub const WORKER_AUTH_FAILURE: &str = "worker_auth_failure";
pub const WORKER_RESTART: &str = "worker_restart";
pub const WORKER_RESTART_SKIPPED: &str = "worker_restart_skipped";
pub const WORKER_RESTART_FAILED: &str = "worker_restart_failed";

// Delivery events.
pub const DELIVERY_RECEIVED: &str = "delivery_received";
pub const DELIVERY_DISCARDED: &str = "delivery_discarded";
pub const DELIVERY_PUBLISH_OK: &str = "delivery_publish_ok";
pub const DELIVERY_PUBLISH_FAILED: &str = "delivery_publish_failed";
pub const DELIVERY_CURSOR_ADOPTED: &str = "delivery_cursor_adopted";
pub const DELIVERY_CURSOR_KEPT: &str = "delivery_cursor_kept";
pub const DELIVERY_CURSOR_DISCARDED: &str = "delivery_cursor_discarded";

// Checkpoint events.
pub const CHECKPOINT_FETCH_OK: &str = "checkpoint_fetch_ok";
pub const CHECKPOINT_FETCH_EMPTY: &str = "checkpoint_fetch_empty";
pub const CHECKPOINT_FETCH_FAILED: &str = "checkpoint_fetch_failed";
pub const CHECKPOINT_WRITE_OK: &str = "checkpoint_write_ok";
pub const CHECKPOINT_WRITE_SUPERSEDED: &str = "checkpoint_write_superseded";
pub const CHECKPOINT_WRITE_FAILED: &str = "checkpoint_write_failed";
pub const CHECKPOINT_WRITE_DEFERRED: &str = "checkpoint_write_deferred";
pub const CHECKPOINT_DEFERRED_SUPERSEDED: &str = "checkpoint_deferred_superseded";

// Orchestrator events.
pub const RELOAD_START: &str = "reload_start";
pub const RELOAD_CONFIG_LOADED: &str = "reload_config_loaded";
pub const RELOAD_CONFIG_FAILED: &str = "reload_config_failed";
pub const RELOAD_DUPLICATE_CHANNEL: &str = "reload_duplicate_channel";
pub const RELOAD_OK: &str = "reload_ok";
pub const START_ALL_WORKER_FAILED: &str = "start_all_worker_failed";
pub const START_ALL_DONE: &str = "start_all_done";
pub const STOP_ALL_DONE: &str = "stop_all_done";
