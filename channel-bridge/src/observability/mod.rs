//! Structured logging vocabulary shared by the bridge components.

pub mod events;
