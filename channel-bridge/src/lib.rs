/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # channel-bridge
//!
//! `channel-bridge` forwards events from upstream push channels to downstream pub/sub
//! topics, one [`ChannelWorker`] per configured channel, and persists the cursor of the
//! last forwarded event so a restart resumes where it left off.
//!
//! The upstream transport, the downstream publisher and the checkpoint storage are
//! supplied through the traits in [`capabilities`]. Configuration comes from a
//! [`ConfigSource`].
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use channel_bridge::capabilities::publisher::{PublishError, Publisher, PublisherFactory};
//! use channel_bridge::capabilities::transport::{
//!     ChannelListener, StreamingSession, StreamingTransport, SubscriptionHandle, TransportError,
//!     CancelError,
//! };
//! use channel_bridge::config::{BridgeConfig, ConnectionOptions, StaticConfigSource};
//! use channel_bridge::{Bridge, Cursor, MemoryCheckpointTables, WorkerState};
//!
//! struct Idle;
//!
//! #[async_trait]
//! impl SubscriptionHandle for Idle {
//!     async fn cancel(&self) -> Result<(), CancelError> { Ok(()) }
//! }
//!
//! #[async_trait]
//! impl StreamingSession for Idle {
//!     async fn subscribe(
//!         &self,
//!         _channel: &str,
//!         _replay_from: Cursor,
//!         _listener: Arc<dyn ChannelListener>,
//!     ) -> Result<Box<dyn SubscriptionHandle>, TransportError> {
//!         Ok(Box::new(Idle))
//!     }
//! }
//!
//! #[async_trait]
//! impl StreamingTransport for Idle {
//!     async fn login(
//!         &self,
//!         _connection: &ConnectionOptions,
//!     ) -> Result<Arc<dyn StreamingSession>, TransportError> {
//!         Ok(Arc::new(Idle))
//!     }
//! }
//!
//! #[async_trait]
//! impl Publisher for Idle {
//!     async fn publish(&self, _payload: String) -> Result<String, PublishError> {
//!         Ok("msg-1".to_string())
//!     }
//! }
//!
//! impl PublisherFactory for Idle {
//!     fn publisher_for(&self, _topic: &str) -> Arc<dyn Publisher> { Arc::new(Idle) }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config: BridgeConfig = serde_json::from_str(r#"{
//!     "prod": {
//!         "connection": { "username": "bridge", "password": "secret" },
//!         "channels": [ { "channelName": "/event/Order__e", "topic": "orders" } ]
//!     }
//! }"#).unwrap();
//!
//! let bridge = Bridge::new(
//!     Arc::new(StaticConfigSource::new(config)),
//!     Arc::new(Idle),
//!     Arc::new(Idle),
//!     Arc::new(MemoryCheckpointTables::new()),
//! );
//! bridge.reload().await.unwrap();
//!
//! let status = bridge.status();
//! assert_eq!(status["prod///event/Order__e"].state, WorkerState::Started);
//!
//! bridge.stop_all().await;
//! assert_eq!(bridge.status()["prod///event/Order__e"].state, WorkerState::Stopped);
//! # });
//! ```
//!
//! ## Observability
//!
//! Every component logs through `tracing` with a stable `event` field taken from
//! [`observability::events`] plus `component` and, where relevant, `channel_key`.
//! Binaries decide how to render them; the library never installs a subscriber.
//! The operator-facing activity of each worker is also kept in a short in-memory
//! ring exposed by [`Bridge::status`].

mod bridge;
pub mod capabilities;
mod channel_key;
pub mod checkpoint;
pub mod config;
mod cursor;
mod locking;
pub mod observability;
pub mod worker;

pub use bridge::{Bridge, ReloadError, WorkerMap};
pub use channel_key::ChannelKey;
pub use checkpoint::{CheckpointStore, MemoryCheckpointBackend, MemoryCheckpointTables};
pub use config::{BridgeConfig, BridgeOptions, ConfigError, ConfigSource, StaticConfigSource};
pub use cursor::Cursor;
pub use worker::{ChannelWorker, StartError, WorkerState, WorkerStatus};
