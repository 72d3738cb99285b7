/********************************************************************************
 * Copyright (c) 2025 Contributors to the Eclipse Foundation
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

//! Configuration model consumed by the bridge.
//!
//! The document maps environment names to their connection and channel mappings,
//! next to a reserved `options` entry:
//!
//! ```
//! use channel_bridge::config::BridgeConfig;
//! use channel_bridge::Cursor;
//!
//! let config: BridgeConfig = serde_json::from_str(r#"{
//!     "options": { "replayIdStoreTableName": "cursors", "initialReplayId": -2 },
//!     "prod": {
//!         "connection": { "username": "bridge", "password": "secret" },
//!         "channels": [ { "channelName": "/event/Order__e", "snsTopicArn": "orders" } ]
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.options.checkpoint_table_name.as_deref(), Some("cursors"));
//! assert_eq!(config.options.initial_cursor, Cursor::EARLIEST);
//! assert_eq!(config.environments["prod"].channels[0].topic, "orders");
//! ```

mod source;
pub use source::{ConfigError, ConfigSource, StaticConfigSource};

use crate::capabilities::checkpoint_backend::CheckpointTable;
use crate::cursor::Cursor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

pub const DEFAULT_CHECKPOINT_KEY_NAME: &str = "channel";
pub const DEFAULT_CHECKPOINT_DELAY_MS: u64 = 2000;
pub const DEFAULT_CANCEL_TIMEOUT_MS: u64 = 5000;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub options: BridgeOptions,
    #[serde(flatten)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EnvironmentConfig {
    pub connection: ConnectionOptions,
    #[serde(default)]
    pub channels: Vec<ChannelMapping>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMapping {
    pub channel_name: String,
    #[serde(alias = "snsTopicArn")]
    pub topic: String,
}

/// Credentials and endpoint of one upstream environment.
///
/// Fields the bridge does not interpret are kept in `extra` for the transport.
#[derive(Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Debug for ConnectionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeOptions {
    /// Checkpointing is disabled when no table is configured.
    #[serde(default, alias = "replayIdStoreTableName")]
    pub checkpoint_table_name: Option<String>,
    #[serde(
        default = "default_checkpoint_key_name",
        alias = "replayIdStoreKeyName"
    )]
    pub checkpoint_key_name: String,
    #[serde(
        default = "default_checkpoint_delay_ms",
        alias = "replayIdStoreDelay"
    )]
    pub checkpoint_delay_ms: u64,
    #[serde(default, alias = "initialReplayId")]
    pub initial_cursor: Cursor,
    #[serde(default)]
    pub debug: bool,
    /// Upper bound for one subscription cancel attempt.
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
}

fn default_checkpoint_key_name() -> String {
    DEFAULT_CHECKPOINT_KEY_NAME.to_string()
}

fn default_checkpoint_delay_ms() -> u64 {
    DEFAULT_CHECKPOINT_DELAY_MS
}

fn default_cancel_timeout_ms() -> u64 {
    DEFAULT_CANCEL_TIMEOUT_MS
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            checkpoint_table_name: None,
            checkpoint_key_name: default_checkpoint_key_name(),
            checkpoint_delay_ms: default_checkpoint_delay_ms(),
            initial_cursor: Cursor::default(),
            debug: false,
            cancel_timeout_ms: default_cancel_timeout_ms(),
        }
    }
}

impl BridgeOptions {
    pub fn checkpoint_delay(&self) -> Duration {
        Duration::from_millis(self.checkpoint_delay_ms)
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn checkpoint_table(&self) -> Option<CheckpointTable> {
        self.checkpoint_table_name
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|table_name| CheckpointTable {
                table_name: table_name.clone(),
                key_name: self.checkpoint_key_name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{BridgeConfig, BridgeOptions, DEFAULT_CHECKPOINT_DELAY_MS};
    use crate::Cursor;
    use std::time::Duration;

    #[test]
    fn options_default_when_absent() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{ "dev": { "connection": { "username": "u" }, "channels": [] } }"#,
        )
        .expect("config should parse");

        assert_eq!(config.options, BridgeOptions::default());
        assert_eq!(
            config.options.checkpoint_delay(),
            Duration::from_millis(DEFAULT_CHECKPOINT_DELAY_MS)
        );
        assert_eq!(config.options.initial_cursor, Cursor::LATEST);
        assert!(config.options.checkpoint_table().is_none());
        assert_eq!(config.environments.len(), 1);
    }

    #[test]
    fn empty_table_name_disables_checkpointing() {
        let options = BridgeOptions {
            checkpoint_table_name: Some(String::new()),
            ..Default::default()
        };

        assert!(options.checkpoint_table().is_none());
    }

    #[test]
    fn unknown_connection_fields_are_kept_and_secrets_redacted() {
        let config: BridgeConfig = serde_json::from_str(
            r#"{ "prod": {
                "connection": { "username": "u", "password": "hunter2", "version": "58.0" },
                "channels": [ { "channelName": "/event/A", "topic": "a" } ]
            } }"#,
        )
        .expect("config should parse");

        let connection = &config.environments["prod"].connection;
        assert_eq!(connection.extra["version"], "58.0");
        assert!(!format!("{connection:?}").contains("hunter2"));
    }

    #[test]
    fn checkpoint_table_carries_key_name() {
        let options: BridgeOptions = serde_json::from_str(
            r#"{ "checkpointTableName": "cursors", "checkpointKeyName": "id", "checkpointDelayMs": 50 }"#,
        )
        .expect("options should parse");

        let table = options.checkpoint_table().expect("table configured");
        assert_eq!(table.table_name, "cursors");
        assert_eq!(table.key_name, "id");
        assert_eq!(options.checkpoint_delay(), Duration::from_millis(50));
    }
}
