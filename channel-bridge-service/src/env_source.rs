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

use async_trait::async_trait;
use channel_bridge::config::{BridgeConfig, BridgeOptions, ConfigError, ConfigSource};
use channel_bridge::Cursor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

pub const CONFIG_VAR: &str = "BRIDGE_CONFIG";
pub const CONFIG_FILE_VAR: &str = "BRIDGE_CONFIG_FILE";

const TABLE_NAME_VARS: &[&str] = &[
    "BRIDGE_CONFIG_CHECKPOINT_TABLE_NAME",
    "BRIDGE_CONFIG_REPLAY_ID_STORE_TABLE_NAME",
];
const KEY_NAME_VARS: &[&str] = &[
    "BRIDGE_CONFIG_CHECKPOINT_KEY_NAME",
    "BRIDGE_CONFIG_REPLAY_ID_STORE_KEY_NAME",
];
const DELAY_VARS: &[&str] = &[
    "BRIDGE_CONFIG_CHECKPOINT_DELAY",
    "BRIDGE_CONFIG_REPLAY_ID_STORE_DELAY",
];
const INITIAL_CURSOR_VARS: &[&str] = &[
    "BRIDGE_CONFIG_INITIAL_CURSOR",
    "BRIDGE_CONFIG_INITIAL_REPLAY_ID",
];
const DEBUG_VARS: &[&str] = &["BRIDGE_CONFIG_DEBUG"];

enum Variables {
    Process,
    Fixed(HashMap<String, String>),
}

impl Variables {
    fn get(&self, name: &str) -> Option<String> {
        match self {
            Variables::Process => std::env::var(name).ok(),
            Variables::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

/// Loads the configuration document from the environment, or from an explicit
/// file, and applies per-option overrides from environment variables.
///
/// Documents are JSON5, so plain JSON is accepted as well.
pub struct EnvConfigSource {
    variables: Variables,
    config_file: Option<PathBuf>,
}

impl EnvConfigSource {
    pub fn new() -> Self {
        Self {
            variables: Variables::Process,
            config_file: None,
        }
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            variables: Variables::Fixed(
                vars.into_iter()
                    .map(|(name, value)| (name.into(), value.into()))
                    .collect(),
            ),
            config_file: None,
        }
    }

    /// Reads the document from `path` ahead of `BRIDGE_CONFIG` and `BRIDGE_CONFIG_FILE`.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    async fn document(&self) -> Result<String, ConfigError> {
        if let Some(path) = &self.config_file {
            return read_file(path).await;
        }
        if let Some(inline) = self.variables.get(CONFIG_VAR) {
            return Ok(inline);
        }
        if let Some(path) = self.variables.get(CONFIG_FILE_VAR) {
            return read_file(Path::new(&path)).await;
        }
        Err(ConfigError::Missing(format!(
            "set {CONFIG_VAR} or {CONFIG_FILE_VAR}"
        )))
    }

    fn lookup(&self, names: &[&'static str]) -> Option<(&'static str, String)> {
        names
            .iter()
            .find_map(|name| self.variables.get(name).map(|value| (*name, value)))
    }

    fn parsed<T>(&self, names: &[&'static str]) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some((variable, value)) = self.lookup(names) else {
            return Ok(None);
        };
        let parsed = value
            .trim()
            .parse::<T>()
            .map_err(|err| ConfigError::InvalidOverride {
                variable: variable.to_string(),
                value: value.clone(),
                reason: err.to_string(),
            })?;
        info!(variable, value = %value, "applying configuration override");
        Ok(Some(parsed))
    }

    fn apply_overrides(&self, options: &mut BridgeOptions) -> Result<(), ConfigError> {
        if let Some(table_name) = self.parsed::<String>(TABLE_NAME_VARS)? {
            options.checkpoint_table_name = Some(table_name);
        }
        if let Some(key_name) = self.parsed::<String>(KEY_NAME_VARS)? {
            options.checkpoint_key_name = key_name;
        }
        if let Some(delay_ms) = self.parsed::<u64>(DELAY_VARS)? {
            options.checkpoint_delay_ms = delay_ms;
        }
        if let Some(cursor) = self.parsed::<i64>(INITIAL_CURSOR_VARS)? {
            options.initial_cursor = Cursor::new(cursor);
        }
        if let Some((variable, value)) = self.lookup(DEBUG_VARS) {
            options.debug = flag_is_set(&value);
            info!(variable, value = %value, "applying configuration override");
        }
        Ok(())
    }
}

/// Any non-empty value enables a flag, except the usual spellings of "off".
fn flag_is_set(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty()
        || ["false", "0", "no", "off"]
            .iter()
            .any(|off| value.eq_ignore_ascii_case(off)))
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_file(path: &Path) -> Result<String, ConfigError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ConfigError::Read(format!("{}: {err}", path.display())))
}

#[async_trait]
impl ConfigSource for EnvConfigSource {
    async fn load(&self) -> Result<BridgeConfig, ConfigError> {
        let document = self.document().await?;
        let mut config: BridgeConfig =
            json5::from_str(&document).map_err(|err| ConfigError::Parse(err.to_string()))?;
        self.apply_overrides(&mut config.options)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::EnvConfigSource;
    use channel_bridge::config::{ConfigError, ConfigSource};
    use channel_bridge::Cursor;

    const DOCUMENT: &str = r#"{
        // environments are keyed by name
        options: { replayIdStoreTableName: "cursors", replayIdStoreDelay: 500 },
        prod: {
            connection: { username: "bridge", password: "secret" },
            channels: [ { channelName: "/event/Order__e", snsTopicArn: "orders" } ],
        },
    }"#;

    #[tokio::test]
    async fn loads_inline_json5_document() {
        let source = EnvConfigSource::from_vars([("BRIDGE_CONFIG", DOCUMENT)]);

        let config = source.load().await.expect("config loads");

        assert_eq!(config.options.checkpoint_table_name.as_deref(), Some("cursors"));
        assert_eq!(config.options.checkpoint_delay_ms, 500);
        assert_eq!(config.environments["prod"].channels[0].topic, "orders");
    }

    #[tokio::test]
    async fn overrides_take_precedence_over_document() {
        let source = EnvConfigSource::from_vars([
            ("BRIDGE_CONFIG", DOCUMENT),
            ("BRIDGE_CONFIG_CHECKPOINT_DELAY", "50"),
            ("BRIDGE_CONFIG_INITIAL_REPLAY_ID", "-2"),
            ("BRIDGE_CONFIG_REPLAY_ID_STORE_KEY_NAME", "id"),
            ("BRIDGE_CONFIG_DEBUG", "true"),
        ]);

        let config = source.load().await.expect("config loads");

        assert_eq!(config.options.checkpoint_delay_ms, 50);
        assert_eq!(config.options.initial_cursor, Cursor::EARLIEST);
        assert_eq!(config.options.checkpoint_key_name, "id");
        assert!(config.options.debug);
    }

    #[tokio::test]
    async fn debug_override_accepts_common_spellings() {
        for (value, expected) in [
            ("1", true),
            ("yes", true),
            ("TRUE", true),
            ("verbose", true),
            ("0", false),
            ("false", false),
            ("Off", false),
            ("", false),
        ] {
            let source = EnvConfigSource::from_vars([
                ("BRIDGE_CONFIG", DOCUMENT),
                ("BRIDGE_CONFIG_DEBUG", value),
            ]);

            let config = source.load().await.expect("config loads");

            assert_eq!(config.options.debug, expected, "BRIDGE_CONFIG_DEBUG={value:?}");
        }
    }

    #[tokio::test]
    async fn current_override_name_wins_over_legacy_name() {
        let source = EnvConfigSource::from_vars([
            ("BRIDGE_CONFIG", DOCUMENT),
            ("BRIDGE_CONFIG_CHECKPOINT_TABLE_NAME", "current"),
            ("BRIDGE_CONFIG_REPLAY_ID_STORE_TABLE_NAME", "legacy"),
        ]);

        let config = source.load().await.expect("config loads");

        assert_eq!(config.options.checkpoint_table_name.as_deref(), Some("current"));
    }

    #[tokio::test]
    async fn invalid_override_is_reported() {
        let source = EnvConfigSource::from_vars([
            ("BRIDGE_CONFIG", DOCUMENT),
            ("BRIDGE_CONFIG_CHECKPOINT_DELAY", "soon"),
        ]);

        match source.load().await {
            Err(ConfigError::InvalidOverride { variable, value, .. }) => {
                assert_eq!(variable, "BRIDGE_CONFIG_CHECKPOINT_DELAY");
                assert_eq!(value, "soon");
            }
            other => panic!("expected an invalid override, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_document_is_reported() {
        let source = EnvConfigSource::from_vars(Vec::<(String, String)>::new());

        assert!(matches!(source.load().await, Err(ConfigError::Missing(_))));
    }

    #[tokio::test]
    async fn reads_document_from_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bridge.json5");
        std::fs::write(&path, DOCUMENT).expect("write fixture");

        let from_variable = EnvConfigSource::from_vars([(
            "BRIDGE_CONFIG_FILE".to_string(),
            path.display().to_string(),
        )]);
        let explicit = EnvConfigSource::from_vars([("BRIDGE_CONFIG", "not json")])
            .with_config_file(&path);

        assert!(from_variable.load().await.is_ok());
        assert!(explicit.load().await.is_ok());
    }

    #[tokio::test]
    async fn malformed_document_is_a_parse_error() {
        let source = EnvConfigSource::from_vars([("BRIDGE_CONFIG", "{ prod: ")]);

        assert!(matches!(source.load().await, Err(ConfigError::Parse(_))));
    }
}
