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

use super::BridgeConfig;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum ConfigError {
    /// No configuration document could be located.
    Missing(String),
    Read(String),
    Parse(String),
    InvalidOverride {
        variable: String,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(detail) => write!(f, "no configuration found: {detail}"),
            ConfigError::Read(detail) => write!(f, "unable to read configuration: {detail}"),
            ConfigError::Parse(detail) => write!(f, "unable to parse configuration: {detail}"),
            ConfigError::InvalidOverride {
                variable,
                value,
                reason,
            } => write!(
                f,
                "invalid value '{value}' in environment variable '{variable}': {reason}"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Supplies the configuration on every reload.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self) -> Result<BridgeConfig, ConfigError>;
}

/// Serves an in-memory configuration that can be replaced between reloads.
///
/// ```
/// use channel_bridge::config::{BridgeConfig, ConfigSource, StaticConfigSource};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let source = StaticConfigSource::empty();
/// assert!(source.load().await.is_err());
///
/// source.replace(BridgeConfig::default());
/// assert!(source.load().await.is_ok());
/// # });
/// ```
#[derive(Default)]
pub struct StaticConfigSource {
    current: ArcSwapOption<BridgeConfig>,
}

impl StaticConfigSource {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            current: ArcSwapOption::from_pointee(config),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn replace(&self, config: BridgeConfig) {
        self.current.store(Some(Arc::new(config)));
    }

    /// Makes subsequent loads fail with [`ConfigError::Missing`].
    pub fn clear(&self) {
        self.current.store(None);
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load(&self) -> Result<BridgeConfig, ConfigError> {
        self.current
            .load_full()
            .map(|config| config.as_ref().clone())
            .ok_or_else(|| ConfigError::Missing("static configuration is empty".to_string()))
    }
}
