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

use crate::capabilities::checkpoint_backend::CheckpointBackendFactory;
use crate::capabilities::publisher::{Publisher, PublisherFactory};
use crate::capabilities::transport::StreamingTransport;
use crate::channel_key::ChannelKey;
use crate::config::{BridgeConfig, ConfigError, ConfigSource};
use crate::observability::events;
use crate::worker::{ChannelWorker, WorkerStatus};
use arc_swap::ArcSwap;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{error, info, warn};

const COMPONENT: &str = "bridge";

/// Live workers keyed by channel identity.
pub type WorkerMap = BTreeMap<ChannelKey, ChannelWorker>;

#[derive(Debug)]
pub enum ReloadError {
    /// The configuration could not be loaded; the previous workers keep running.
    Config(ConfigError),
}

impl Display for ReloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReloadError::Config(err) => write!(f, "reload aborted: {err}"),
        }
    }
}

impl Error for ReloadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReloadError::Config(err) => Some(err),
        }
    }
}

/// Builds the set of channel workers from configuration and drives their
/// collective lifecycle.
///
/// The worker map is replaced as a whole on every reload, so status readers see
/// either the old or the new set, never a mix.
pub struct Bridge {
    config_source: Arc<dyn ConfigSource>,
    transport: Arc<dyn StreamingTransport>,
    publishers: Arc<dyn PublisherFactory>,
    checkpoint_backends: Arc<dyn CheckpointBackendFactory>,
    workers: ArcSwap<WorkerMap>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl Bridge {
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        transport: Arc<dyn StreamingTransport>,
        publishers: Arc<dyn PublisherFactory>,
        checkpoint_backends: Arc<dyn CheckpointBackendFactory>,
    ) -> Self {
        Self {
            config_source,
            transport,
            publishers,
            checkpoint_backends,
            workers: ArcSwap::from_pointee(WorkerMap::new()),
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current worker set.
    pub fn workers(&self) -> Arc<WorkerMap> {
        self.workers.load_full()
    }

    pub fn status(&self) -> BTreeMap<String, WorkerStatus> {
        self.workers
            .load()
            .iter()
            .map(|(key, worker)| (key.to_string(), worker.status()))
            .collect()
    }

    /// Loads configuration, stops every current worker, then installs and starts
    /// the new set.
    ///
    /// The new worker for a channel is only started once the old one has stopped.
    /// Per-worker failures are logged and never abort the reload.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let _reloading = self.reload_lock.lock().await;
        info!(
            event = events::RELOAD_START,
            component = COMPONENT,
            "reloading configuration"
        );

        let config = self.config_source.load().await.map_err(|err| {
            error!(
                event = events::RELOAD_CONFIG_FAILED,
                component = COMPONENT,
                err = %err,
                "unable to load configuration; keeping current workers"
            );
            ReloadError::Config(err)
        })?;

        let new_workers = self.build_workers(&config);
        info!(
            event = events::RELOAD_CONFIG_LOADED,
            component = COMPONENT,
            channels = ?new_workers.keys().map(ChannelKey::as_str).collect::<Vec<_>>(),
            "loaded configuration"
        );

        self.stop_all().await;
        self.workers.store(Arc::new(new_workers));
        let failed = self.start_all().await;

        info!(
            event = events::RELOAD_OK,
            component = COMPONENT,
            workers = self.workers.load().len(),
            failed = failed.len(),
            "reload complete"
        );
        Ok(())
    }

    /// Starts every current worker concurrently. Returns the keys that failed to start.
    pub async fn start_all(&self) -> Vec<ChannelKey> {
        let workers = self.workers.load_full();
        let outcomes = join_all(workers.iter().map(|(key, worker)| async move {
            match worker.start().await {
                Ok(()) => None,
                Err(err) => {
                    error!(
                        event = events::START_ALL_WORKER_FAILED,
                        component = COMPONENT,
                        channel_key = %key,
                        err = %err,
                        "failed to start"
                    );
                    Some(key.clone())
                }
            }
        }))
        .await;

        let failed: Vec<ChannelKey> = outcomes.into_iter().flatten().collect();
        info!(
            event = events::START_ALL_DONE,
            component = COMPONENT,
            workers = workers.len(),
            failed = failed.len(),
            "start attempted for all workers"
        );
        failed
    }

    /// Stops every current worker concurrently.
    pub async fn stop_all(&self) {
        let workers = self.workers.load_full();
        join_all(workers.values().map(ChannelWorker::stop)).await;
        info!(
            event = events::STOP_ALL_DONE,
            component = COMPONENT,
            workers = workers.len(),
            "all workers stopped"
        );
    }

    fn build_workers(&self, config: &BridgeConfig) -> WorkerMap {
        let checkpoint_backend = config
            .options
            .checkpoint_table()
            .map(|table| self.checkpoint_backends.open(&table));
        let mut publishers: HashMap<&str, Arc<dyn Publisher>> = HashMap::new();
        let mut workers = WorkerMap::new();

        for (environment, environment_config) in &config.environments {
            for mapping in &environment_config.channels {
                let publisher = publishers
                    .entry(mapping.topic.as_str())
                    .or_insert_with(|| self.publishers.publisher_for(&mapping.topic))
                    .clone();
                let key = ChannelKey::new(environment, &mapping.channel_name);
                let worker = ChannelWorker::new(
                    key.clone(),
                    environment_config.connection.clone(),
                    self.transport.clone(),
                    publisher,
                    checkpoint_backend.clone(),
                    &config.options,
                );

                if workers.insert(key.clone(), worker).is_some() {
                    warn!(
                        event = events::RELOAD_DUPLICATE_CHANNEL,
                        component = COMPONENT,
                        channel_key = %key,
                        "channel mapped twice; keeping the last mapping"
                    );
                }
            }
        }

        workers
    }
}

#[cfg(test)]
mod tests {
    use super::ReloadError;
    use crate::config::ConfigError;
    use std::error::Error;

    #[test]
    fn reload_error_exposes_config_error_as_source() {
        let error = ReloadError::Config(ConfigError::Parse("expected value at line 1".to_string()));

        assert!(error.to_string().starts_with("reload aborted"));
        assert!(error
            .source()
            .expect("config error is the source")
            .to_string()
            .contains("expected value"));
    }
}
