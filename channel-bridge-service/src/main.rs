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

mod env_source;
mod log_publisher;
mod ticker_transport;

use crate::env_source::EnvConfigSource;
use crate::log_publisher::LogPublisherFactory;
use crate::ticker_transport::TickerTransport;
use channel_bridge::Bridge;
use checkpoint_file_backend::FileCheckpointTables;
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Bridges upstream push channels to downstream topics")]
struct BridgeArgs {
    /// Configuration document; defaults to BRIDGE_CONFIG / BRIDGE_CONFIG_FILE.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "DIR", default_value = "./checkpoints")]
    checkpoint_dir: PathBuf,
    /// Log a JSON status snapshot at this interval.
    #[arg(long, value_name = "SECONDS")]
    status_interval_secs: Option<u64>,
    /// Interval between synthetic upstream events.
    #[arg(long, value_name = "MILLIS", default_value_t = 1000)]
    tick_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let args = BridgeArgs::parse();
    info!("Started channel-bridge-service");

    let mut config_source = EnvConfigSource::new();
    if let Some(path) = args.config {
        config_source = config_source.with_config_file(path);
    }

    let bridge = Arc::new(Bridge::new(
        Arc::new(config_source),
        Arc::new(TickerTransport::new(Duration::from_millis(
            args.tick_interval_ms,
        ))),
        Arc::new(LogPublisherFactory),
        Arc::new(FileCheckpointTables::new(args.checkpoint_dir)),
    ));

    bridge.reload().await?;

    let status_task = args
        .status_interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| tokio::spawn(report_status(bridge.clone(), Duration::from_secs(secs))));

    let shutdown = run_until_shutdown(&bridge).await;

    if let Some(task) = status_task {
        task.abort();
    }
    info!("Stopping all workers");
    bridge.stop_all().await;

    shutdown.map_err(Into::into)
}

async fn report_status(bridge: Arc<Bridge>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match serde_json::to_string(&bridge.status()) {
            Ok(status) => info!(status = status.as_str(), "bridge status"),
            Err(err) => warn!(err = %err, "unable to serialize bridge status"),
        }
    }
}

#[cfg(unix)]
async fn run_until_shutdown(bridge: &Bridge) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result,
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                if let Err(err) = bridge.reload().await {
                    error!(err = %err, "reload failed; current workers keep running");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn run_until_shutdown(_bridge: &Bridge) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
