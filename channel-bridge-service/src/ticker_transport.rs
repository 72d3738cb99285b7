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

//! Synthetic upstream: every subscription receives one event per tick.

use async_trait::async_trait;
use channel_bridge::capabilities::transport::{
    CancelError, ChannelEvent, ChannelListener, StreamingSession, StreamingTransport,
    SubscriptionHandle, TransportError,
};
use channel_bridge::config::ConnectionOptions;
use channel_bridge::Cursor;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub struct TickerTransport {
    interval: Duration,
}

impl TickerTransport {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl StreamingTransport for TickerTransport {
    async fn login(
        &self,
        connection: &ConnectionOptions,
    ) -> Result<Arc<dyn StreamingSession>, TransportError> {
        if connection.username.is_empty() {
            return Err(TransportError::Login("username is required".to_string()));
        }
        debug!(username = connection.username.as_str(), "ticker login");
        Ok(Arc::new(TickerSession {
            interval: self.interval,
        }))
    }
}

struct TickerSession {
    interval: Duration,
}

/// First cursor emitted for a subscription replaying from `replay_from`.
fn first_cursor(replay_from: Cursor) -> i64 {
    if replay_from.is_sentinel() {
        1
    } else {
        replay_from.value() + 1
    }
}

#[async_trait]
impl StreamingSession for TickerSession {
    async fn subscribe(
        &self,
        channel: &str,
        replay_from: Cursor,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError> {
        let channel = channel.to_string();
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            let mut next = first_cursor(replay_from);
            loop {
                ticker.tick().await;
                let payload = json!({
                    "channel": channel,
                    "sequence": next,
                    "emittedAt": Utc::now().to_rfc3339(),
                });
                listener
                    .on_event(ChannelEvent::new(Cursor::new(next), payload))
                    .await;
                next += 1;
            }
        });

        Ok(Box::new(TickerSubscription { task }))
    }
}

struct TickerSubscription {
    task: JoinHandle<()>,
}

#[async_trait]
impl SubscriptionHandle for TickerSubscription {
    async fn cancel(&self) -> Result<(), CancelError> {
        self.task.abort();
        Ok(())
    }
}

impl Drop for TickerSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
