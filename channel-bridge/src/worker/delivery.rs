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

//! Delivery callback: publish downstream, then advance the cursor.

use crate::capabilities::transport::{ChannelEvent, ChannelListener};
use crate::cursor::Cursor;
use crate::locking::lock;
use crate::observability::events;
use crate::worker::channel_worker::WorkerInner;
use crate::worker::status::ReceivedEvent;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

const COMPONENT: &str = "delivery";

/// Listener registered with one subscription generation of a worker.
pub(super) struct DeliveryListener {
    worker: Weak<WorkerInner>,
    generation: u64,
}

impl DeliveryListener {
    pub(super) fn new(worker: Weak<WorkerInner>, generation: u64) -> Self {
        Self { worker, generation }
    }
}

#[async_trait]
impl ChannelListener for DeliveryListener {
    async fn on_event(&self, event: ChannelEvent) {
        if let Some(worker) = self.worker.upgrade() {
            worker.deliver(self.generation, event).await;
        }
    }

    async fn on_auth_failure(&self, reason: String) {
        if let Some(worker) = self.worker.upgrade() {
            worker.schedule_restart(self.generation, &reason);
        }
    }
}

impl WorkerInner {
    pub(super) async fn deliver(self: Arc<Self>, generation: u64, event: ChannelEvent) {
        let state = self.state();
        if !state.accepts_deliveries() || generation != self.current_generation() {
            debug!(
                event = events::DELIVERY_DISCARDED,
                component = COMPONENT,
                channel_key = %self.key,
                cursor = event.cursor.value(),
                state = %state,
                generation,
                "delivery discarded"
            );
            return;
        }

        let new_cursor = event.cursor;
        let previous_cursor = *lock(&self.cursor);
        self.recent_events.push(ReceivedEvent {
            time: Utc::now(),
            cursor: new_cursor,
        });
        if self.debug {
            debug!(
                event = events::DELIVERY_RECEIVED,
                component = COMPONENT,
                channel_key = %self.key,
                cursor = new_cursor.value(),
                payload = %event.payload,
                "received event"
            );
        }

        let payload = event.payload.to_string();
        match self.publisher.publish(payload).await {
            Ok(message_id) => {
                if self.debug {
                    debug!(
                        event = events::DELIVERY_PUBLISH_OK,
                        component = COMPONENT,
                        channel_key = %self.key,
                        cursor = new_cursor.value(),
                        message_id = message_id.as_str(),
                        "published event"
                    );
                }
                self.adopt_cursor(generation, new_cursor, previous_cursor);
            }
            Err(err) => {
                self.activity
                    .record(format!("Failed to publish (cursor={new_cursor}): {err}"));
                warn!(
                    event = events::DELIVERY_PUBLISH_FAILED,
                    component = COMPONENT,
                    channel_key = %self.key,
                    cursor = new_cursor.value(),
                    err = %err,
                    "failed to publish event"
                );
            }
        }
    }

    /// Moves the cursor forward only; a late publish of an older event leaves it alone.
    ///
    /// A publish that completes after `stop()` began, or after a newer subscription
    /// replaced this one, is not adopted: the event will be redelivered from the
    /// flushed cursor instead.
    fn adopt_cursor(
        &self,
        generation: u64,
        new_cursor: Cursor,
        previous_cursor: Option<Cursor>,
    ) {
        let adopted = {
            let mut cursor = lock(&self.cursor);
            let state = self.state();
            if !state.accepts_deliveries() || generation != self.current_generation() {
                drop(cursor);
                debug!(
                    event = events::DELIVERY_CURSOR_DISCARDED,
                    component = COMPONENT,
                    channel_key = %self.key,
                    cursor = new_cursor.value(),
                    state = %state,
                    generation,
                    "publish completed after the subscription ended; cursor not adopted"
                );
                return;
            }
            match *cursor {
                Some(current) if current >= new_cursor => false,
                _ => {
                    *cursor = Some(new_cursor);
                    self.checkpoints.request_write(new_cursor);
                    true
                }
            }
        };

        if !adopted {
            let current_cursor = *lock(&self.cursor);
            debug!(
                event = events::DELIVERY_CURSOR_KEPT,
                component = COMPONENT,
                channel_key = %self.key,
                previous = ?previous_cursor,
                new = new_cursor.value(),
                current = ?current_cursor,
                "cursor not updated"
            );
        } else if self.debug {
            debug!(
                event = events::DELIVERY_CURSOR_ADOPTED,
                component = COMPONENT,
                channel_key = %self.key,
                cursor = new_cursor.value(),
                "cursor advanced"
            );
        }
    }
}
