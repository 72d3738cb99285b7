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
use channel_bridge::capabilities::publisher::{PublishError, Publisher, PublisherFactory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Publisher that keeps every accepted payload in memory.
pub struct RecordingPublisher {
    topic: String,
    published: Mutex<Vec<String>>,
    failing: AtomicBool,
    next_id: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            published: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// While failing, every publish is rejected and nothing is recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<String> {
        guard(&self.published).clone()
    }

    pub fn published_json(&self) -> Vec<serde_json::Value> {
        self.published()
            .iter()
            .filter_map(|payload| serde_json::from_str(payload).ok())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, payload: String) -> Result<String, PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError(format!("{} is unavailable", self.topic)));
        }
        guard(&self.published).push(payload);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{id}", self.topic))
    }
}

/// Hands out one shared [`RecordingPublisher`] per topic.
#[derive(Default)]
pub struct RecordingPublisherFactory {
    publishers: Mutex<HashMap<String, Arc<RecordingPublisher>>>,
    requests: AtomicUsize,
}

impl RecordingPublisherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher for `topic`, created on demand so tests can configure it up front.
    pub fn publisher(&self, topic: &str) -> Arc<RecordingPublisher> {
        guard(&self.publishers)
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(RecordingPublisher::new(topic)))
            .clone()
    }

    /// Number of `publisher_for` calls received.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PublisherFactory for RecordingPublisherFactory {
    fn publisher_for(&self, topic: &str) -> Arc<dyn Publisher> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.publisher(topic)
    }
}
