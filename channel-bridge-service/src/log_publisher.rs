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
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Downstream stand-in that logs each payload under a generated message id.
pub struct LogPublisher {
    topic: String,
}

impl LogPublisher {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, payload: String) -> Result<String, PublishError> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            topic = self.topic.as_str(),
            message_id = message_id.as_str(),
            payload = payload.as_str(),
            "published"
        );
        Ok(message_id)
    }
}

pub struct LogPublisherFactory;

impl PublisherFactory for LogPublisherFactory {
    fn publisher_for(&self, topic: &str) -> Arc<dyn Publisher> {
        Arc::new(LogPublisher::new(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::LogPublisherFactory;
    use channel_bridge::capabilities::publisher::PublisherFactory;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_returns_distinct_message_ids() {
        let publisher = LogPublisherFactory.publisher_for("orders");

        let first = publisher.publish("{}".to_string()).await.expect("publish");
        let second = publisher.publish("{}".to_string()).await.expect("publish");

        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
