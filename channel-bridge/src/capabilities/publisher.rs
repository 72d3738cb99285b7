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

//! Downstream pub/sub contract.

use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub struct PublishError(pub String);

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish failed: {}", self.0)
    }
}

impl Error for PublishError {}

/// Publishes serialized payloads to one downstream topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns the message id assigned by the downstream service.
    async fn publish(&self, payload: String) -> Result<String, PublishError>;
}

/// Builds the publisher for a downstream topic identifier.
pub trait PublisherFactory: Send + Sync {
    fn publisher_for(&self, topic: &str) -> Arc<dyn Publisher>;
}
