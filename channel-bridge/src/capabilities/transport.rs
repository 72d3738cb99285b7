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

//! Upstream push-messaging contract.

use crate::config::ConnectionOptions;
use crate::cursor::Cursor;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// One event received on a subscribed channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelEvent {
    pub cursor: Cursor,
    pub payload: serde_json::Value,
}

impl ChannelEvent {
    pub fn new(cursor: Cursor, payload: serde_json::Value) -> Self {
        Self { cursor, payload }
    }
}

/// Login and subscription failures reported by the upstream transport.
#[derive(Debug)]
pub enum TransportError {
    Login(String),
    Subscribe(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Login(reason) => write!(f, "login failed: {reason}"),
            TransportError::Subscribe(reason) => write!(f, "subscribe failed: {reason}"),
        }
    }
}

impl Error for TransportError {}

/// Failure to cancel an open subscription.
#[derive(Debug)]
pub struct CancelError(pub String);

impl Display for CancelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cancel failed: {}", self.0)
    }
}

impl Error for CancelError {}

/// Callbacks the transport drives for one subscription.
#[async_trait]
pub trait ChannelListener: Send + Sync {
    async fn on_event(&self, event: ChannelEvent);

    /// The session credentials were rejected after the subscription was opened.
    async fn on_auth_failure(&self, reason: String);
}

/// Handle to an open subscription. Dropping it releases the transport resources.
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    async fn cancel(&self) -> Result<(), CancelError>;
}

/// Authenticated connection to the upstream service.
#[async_trait]
pub trait StreamingSession: Send + Sync {
    async fn subscribe(
        &self,
        channel: &str,
        replay_from: Cursor,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError>;
}

/// Entry point into the upstream service.
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    async fn login(
        &self,
        connection: &ConnectionOptions,
    ) -> Result<Arc<dyn StreamingSession>, TransportError>;
}
