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

//! Durable checkpoint storage contract.

use crate::channel_key::ChannelKey;
use crate::cursor::Cursor;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum CheckpointError {
    Read(String),
    Write(String),
}

impl Display for CheckpointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Read(reason) => write!(f, "checkpoint read failed: {reason}"),
            CheckpointError::Write(reason) => write!(f, "checkpoint write failed: {reason}"),
        }
    }
}

impl Error for CheckpointError {}

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    Accepted,
    /// The durable cursor is already greater than or equal to the offered one.
    Superseded,
}

/// Where checkpoint records live.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CheckpointTable {
    pub table_name: String,
    pub key_name: String,
}

/// Keyed cursor storage with a non-regressing conditional write.
///
/// `conditional_write` must only accept the cursor when no record exists for the key
/// or the stored cursor is strictly smaller than the offered one.
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    async fn read(&self, key: &ChannelKey) -> Result<Option<Cursor>, CheckpointError>;

    async fn conditional_write(
        &self,
        key: &ChannelKey,
        cursor: Cursor,
    ) -> Result<WriteOutcome, CheckpointError>;
}

/// Opens the backend for a configured table.
pub trait CheckpointBackendFactory: Send + Sync {
    fn open(&self, table: &CheckpointTable) -> Arc<dyn CheckpointBackend>;
}
