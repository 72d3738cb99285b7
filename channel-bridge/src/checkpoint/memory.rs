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

//! In-process checkpoint backend.

use crate::capabilities::checkpoint_backend::{
    CheckpointBackend, CheckpointBackendFactory, CheckpointError, CheckpointTable, WriteOutcome,
};
use crate::channel_key::ChannelKey;
use crate::cursor::Cursor;
use crate::locking::lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Keeps checkpoint records in memory with the same conditional-write rule as a
/// durable backend. Records live as long as the backend instance.
#[derive(Default)]
pub struct MemoryCheckpointBackend {
    records: Mutex<HashMap<ChannelKey, Cursor>>,
    write_attempts: AtomicUsize,
}

impl MemoryCheckpointBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record unconditionally.
    pub fn seed(&self, key: &ChannelKey, cursor: Cursor) {
        lock(&self.records).insert(key.clone(), cursor);
    }

    pub fn stored(&self, key: &ChannelKey) -> Option<Cursor> {
        lock(&self.records).get(key).copied()
    }

    /// Number of conditional writes received, accepted or not.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CheckpointBackend for MemoryCheckpointBackend {
    async fn read(&self, key: &ChannelKey) -> Result<Option<Cursor>, CheckpointError> {
        Ok(self.stored(key))
    }

    async fn conditional_write(
        &self,
        key: &ChannelKey,
        cursor: Cursor,
    ) -> Result<WriteOutcome, CheckpointError> {
        self.write_attempts.fetch_add(1, Ordering::Relaxed);
        let mut records = lock(&self.records);
        match records.get(key) {
            Some(stored) if *stored >= cursor => Ok(WriteOutcome::Superseded),
            _ => {
                records.insert(key.clone(), cursor);
                Ok(WriteOutcome::Accepted)
            }
        }
    }
}

/// Hands out one [`MemoryCheckpointBackend`] per table name, reused across reloads.
#[derive(Default)]
pub struct MemoryCheckpointTables {
    tables: Mutex<HashMap<String, Arc<MemoryCheckpointBackend>>>,
}

impl MemoryCheckpointTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, table_name: &str) -> Arc<MemoryCheckpointBackend> {
        lock(&self.tables)
            .entry(table_name.to_string())
            .or_default()
            .clone()
    }
}

impl CheckpointBackendFactory for MemoryCheckpointTables {
    fn open(&self, table: &CheckpointTable) -> Arc<dyn CheckpointBackend> {
        self.table(&table.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryCheckpointBackend, MemoryCheckpointTables};
    use crate::capabilities::checkpoint_backend::{
        CheckpointBackend, CheckpointBackendFactory, CheckpointTable, WriteOutcome,
    };
    use crate::{ChannelKey, Cursor};
    use std::sync::Arc;

    #[tokio::test]
    async fn conditional_write_only_accepts_strictly_greater_cursor() {
        let backend = MemoryCheckpointBackend::new();
        let key = ChannelKey::new("prod", "Orders");

        let outcomes = [
            backend.conditional_write(&key, Cursor::new(10)).await,
            backend.conditional_write(&key, Cursor::new(10)).await,
            backend.conditional_write(&key, Cursor::new(9)).await,
            backend.conditional_write(&key, Cursor::new(11)).await,
        ]
        .map(|outcome| outcome.expect("memory backend never fails"));

        assert_eq!(
            outcomes,
            [
                WriteOutcome::Accepted,
                WriteOutcome::Superseded,
                WriteOutcome::Superseded,
                WriteOutcome::Accepted
            ]
        );
        assert_eq!(backend.read(&key).await.unwrap(), Some(Cursor::new(11)));
        assert_eq!(backend.write_attempts(), 4);
    }

    #[tokio::test]
    async fn tables_reuse_backend_per_name() {
        let tables = MemoryCheckpointTables::new();
        let table = CheckpointTable {
            table_name: "cursors".to_string(),
            key_name: "channel".to_string(),
        };
        let key = ChannelKey::new("prod", "Orders");

        let opened = tables.open(&table);
        opened
            .conditional_write(&key, Cursor::new(3))
            .await
            .expect("memory backend never fails");

        assert_eq!(tables.table("cursors").stored(&key), Some(Cursor::new(3)));
        assert!(Arc::ptr_eq(&tables.table("cursors"), &tables.table("cursors")));
        assert_eq!(tables.table("other").stored(&key), None);
    }
}
