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

//! Checkpoint tables stored as JSON files in a local directory.
//!
//! Each table is one file, `<directory>/<table name>.json`, holding an array of
//! records such as `{ "channel": "prod///event/Order__e", "cursor": 11 }` where the
//! key attribute is the configured key name.

use async_trait::async_trait;
use channel_bridge::capabilities::checkpoint_backend::{
    CheckpointBackend, CheckpointBackendFactory, CheckpointError, CheckpointTable, WriteOutcome,
};
use channel_bridge::{ChannelKey, Cursor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

const CURSOR_ATTRIBUTE: &str = "cursor";

/// One lock per table file, shared by every backend in the process.
fn file_lock(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
        OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(path.to_path_buf()).or_default().clone()
}

/// Opens table files below one directory.
pub struct FileCheckpointTables {
    directory: PathBuf,
}

impl FileCheckpointTables {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl CheckpointBackendFactory for FileCheckpointTables {
    fn open(&self, table: &CheckpointTable) -> Arc<dyn CheckpointBackend> {
        Arc::new(FileCheckpointBackend::new(
            self.directory.join(format!("{}.json", table.table_name)),
            &table.key_name,
        ))
    }
}

pub struct FileCheckpointBackend {
    path: PathBuf,
    key_name: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileCheckpointBackend {
    pub fn new(path: impl Into<PathBuf>, key_name: &str) -> Self {
        let path = path.into();
        let lock = file_lock(&path);
        Self {
            path,
            key_name: key_name.to_string(),
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Value>, String> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(format!("unable to read {}: {err}", self.path.display())),
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&data)
            .map_err(|err| format!("unable to parse {}: {err}", self.path.display()))
    }

    fn matches(&self, record: &Value, key: &ChannelKey) -> bool {
        record.get(&self.key_name).and_then(Value::as_str) == Some(key.as_str())
    }

    fn cursor_of(record: &Value) -> Option<Cursor> {
        record
            .get(CURSOR_ATTRIBUTE)
            .and_then(Value::as_i64)
            .map(Cursor::new)
    }

    async fn save(&self, records: &[Value]) -> Result<(), String> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| format!("unable to create {}: {err}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(records)
            .map_err(|err| format!("unable to serialize records: {err}"))?;
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(format!(".tmp-{}", std::process::id()));
        let temp_path = PathBuf::from(temp_path);

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|err| format!("unable to write {}: {err}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|err| {
            format!(
                "unable to rename {} to {}: {err}",
                temp_path.display(),
                self.path.display()
            )
        })
    }
}

#[async_trait]
impl CheckpointBackend for FileCheckpointBackend {
    async fn read(&self, key: &ChannelKey) -> Result<Option<Cursor>, CheckpointError> {
        let _guard = self.lock.lock().await;
        let records = self.load().await.map_err(CheckpointError::Read)?;

        match records.iter().find(|record| self.matches(record, key)) {
            Some(record) => match Self::cursor_of(record) {
                Some(cursor) => Ok(Some(cursor)),
                None => Err(CheckpointError::Read(format!(
                    "record for {key} has no integer '{CURSOR_ATTRIBUTE}'"
                ))),
            },
            None => Ok(None),
        }
    }

    async fn conditional_write(
        &self,
        key: &ChannelKey,
        cursor: Cursor,
    ) -> Result<WriteOutcome, CheckpointError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await.map_err(CheckpointError::Write)?;

        let position = records.iter().position(|record| self.matches(record, key));
        if let Some(stored) = position.and_then(|index| Self::cursor_of(&records[index])) {
            if stored >= cursor {
                debug!(
                    path = %self.path.display(),
                    channel_key = %key,
                    stored = stored.value(),
                    offered = cursor.value(),
                    "conditional write rejected"
                );
                return Ok(WriteOutcome::Superseded);
            }
        }

        let mut record = Map::new();
        record.insert(self.key_name.clone(), Value::from(key.as_str()));
        record.insert(CURSOR_ATTRIBUTE.to_string(), Value::from(cursor.value()));
        let record = Value::Object(record);
        match position {
            Some(index) => records[index] = record,
            None => records.push(record),
        }

        self.save(&records).await.map_err(|err| {
            warn!(path = %self.path.display(), channel_key = %key, err = %err, "unable to persist checkpoint");
            CheckpointError::Write(err)
        })?;
        Ok(WriteOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::{FileCheckpointBackend, FileCheckpointTables};
    use channel_bridge::capabilities::checkpoint_backend::{
        CheckpointBackend, CheckpointBackendFactory, CheckpointTable, WriteOutcome,
    };
    use channel_bridge::{ChannelKey, Cursor};
    use tempfile::tempdir;

    fn orders() -> ChannelKey {
        ChannelKey::new("prod", "/event/Order__e")
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_table() {
        let temp = tempdir().expect("tempdir");
        let backend = FileCheckpointBackend::new(temp.path().join("cursors.json"), "channel");

        assert_eq!(backend.read(&orders()).await.expect("read succeeds"), None);
    }

    #[tokio::test]
    async fn conditional_write_never_regresses() {
        let temp = tempdir().expect("tempdir");
        let backend = FileCheckpointBackend::new(temp.path().join("cursors.json"), "channel");

        let accepted = backend
            .conditional_write(&orders(), Cursor::new(11))
            .await
            .expect("write succeeds");
        let older = backend
            .conditional_write(&orders(), Cursor::new(10))
            .await
            .expect("write succeeds");
        let equal = backend
            .conditional_write(&orders(), Cursor::new(11))
            .await
            .expect("write succeeds");

        assert_eq!(accepted, WriteOutcome::Accepted);
        assert_eq!(older, WriteOutcome::Superseded);
        assert_eq!(equal, WriteOutcome::Superseded);
        assert_eq!(
            backend.read(&orders()).await.expect("read succeeds"),
            Some(Cursor::new(11))
        );
    }

    #[tokio::test]
    async fn records_use_configured_key_name_and_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        let tables = FileCheckpointTables::new(temp.path());
        let table = CheckpointTable {
            table_name: "cursors".to_string(),
            key_name: "id".to_string(),
        };

        let backend = tables.open(&table);
        backend
            .conditional_write(&orders(), Cursor::new(3))
            .await
            .expect("write succeeds");
        backend
            .conditional_write(&ChannelKey::new("dev", "/event/A"), Cursor::new(8))
            .await
            .expect("write succeeds");

        let reopened = tables.open(&table);
        assert_eq!(
            reopened.read(&orders()).await.expect("read succeeds"),
            Some(Cursor::new(3))
        );

        let content =
            std::fs::read_to_string(temp.path().join("cursors.json")).expect("table file exists");
        let records: serde_json::Value = serde_json::from_str(&content).expect("valid json");
        assert_eq!(records[0]["id"], "prod///event/Order__e");
        assert_eq!(records[0]["cursor"], 3);
        assert_eq!(records[1]["id"], "dev///event/A");
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_as_read_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("cursors.json");
        std::fs::write(&path, "not json").expect("write fixture");
        let backend = FileCheckpointBackend::new(&path, "channel");

        assert!(backend.read(&orders()).await.is_err());
        assert!(backend
            .conditional_write(&orders(), Cursor::new(1))
            .await
            .is_err());
    }
}
