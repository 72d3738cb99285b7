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

//! Per-channel debounced checkpoint writer.

use crate::capabilities::checkpoint_backend::{CheckpointBackend, WriteOutcome};
use crate::channel_key::ChannelKey;
use crate::cursor::Cursor;
use crate::locking::lock;
use crate::observability::events;
use crate::worker::status::ActivityLog;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const COMPONENT: &str = "checkpoint_store";

/// Added to the remaining debounce delay before a deferred write fires.
pub const DEFERRED_WRITE_MARGIN: Duration = Duration::from_millis(100);

struct DebounceState {
    /// Start of the current debounce window: the last durable write attempt, or
    /// the last time the store synchronized with the backend.
    window_start: Instant,
    /// Highest cursor handed to `store_cursor` so far.
    requested: Option<Cursor>,
    /// Highest cursor the backend accepted or reported.
    last_stored: Option<Cursor>,
    pending: Option<JoinHandle<()>>,
}

struct StoreInner {
    key: ChannelKey,
    backend: Option<Arc<dyn CheckpointBackend>>,
    delay: Duration,
    initial_cursor: Cursor,
    activity: ActivityLog,
    state: Mutex<DebounceState>,
}

enum WriteAction {
    Now(Cursor),
    Defer(Duration),
    Coalesced,
}

/// Maintains one channel's durable cursor with bounded write frequency.
///
/// Durable writes are conditional, so the stored cursor never regresses even with
/// overlapping writers. A store without a backend fetches the initial cursor and
/// ignores writes.
pub struct CheckpointStore {
    inner: Arc<StoreInner>,
}

impl CheckpointStore {
    pub fn new(
        key: ChannelKey,
        backend: Option<Arc<dyn CheckpointBackend>>,
        delay: Duration,
        initial_cursor: Cursor,
        activity: ActivityLog,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                key,
                backend,
                delay,
                initial_cursor,
                activity,
                state: Mutex::new(DebounceState {
                    window_start: Instant::now(),
                    requested: None,
                    last_stored: None,
                    pending: None,
                }),
            }),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.inner.key
    }

    pub fn is_durable(&self) -> bool {
        self.inner.backend.is_some()
    }

    /// Highest cursor known to be durably stored.
    pub fn last_stored(&self) -> Option<Cursor> {
        lock(&self.inner.state).last_stored
    }

    pub fn has_pending_write(&self) -> bool {
        lock(&self.inner.state).pending.is_some()
    }

    /// Returns the stored cursor, or the initial cursor when none is stored or the
    /// backend cannot be read.
    pub async fn fetch_cursor(&self) -> Cursor {
        let inner = &self.inner;
        let Some(backend) = inner.backend.as_ref() else {
            return inner.initial_cursor;
        };

        match backend.read(&inner.key).await {
            Ok(Some(cursor)) => {
                let mut state = lock(&inner.state);
                state.window_start = Instant::now();
                state.last_stored = state.last_stored.max(Some(cursor));
                debug!(
                    event = events::CHECKPOINT_FETCH_OK,
                    component = COMPONENT,
                    channel_key = %inner.key,
                    cursor = cursor.value(),
                    "fetched stored cursor"
                );
                cursor
            }
            Ok(None) => {
                lock(&inner.state).window_start = Instant::now();
                inner.activity.record(format!(
                    "There is no previously stored cursor, will use {}",
                    inner.initial_cursor
                ));
                info!(
                    event = events::CHECKPOINT_FETCH_EMPTY,
                    component = COMPONENT,
                    channel_key = %inner.key,
                    initial_cursor = inner.initial_cursor.value(),
                    "no stored cursor"
                );
                inner.initial_cursor
            }
            Err(err) => {
                inner.activity.record(format!(
                    "Couldn't fetch previously stored cursor, will use {}: {err}",
                    inner.initial_cursor
                ));
                warn!(
                    event = events::CHECKPOINT_FETCH_FAILED,
                    component = COMPONENT,
                    channel_key = %inner.key,
                    initial_cursor = inner.initial_cursor.value(),
                    err = %err,
                    "unable to fetch stored cursor"
                );
                inner.initial_cursor
            }
        }
    }

    /// Requests a durable write of `cursor`.
    ///
    /// With `flush` the write bypasses the debounce delay, supersedes any deferred
    /// write and completes before this returns. Without it this is `request_write`.
    pub async fn store_cursor(&self, cursor: Cursor, flush: bool) {
        if !flush {
            self.request_write(cursor);
            return;
        }
        if self.inner.backend.is_none() {
            return;
        }
        if let WriteAction::Now(cursor) = self.inner.plan(cursor, true) {
            self.inner.write(cursor).await;
        }
    }

    /// Debounced write that never waits on the backend: the write is issued in the
    /// background when the delay has elapsed, otherwise deferred until it has.
    ///
    /// Safe to call while holding a synchronous lock.
    pub fn request_write(&self, cursor: Cursor) {
        if self.inner.backend.is_none() {
            return;
        }

        match self.inner.plan(cursor, false) {
            WriteAction::Now(cursor) => {
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.write(cursor).await });
            }
            WriteAction::Defer(wait) => {
                debug!(
                    event = events::CHECKPOINT_WRITE_DEFERRED,
                    component = COMPONENT,
                    channel_key = %self.inner.key,
                    cursor = cursor.value(),
                    wait_ms = wait.as_millis() as u64,
                    "checkpoint write deferred"
                );
            }
            WriteAction::Coalesced => {}
        }
    }
}

impl StoreInner {
    fn plan(self: &Arc<Self>, cursor: Cursor, flush: bool) -> WriteAction {
        let mut state = lock(&self.state);
        state.requested = state.requested.max(Some(cursor));
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.window_start);

        if flush || elapsed >= self.delay {
            if let Some(pending) = state.pending.take() {
                pending.abort();
                debug!(
                    event = events::CHECKPOINT_DEFERRED_SUPERSEDED,
                    component = COMPONENT,
                    channel_key = %self.key,
                    "deferred write superseded"
                );
            }
            state.window_start = now;
            WriteAction::Now(state.requested.unwrap_or(cursor))
        } else if state.pending.is_some() {
            WriteAction::Coalesced
        } else {
            let wait = self.delay - elapsed + DEFERRED_WRITE_MARGIN;
            let inner = self.clone();
            state.pending = Some(tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                inner.write_deferred().await;
            }));
            WriteAction::Defer(wait)
        }
    }

    async fn write_deferred(&self) {
        let cursor = {
            let mut state = lock(&self.state);
            state.pending = None;
            state.window_start = Instant::now();
            state.requested
        };
        if let Some(cursor) = cursor {
            self.write(cursor).await;
        }
    }

    async fn write(&self, cursor: Cursor) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        match backend.conditional_write(&self.key, cursor).await {
            Ok(WriteOutcome::Accepted) => {
                let mut state = lock(&self.state);
                state.last_stored = state.last_stored.max(Some(cursor));
                debug!(
                    event = events::CHECKPOINT_WRITE_OK,
                    component = COMPONENT,
                    channel_key = %self.key,
                    cursor = cursor.value(),
                    "cursor stored"
                );
            }
            Ok(WriteOutcome::Superseded) => {
                self.activity.record(format!(
                    "Didn't store cursor {cursor}: an equal or newer cursor is already stored"
                ));
                debug!(
                    event = events::CHECKPOINT_WRITE_SUPERSEDED,
                    component = COMPONENT,
                    channel_key = %self.key,
                    cursor = cursor.value(),
                    "stored cursor is already equal or newer"
                );
            }
            Err(err) => {
                self.activity
                    .record(format!("Didn't store cursor {cursor}: {err}"));
                warn!(
                    event = events::CHECKPOINT_WRITE_FAILED,
                    component = COMPONENT,
                    channel_key = %self.key,
                    cursor = cursor.value(),
                    err = %err,
                    "checkpoint write failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckpointStore, DEFERRED_WRITE_MARGIN};
    use crate::capabilities::checkpoint_backend::{
        CheckpointBackend, CheckpointError, WriteOutcome,
    };
    use crate::checkpoint::MemoryCheckpointBackend;
    use crate::worker::status::ActivityLog;
    use crate::{ChannelKey, Cursor};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    const DELAY: Duration = Duration::from_millis(2000);

    struct UnreachableBackend;

    #[async_trait]
    impl CheckpointBackend for UnreachableBackend {
        async fn read(&self, _key: &ChannelKey) -> Result<Option<Cursor>, CheckpointError> {
            Err(CheckpointError::Read("connection refused".to_string()))
        }

        async fn conditional_write(
            &self,
            _key: &ChannelKey,
            _cursor: Cursor,
        ) -> Result<WriteOutcome, CheckpointError> {
            Err(CheckpointError::Write("connection refused".to_string()))
        }
    }

    fn key() -> ChannelKey {
        ChannelKey::new("prod", "Orders")
    }

    fn store_over(backend: Arc<dyn CheckpointBackend>, activity: ActivityLog) -> CheckpointStore {
        CheckpointStore::new(key(), Some(backend), DELAY, Cursor::LATEST, activity)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn without_backend_fetch_returns_initial_and_writes_are_ignored() {
        let store = CheckpointStore::new(
            key(),
            None,
            DELAY,
            Cursor::EARLIEST,
            ActivityLog::new(),
        );

        assert_eq!(store.fetch_cursor().await, Cursor::EARLIEST);
        store.store_cursor(Cursor::new(5), true).await;
        store.store_cursor(Cursor::new(6), false).await;
        assert!(!store.has_pending_write());
        assert_eq!(store.last_stored(), None);
    }

    #[tokio::test]
    async fn fetch_falls_back_to_initial_cursor_when_nothing_stored() {
        let activity = ActivityLog::new();
        let store = store_over(Arc::new(MemoryCheckpointBackend::new()), activity.clone());

        assert_eq!(store.fetch_cursor().await, Cursor::LATEST);
        assert!(activity.entries()[0]
            .message
            .contains("no previously stored cursor"));
    }

    #[tokio::test]
    async fn fetch_falls_back_to_initial_cursor_on_read_failure() {
        let activity = ActivityLog::new();
        let store = store_over(Arc::new(UnreachableBackend), activity.clone());

        assert_eq!(store.fetch_cursor().await, Cursor::LATEST);
        assert!(activity.entries()[0].message.contains("connection refused"));
    }

    #[tokio::test]
    async fn fetch_returns_stored_cursor() {
        let backend = Arc::new(MemoryCheckpointBackend::new());
        backend.seed(&key(), Cursor::new(100));
        let store = store_over(backend, ActivityLog::new());

        assert_eq!(store.fetch_cursor().await, Cursor::new(100));
        assert_eq!(store.last_stored(), Some(Cursor::new(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn non_flush_writes_within_delay_coalesce_into_one_deferred_write() {
        let backend = Arc::new(MemoryCheckpointBackend::new());
        let store = store_over(backend.clone(), ActivityLog::new());
        store.fetch_cursor().await;

        store.store_cursor(Cursor::new(101), false).await;
        tokio::time::advance(Duration::from_millis(500)).await;
        store.store_cursor(Cursor::new(102), false).await;
        assert!(store.has_pending_write());
        assert_eq!(backend.write_attempts(), 0);

        tokio::time::sleep(DELAY + DEFERRED_WRITE_MARGIN).await;
        settle().await;

        assert_eq!(backend.write_attempts(), 1);
        assert_eq!(backend.stored(&key()), Some(Cursor::new(102)));
        assert!(!store.has_pending_write());
    }

    #[tokio::test(start_paused = true)]
    async fn non_flush_write_after_delay_is_issued_without_waiting() {
        let backend = Arc::new(MemoryCheckpointBackend::new());
        let store = store_over(backend.clone(), ActivityLog::new());

        tokio::time::advance(DELAY).await;
        store.store_cursor(Cursor::new(7), false).await;
        assert!(!store.has_pending_write());
        settle().await;

        assert_eq!(backend.write_attempts(), 1);
        assert_eq!(store.last_stored(), Some(Cursor::new(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_supersedes_pending_deferred_write() {
        let backend = Arc::new(MemoryCheckpointBackend::new());
        let store = store_over(backend.clone(), ActivityLog::new());

        store.store_cursor(Cursor::new(105), false).await;
        assert!(store.has_pending_write());

        store.store_cursor(Cursor::new(105), true).await;
        assert!(!store.has_pending_write());
        assert_eq!(backend.stored(&key()), Some(Cursor::new(105)));

        tokio::time::sleep(DELAY * 2).await;
        settle().await;
        assert_eq!(backend.write_attempts(), 1);
    }

    #[tokio::test]
    async fn flush_never_regresses_durable_cursor() {
        let backend = Arc::new(MemoryCheckpointBackend::new());
        backend.seed(&key(), Cursor::new(200));
        let activity = ActivityLog::new();
        let store = store_over(backend.clone(), activity.clone());

        store.store_cursor(Cursor::new(150), true).await;

        assert_eq!(backend.stored(&key()), Some(Cursor::new(200)));
        assert!(activity.entries()[0].message.contains("Didn't store cursor 150"));
    }

    #[tokio::test]
    async fn failed_flush_is_logged_and_swallowed() {
        let activity = ActivityLog::new();
        let store = store_over(Arc::new(UnreachableBackend), activity.clone());

        store.store_cursor(Cursor::new(9), true).await;

        assert_eq!(store.last_stored(), None);
        assert!(activity.entries()[0].message.contains("connection refused"));
    }
}
