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

//! Worker state and the read-only status projection.

use crate::cursor::Cursor;
use crate::locking::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

/// Number of entries kept by each status ring.
pub const RING_CAPACITY: usize = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum WorkerState {
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl WorkerState {
    /// Deliveries are only acted upon outside of shutdown.
    pub fn accepts_deliveries(self) -> bool {
        !matches!(self, WorkerState::Stopping | WorkerState::Stopped)
    }
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReceivedEvent {
    pub time: DateTime<Utc>,
    pub cursor: Cursor,
}

/// Snapshot of one worker, produced on demand.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub cursor: Option<Cursor>,
    /// Newest first.
    pub log: Vec<LogEntry>,
    /// Newest first.
    pub recent_events: Vec<ReceivedEvent>,
}

/// Bounded newest-first buffer.
pub(crate) struct RecentRing<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> RecentRing<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn push(&self, entry: T) {
        let mut entries = lock(&self.entries);
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub(crate) fn snapshot(&self) -> Vec<T> {
        lock(&self.entries).iter().cloned().collect()
    }
}

/// Human-readable activity lines of one worker, shared with its checkpoint store.
#[derive(Clone)]
pub struct ActivityLog {
    ring: Arc<RecentRing<LogEntry>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            ring: Arc::new(RecentRing::new(RING_CAPACITY)),
        }
    }

    pub fn record(&self, message: impl Into<String>) {
        self.ring.push(LogEntry {
            time: Utc::now(),
            message: message.into(),
        });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.ring.snapshot()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}
