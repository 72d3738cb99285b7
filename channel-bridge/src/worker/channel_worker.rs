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

//! Lifecycle of one channel subscription.

use crate::capabilities::checkpoint_backend::CheckpointBackend;
use crate::capabilities::publisher::Publisher;
use crate::capabilities::transport::{
    ChannelListener, StreamingSession, StreamingTransport, SubscriptionHandle, TransportError,
};
use crate::channel_key::ChannelKey;
use crate::checkpoint::CheckpointStore;
use crate::config::{BridgeOptions, ConnectionOptions};
use crate::cursor::Cursor;
use crate::locking::lock;
use crate::observability::events;
use crate::worker::delivery::DeliveryListener;
use crate::worker::status::{
    ActivityLog, ReceivedEvent, RecentRing, WorkerState, WorkerStatus, RING_CAPACITY,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "channel_worker";

/// Cancellation attempts made by `stop()` before the handle is discarded anyway.
pub const MAX_CANCEL_ATTEMPTS: usize = 5;

#[derive(Debug)]
pub enum StartError {
    Login(TransportError),
    Subscribe(TransportError),
    /// `stop()` was requested while the start was in flight.
    Interrupted,
}

impl Display for StartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::Login(err) => write!(f, "unable to log in: {err}"),
            StartError::Subscribe(err) => write!(f, "unable to open subscription: {err}"),
            StartError::Interrupted => write!(f, "start interrupted by stop"),
        }
    }
}

impl Error for StartError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StartError::Login(err) | StartError::Subscribe(err) => Some(err),
            StartError::Interrupted => None,
        }
    }
}

/// Transport resources owned while a subscription is open.
#[derive(Default)]
pub(super) struct Lifecycle {
    session: Option<Arc<dyn StreamingSession>>,
    subscription: Option<Box<dyn SubscriptionHandle>>,
}

pub(super) struct WorkerInner {
    pub(super) key: ChannelKey,
    connection: ConnectionOptions,
    transport: Arc<dyn StreamingTransport>,
    pub(super) publisher: Arc<dyn Publisher>,
    pub(super) checkpoints: CheckpointStore,
    pub(super) activity: ActivityLog,
    pub(super) recent_events: RecentRing<ReceivedEvent>,
    pub(super) debug: bool,
    cancel_timeout: Duration,
    state: Mutex<WorkerState>,
    /// Also guards transitions of `state` and `generation` that deliveries must observe.
    pub(super) cursor: Mutex<Option<Cursor>>,
    /// Bumped on every start attempt so callbacks of older subscriptions can be told apart.
    pub(super) generation: AtomicU64,
    /// Bumped by `stop()` before it waits for the lifecycle lock.
    stop_requests: AtomicU64,
    stop_signal: Notify,
    /// Serializes start, stop and restart.
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

/// Owns one channel's subscription: start, delivery, restart on auth failure, stop.
///
/// Every event that is published downstream advances the worker's cursor, which is
/// checkpointed with debounced writes and flushed on `stop()`. Cloning yields
/// another handle to the same worker.
#[derive(Clone)]
pub struct ChannelWorker {
    inner: Arc<WorkerInner>,
}

impl ChannelWorker {
    pub fn new(
        key: ChannelKey,
        connection: ConnectionOptions,
        transport: Arc<dyn StreamingTransport>,
        publisher: Arc<dyn Publisher>,
        checkpoint_backend: Option<Arc<dyn CheckpointBackend>>,
        options: &BridgeOptions,
    ) -> Self {
        let activity = ActivityLog::new();
        let checkpoints = CheckpointStore::new(
            key.clone(),
            checkpoint_backend,
            options.checkpoint_delay(),
            options.initial_cursor,
            activity.clone(),
        );

        Self {
            inner: Arc::new(WorkerInner {
                key,
                connection,
                transport,
                publisher,
                checkpoints,
                activity,
                recent_events: RecentRing::new(RING_CAPACITY),
                debug: options.debug,
                cancel_timeout: options.cancel_timeout(),
                state: Mutex::new(WorkerState::Initialized),
                cursor: Mutex::new(None),
                generation: AtomicU64::new(0),
                stop_requests: AtomicU64::new(0),
                stop_signal: Notify::new(),
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            }),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.inner.key
    }

    pub fn state(&self) -> WorkerState {
        self.inner.state()
    }

    /// Last adopted cursor, or the fetched starting cursor before any delivery.
    pub fn cursor(&self) -> Option<Cursor> {
        *lock(&self.inner.cursor)
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.inner.checkpoints
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state(),
            cursor: self.cursor(),
            log: self.inner.activity.entries(),
            recent_events: self.inner.recent_events.snapshot(),
        }
    }

    /// Fetches the starting cursor, logs in and opens the subscription.
    ///
    /// On failure the worker stays `Starting`; callers log the error and carry on.
    /// A `stop()` issued meanwhile abandons the start with [`StartError::Interrupted`].
    pub async fn start(&self) -> Result<(), StartError> {
        let stop_epoch = self.inner.stop_epoch();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.start_locked(&mut lifecycle, stop_epoch).await
    }

    /// Cancels the subscription (bounded retries), releases transport resources and
    /// flushes the cursor. Always ends in `Stopped`, interrupting a pending start.
    pub async fn stop(&self) {
        self.inner.request_stop();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.stop_locked(&mut lifecycle).await;
    }

    pub async fn restart(&self) -> Result<(), StartError> {
        let stop_epoch = self.inner.stop_epoch();
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.stop_locked(&mut lifecycle).await;
        self.inner.start_locked(&mut lifecycle, stop_epoch).await
    }
}

impl WorkerInner {
    pub(super) fn state(&self) -> WorkerState {
        *lock(&self.state)
    }

    fn set_state(&self, state: WorkerState) {
        *lock(&self.state) = state;
    }

    pub(super) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn stop_epoch(&self) -> u64 {
        self.stop_requests.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.stop_requests.fetch_add(1, Ordering::AcqRel);
        self.stop_signal.notify_waiters();
    }

    /// Resolves once `stop()` has been called after `stop_epoch` was read.
    async fn stopped_since(&self, stop_epoch: u64) {
        loop {
            let notified = self.stop_signal.notified();
            if self.stop_epoch() != stop_epoch {
                return;
            }
            notified.await;
        }
    }

    /// Runs `step` unless a stop arrives first.
    async fn unless_stopped<F: Future>(
        &self,
        stop_epoch: u64,
        step: F,
    ) -> Result<F::Output, StartError> {
        tokio::select! {
            output = step => Ok(output),
            _ = self.stopped_since(stop_epoch) => Err(StartError::Interrupted),
        }
    }

    async fn start_locked(
        self: &Arc<Self>,
        lifecycle: &mut Lifecycle,
        stop_epoch: u64,
    ) -> Result<(), StartError> {
        if self.stop_epoch() != stop_epoch {
            return Err(self.start_failed(StartError::Interrupted));
        }
        if self.state() == WorkerState::Started && lifecycle.subscription.is_some() {
            debug!(
                event = events::WORKER_START_SKIPPED,
                component = COMPONENT,
                channel_key = %self.key,
                "worker already started"
            );
            return Ok(());
        }

        info!(
            event = events::WORKER_START,
            component = COMPONENT,
            channel_key = %self.key,
            "starting worker"
        );
        let generation = {
            let _cursor = lock(&self.cursor);
            self.set_state(WorkerState::Starting);
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        self.activity.record("Fetching initial cursor");
        let cursor = match self
            .unless_stopped(stop_epoch, self.checkpoints.fetch_cursor())
            .await
        {
            Ok(cursor) => cursor,
            Err(err) => return Err(self.start_failed(err)),
        };
        *lock(&self.cursor) = Some(cursor);

        self.activity.record("Logging in");
        let session = match self
            .unless_stopped(stop_epoch, self.transport.login(&self.connection))
            .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => return Err(self.start_failed(StartError::Login(err))),
            Err(err) => return Err(self.start_failed(err)),
        };

        let listener: Arc<dyn ChannelListener> =
            Arc::new(DeliveryListener::new(Arc::downgrade(self), generation));

        self.activity.record(format!(
            "Creating subscription for '{}' with initial cursor {cursor}",
            self.key.channel()
        ));
        let subscription = match self
            .unless_stopped(
                stop_epoch,
                session.subscribe(self.key.channel(), cursor, listener),
            )
            .await
        {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(err)) => return Err(self.start_failed(StartError::Subscribe(err))),
            Err(err) => return Err(self.start_failed(err)),
        };

        lifecycle.session = Some(session);
        lifecycle.subscription = Some(subscription);
        self.set_state(WorkerState::Started);
        self.activity.record("Subscription created");
        info!(
            event = events::WORKER_START_OK,
            component = COMPONENT,
            channel_key = %self.key,
            cursor = cursor.value(),
            generation,
            "worker started"
        );

        Ok(())
    }

    fn start_failed(&self, err: StartError) -> StartError {
        self.activity.record(format!("Failed to start: {err}"));
        error!(
            event = events::WORKER_START_FAILED,
            component = COMPONENT,
            channel_key = %self.key,
            err = %err,
            "worker failed to start"
        );
        err
    }

    async fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        info!(
            event = events::WORKER_STOP,
            component = COMPONENT,
            channel_key = %self.key,
            "stopping worker"
        );
        {
            // Deliveries check the state under the cursor lock before adopting.
            let _cursor = lock(&self.cursor);
            self.set_state(WorkerState::Stopping);
        }

        if let Some(subscription) = lifecycle.subscription.take() {
            self.cancel_subscription(subscription.as_ref()).await;
        }

        lifecycle.session = None;
        self.set_state(WorkerState::Stopped);
        self.activity.record("Stopped");
        info!(
            event = events::WORKER_STOP_OK,
            component = COMPONENT,
            channel_key = %self.key,
            "worker stopped"
        );

        let cursor = *lock(&self.cursor);
        if let Some(cursor) = cursor {
            self.checkpoints.store_cursor(cursor, true).await;
        }
    }

    async fn cancel_subscription(&self, subscription: &dyn SubscriptionHandle) {
        for attempt in 1..=MAX_CANCEL_ATTEMPTS {
            self.activity.record("Cancelling subscription");
            info!(
                event = events::WORKER_CANCEL_ATTEMPT,
                component = COMPONENT,
                channel_key = %self.key,
                attempt,
                "cancelling subscription"
            );

            match tokio::time::timeout(self.cancel_timeout, subscription.cancel()).await {
                Ok(Ok(())) => {
                    self.activity.record("Cancelled subscription");
                    debug!(
                        event = events::WORKER_CANCEL_OK,
                        component = COMPONENT,
                        channel_key = %self.key,
                        attempt,
                        "subscription cancelled"
                    );
                    return;
                }
                Ok(Err(err)) => {
                    self.activity
                        .record(format!("Failed to cancel subscription: {err}"));
                    warn!(
                        event = events::WORKER_CANCEL_FAILED,
                        component = COMPONENT,
                        channel_key = %self.key,
                        attempt,
                        err = %err,
                        "failed to cancel subscription"
                    );
                }
                Err(_) => {
                    self.activity
                        .record("Failed to cancel subscription: timed out");
                    warn!(
                        event = events::WORKER_CANCEL_TIMEOUT,
                        component = COMPONENT,
                        channel_key = %self.key,
                        attempt,
                        timeout_ms = self.cancel_timeout.as_millis() as u64,
                        "subscription cancel timed out"
                    );
                }
            }
        }

        self.activity
            .record("Failed to cancel subscription after retries");
        error!(
            event = events::WORKER_CANCEL_EXHAUSTED,
            component = COMPONENT,
            channel_key = %self.key,
            attempts = MAX_CANCEL_ATTEMPTS,
            "failed to cancel subscription after retries; discarding handle"
        );
    }

    /// Queues a restart for the subscription generation that reported the failure.
    ///
    /// The restart runs as its own task so it never re-enters the worker from inside
    /// a transport callback.
    pub(super) fn schedule_restart(self: &Arc<Self>, generation: u64, reason: &str) {
        self.activity
            .record("Restart needed because of auth error (probably expired)");
        warn!(
            event = events::WORKER_AUTH_FAILURE,
            component = COMPONENT,
            channel_key = %self.key,
            generation,
            reason,
            "auth failure reported by transport"
        );

        let inner = self.clone();
        tokio::spawn(async move {
            inner.restart_after_auth_failure(generation).await;
        });
    }

    async fn restart_after_auth_failure(self: Arc<Self>, generation: u64) {
        let stop_epoch = self.stop_epoch();
        let mut lifecycle = self.lifecycle.lock().await;

        let state = self.state();
        if state != WorkerState::Started || self.current_generation() != generation {
            debug!(
                event = events::WORKER_RESTART_SKIPPED,
                component = COMPONENT,
                channel_key = %self.key,
                state = %state,
                generation,
                "restart no longer applies"
            );
            return;
        }

        info!(
            event = events::WORKER_RESTART,
            component = COMPONENT,
            channel_key = %self.key,
            generation,
            "restarting worker"
        );
        self.stop_locked(&mut lifecycle).await;
        if let Err(err) = self.start_locked(&mut lifecycle, stop_epoch).await {
            error!(
                event = events::WORKER_RESTART_FAILED,
                component = COMPONENT,
                channel_key = %self.key,
                err = %err,
                "worker restart failed"
            );
        }
    }
}
