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
use channel_bridge::capabilities::transport::{
    CancelError, ChannelEvent, ChannelListener, StreamingSession, StreamingTransport,
    SubscriptionHandle, TransportError,
};
use channel_bridge::config::ConnectionOptions;
use channel_bridge::Cursor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// How subscription handles answer `cancel`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelBehavior {
    Succeed,
    Fail,
    /// Fail the next `n` attempts, then succeed.
    FailTimes(usize),
    /// Never resolve.
    Hang,
}

struct Subscription {
    channel: String,
    listener: Arc<dyn ChannelListener>,
    released: Arc<AtomicBool>,
}

struct ScriptState {
    logins: Mutex<Vec<String>>,
    login_failure: Mutex<Option<String>>,
    subscribe_failures: Mutex<HashMap<String, String>>,
    subscribe_requests: Mutex<HashMap<String, Vec<Cursor>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    live: Mutex<HashMap<String, usize>>,
    max_live: Mutex<HashMap<String, usize>>,
    cancel_behavior: Mutex<CancelBehavior>,
    cancel_attempts: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptState {
    fn release(&self, channel: &str, released: &AtomicBool) {
        if !released.swap(true, Ordering::SeqCst) {
            if let Some(count) = guard(&self.live).get_mut(channel) {
                *count = count.saturating_sub(1);
            }
        }
    }

    fn listeners_for(&self, channel: &str) -> Vec<Arc<dyn ChannelListener>> {
        guard(&self.subscriptions)
            .iter()
            .filter(|subscription| {
                subscription.channel == channel && !subscription.released.load(Ordering::SeqCst)
            })
            .map(|subscription| subscription.listener.clone())
            .collect()
    }
}

/// Upstream transport driven by the test: it records logins and subscriptions and
/// lets the test push events or auth failures into live subscriptions.
///
/// Cloning shares the underlying script.
#[derive(Clone)]
pub struct ScriptedTransport {
    state: Arc<ScriptState>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ScriptState {
                logins: Mutex::new(Vec::new()),
                login_failure: Mutex::new(None),
                subscribe_failures: Mutex::new(HashMap::new()),
                subscribe_requests: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(Vec::new()),
                live: Mutex::new(HashMap::new()),
                max_live: Mutex::new(HashMap::new()),
                cancel_behavior: Mutex::new(CancelBehavior::Succeed),
                cancel_attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Makes every following login fail, or succeed again with `None`.
    pub fn fail_logins(&self, reason: Option<&str>) {
        *guard(&self.state.login_failure) = reason.map(str::to_string);
    }

    pub fn fail_subscribe(&self, channel: &str, reason: &str) {
        guard(&self.state.subscribe_failures).insert(channel.to_string(), reason.to_string());
    }

    pub fn set_cancel_behavior(&self, behavior: CancelBehavior) {
        *guard(&self.state.cancel_behavior) = behavior;
    }

    /// Usernames of every login attempt, in order.
    pub fn logins(&self) -> Vec<String> {
        guard(&self.state.logins).clone()
    }

    /// Replay cursors requested by every subscribe call on `channel`, in order.
    pub fn subscribe_requests(&self, channel: &str) -> Vec<Cursor> {
        guard(&self.state.subscribe_requests)
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub fn live_subscriptions(&self, channel: &str) -> usize {
        guard(&self.state.live).get(channel).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously live subscriptions ever seen on `channel`.
    pub fn max_live_subscriptions(&self, channel: &str) -> usize {
        guard(&self.state.max_live).get(channel).copied().unwrap_or(0)
    }

    pub fn cancel_attempts(&self) -> usize {
        self.state.cancel_attempts.load(Ordering::SeqCst)
    }

    /// Delivers one event to every live subscription on `channel` and returns how many
    /// listeners received it.
    pub async fn emit(&self, channel: &str, cursor: i64, payload: serde_json::Value) -> usize {
        let listeners = self.state.listeners_for(channel);
        for listener in &listeners {
            listener
                .on_event(ChannelEvent::new(Cursor::new(cursor), payload.clone()))
                .await;
        }
        listeners.len()
    }

    /// Reports an authentication failure to every live subscription on `channel`.
    pub async fn fail_auth(&self, channel: &str, reason: &str) -> usize {
        let listeners = self.state.listeners_for(channel);
        for listener in &listeners {
            listener.on_auth_failure(reason.to_string()).await;
        }
        listeners.len()
    }
}

#[async_trait]
impl StreamingTransport for ScriptedTransport {
    async fn login(
        &self,
        connection: &ConnectionOptions,
    ) -> Result<Arc<dyn StreamingSession>, TransportError> {
        guard(&self.state.logins).push(connection.username.clone());
        if let Some(reason) = guard(&self.state.login_failure).clone() {
            return Err(TransportError::Login(reason));
        }
        Ok(Arc::new(ScriptedSession {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedSession {
    state: Arc<ScriptState>,
}

#[async_trait]
impl StreamingSession for ScriptedSession {
    async fn subscribe(
        &self,
        channel: &str,
        replay_from: Cursor,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError> {
        guard(&self.state.subscribe_requests)
            .entry(channel.to_string())
            .or_default()
            .push(replay_from);
        if let Some(reason) = guard(&self.state.subscribe_failures).get(channel) {
            return Err(TransportError::Subscribe(reason.clone()));
        }

        let released = Arc::new(AtomicBool::new(false));
        guard(&self.state.subscriptions).push(Subscription {
            channel: channel.to_string(),
            listener,
            released: released.clone(),
        });
        let live = {
            let mut live = guard(&self.state.live);
            let count = live.entry(channel.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let mut max_live = guard(&self.state.max_live);
        let max = max_live.entry(channel.to_string()).or_insert(0);
        *max = (*max).max(live);
        debug!(channel, replay_from = replay_from.value(), live, "scripted subscribe");

        Ok(Box::new(ScriptedHandle {
            state: self.state.clone(),
            channel: channel.to_string(),
            released,
        }))
    }
}

struct ScriptedHandle {
    state: Arc<ScriptState>,
    channel: String,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl SubscriptionHandle for ScriptedHandle {
    async fn cancel(&self) -> Result<(), CancelError> {
        self.state.cancel_attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let mut behavior = guard(&self.state.cancel_behavior);
            let current = *behavior;
            if let CancelBehavior::FailTimes(remaining) = current {
                *behavior = if remaining > 1 {
                    CancelBehavior::FailTimes(remaining - 1)
                } else {
                    CancelBehavior::Succeed
                };
            }
            current
        };

        match behavior {
            CancelBehavior::Succeed => {
                self.state.release(&self.channel, &self.released);
                Ok(())
            }
            CancelBehavior::Fail | CancelBehavior::FailTimes(_) => {
                Err(CancelError("scripted cancel failure".to_string()))
            }
            CancelBehavior::Hang => std::future::pending().await,
        }
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.state.release(&self.channel, &self.released);
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelBehavior, ScriptedTransport};
    use async_trait::async_trait;
    use channel_bridge::capabilities::transport::{
        ChannelEvent, ChannelListener, StreamingTransport,
    };
    use channel_bridge::config::ConnectionOptions;
    use channel_bridge::Cursor;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect(Mutex<Vec<i64>>);

    #[async_trait]
    impl ChannelListener for Collect {
        async fn on_event(&self, event: ChannelEvent) {
            self.0.lock().unwrap().push(event.cursor.value());
        }

        async fn on_auth_failure(&self, _reason: String) {}
    }

    #[tokio::test]
    async fn emits_to_live_subscriptions_until_cancelled() {
        let transport = ScriptedTransport::new();
        transport.set_cancel_behavior(CancelBehavior::FailTimes(1));
        let session = transport
            .login(&ConnectionOptions::default())
            .await
            .expect("login succeeds");
        let listener = Arc::new(Collect::default());
        let handle = session
            .subscribe("/event/A", Cursor::EARLIEST, listener.clone())
            .await
            .expect("subscribe succeeds");

        assert_eq!(transport.emit("/event/A", 3, serde_json::json!({})).await, 1);
        assert!(handle.cancel().await.is_err());
        assert_eq!(transport.live_subscriptions("/event/A"), 1);
        assert!(handle.cancel().await.is_ok());
        assert_eq!(transport.emit("/event/A", 4, serde_json::json!({})).await, 0);

        assert_eq!(*listener.0.lock().unwrap(), vec![3]);
        assert_eq!(transport.live_subscriptions("/event/A"), 0);
        assert_eq!(transport.max_live_subscriptions("/event/A"), 1);
        assert_eq!(transport.subscribe_requests("/event/A"), vec![Cursor::EARLIEST]);
        assert_eq!(transport.cancel_attempts(), 2);
    }

    #[tokio::test]
    async fn dropping_handle_releases_subscription() {
        let transport = ScriptedTransport::new();
        let session = transport
            .login(&ConnectionOptions::default())
            .await
            .expect("login succeeds");
        let handle = session
            .subscribe("/event/A", Cursor::LATEST, Arc::new(Collect::default()))
            .await
            .expect("subscribe succeeds");

        drop(handle);

        assert_eq!(transport.live_subscriptions("/event/A"), 0);
    }

    #[tokio::test]
    async fn scripted_login_failure() {
        let transport = ScriptedTransport::new();
        transport.fail_logins(Some("bad credentials"));

        let connection = ConnectionOptions {
            username: "ops".to_string(),
            ..Default::default()
        };
        assert!(transport.login(&connection).await.is_err());
        assert_eq!(transport.logins(), vec!["ops".to_string()]);
    }
}
