//! Connection lifecycle: state machine, reconnection with backoff and health
//! monitoring.
//!
//! The manager does not own a socket itself. It drives a [`Connector`] that
//! knows how to open, authenticate and ping a transport, and it is told about
//! transport loss through [`ConnectionManager::handle_connection_lost`].
//! All mutable state sits behind one async mutex; event callbacks run after
//! the lock is released.

use crate::config::{ClientConfig, ReconnectPolicy};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use shared::collections::{BoundedLog, Overflow};
use shared::{timestamp_secs, ConnectionError, TransportStats};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

const EVENT_LOG_CAPACITY: usize = 1000;
const PING_HISTORY_CAPACITY: usize = 100;
const LOSS_HISTORY_CAPACITY: usize = 50;

const PING_DEGRADED_MS: f64 = 500.0;
const LOSS_DEGRADED: f64 = 0.05;
const PING_WARNING_MS: f64 = 1000.0;
const LOSS_WARNING: f64 = 0.1;
const PING_WARNING_WINDOW: usize = 10;
const LOSS_WARNING_WINDOW: usize = 5;

const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    Reconnecting,
    Error,
    Timeout,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
            ConnectionState::Timeout => "timeout",
        }
    }

    /// Whether a live transport is expected in this state
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Authenticated
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    ClientRequest,
    ServerShutdown,
    ConnectionLost,
    Timeout,
    AuthenticationFailed,
    ProtocolError,
    Kicked,
    ServerFull,
    VersionMismatch,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::ClientRequest => "client_request",
            DisconnectReason::ServerShutdown => "server_shutdown",
            DisconnectReason::ConnectionLost => "connection_lost",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::AuthenticationFailed => "authentication_failed",
            DisconnectReason::ProtocolError => "protocol_error",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::ServerFull => "server_full",
            DisconnectReason::VersionMismatch => "version_mismatch",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection quality as seen by the manager
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionHealth {
    /// Latest round trip in milliseconds
    pub ping: f64,
    /// Fraction in [0, 1]
    pub packet_loss: f64,
    pub last_message_time: f64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_uptime: f64,
    pub reconnect_count: u32,
    pub error_count: u64,
}

impl ConnectionHealth {
    fn apply_transport(&mut self, stats: &TransportStats) {
        self.messages_sent = stats.messages_sent;
        self.messages_received = stats.messages_received;
        self.bytes_sent = stats.bytes_sent;
        self.bytes_received = stats.bytes_received;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChanged,
    ConnectionLost,
    ConnectionSuccess,
    AuthenticationSuccess,
    ReconnectStarted,
    ReconnectSuccess,
    ReconnectFailed,
    HealthDegraded,
    HealthRecovered,
    HealthWarning,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::StateChanged => "state_changed",
            EventKind::ConnectionLost => "connection_lost",
            EventKind::ConnectionSuccess => "connection_success",
            EventKind::AuthenticationSuccess => "authentication_success",
            EventKind::ReconnectStarted => "reconnect_started",
            EventKind::ReconnectSuccess => "reconnect_success",
            EventKind::ReconnectFailed => "reconnect_failed",
            EventKind::HealthDegraded => "health_degraded",
            EventKind::HealthRecovered => "health_recovered",
            EventKind::HealthWarning => "health_warning",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerEvent {
    pub kind: EventKind,
    pub timestamp: f64,
    pub data: Value,
}

pub type EventCallback = Arc<dyn Fn(&ManagerEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub last_state_change: f64,
    pub health: ConnectionHealth,
    pub average_ping: f64,
    pub average_packet_loss: f64,
    pub policy_enabled: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub events_recorded: usize,
}

/// Opens and maintains the underlying transport on behalf of the manager
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh transport, replacing any previous one
    async fn connect(&self) -> Result<(), ConnectionError>;

    async fn authenticate(&self) -> Result<(), ConnectionError>;

    async fn send_ping(&self) -> Result<(), ConnectionError>;

    /// Counters of the current transport, if one is open
    async fn transport_stats(&self) -> Option<TransportStats>;

    async fn disconnect(&self);
}

struct ManagerState {
    state: ConnectionState,
    last_state_change: f64,
    connected_since: Option<f64>,
    health: ConnectionHealth,
    reconnect_attempts: u32,
    ping_history: BoundedLog<f64>,
    loss_history: BoundedLog<f64>,
    events: BoundedLog<ManagerEvent>,
    ping_degraded: bool,
    loss_degraded: bool,
    reconnect_task: Option<JoinHandle<()>>,
    monitor: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_state_change: timestamp_secs(),
            connected_since: None,
            health: ConnectionHealth::default(),
            reconnect_attempts: 0,
            ping_history: BoundedLog::new(PING_HISTORY_CAPACITY, Overflow::Halve),
            loss_history: BoundedLog::new(LOSS_HISTORY_CAPACITY, Overflow::Halve),
            events: BoundedLog::new(EVENT_LOG_CAPACITY, Overflow::Halve),
            ping_degraded: false,
            loss_degraded: false,
            reconnect_task: None,
            monitor: None,
        }
    }

    fn emit(&mut self, kind: EventKind, data: Value, out: &mut Vec<ManagerEvent>) {
        let event = ManagerEvent {
            kind,
            timestamp: timestamp_secs(),
            data,
        };
        self.events.push(event.clone());
        out.push(event);
    }

    fn transition(&mut self, new_state: ConnectionState, reason: &str, out: &mut Vec<ManagerEvent>) {
        if self.state == new_state {
            return;
        }

        let old_state = self.state;
        self.state = new_state;
        self.last_state_change = timestamp_secs();
        info!("Connection state: {} -> {} ({})", old_state, new_state, reason);

        self.emit(
            EventKind::StateChanged,
            json!({
                "old_state": old_state.as_str(),
                "new_state": new_state.as_str(),
                "reason": reason,
            }),
            out,
        );
    }

    fn refresh_uptime(&mut self) {
        if let (true, Some(since)) = (self.state.is_connected(), self.connected_since) {
            self.health.connection_uptime = (timestamp_secs() - since).max(0.0);
        }
    }

    /// Emits degraded/recovered events when a metric crosses its threshold
    fn check_thresholds(&mut self, out: &mut Vec<ManagerEvent>) {
        let ping_high = self.health.ping > PING_DEGRADED_MS;
        if ping_high != self.ping_degraded {
            self.ping_degraded = ping_high;
            let kind = if ping_high {
                EventKind::HealthDegraded
            } else {
                EventKind::HealthRecovered
            };
            let data = json!({
                "metric": "ping",
                "value": self.health.ping,
                "threshold": PING_DEGRADED_MS,
            });
            self.emit(kind, data, out);
        }

        let loss_high = self.health.packet_loss > LOSS_DEGRADED;
        if loss_high != self.loss_degraded {
            self.loss_degraded = loss_high;
            let kind = if loss_high {
                EventKind::HealthDegraded
            } else {
                EventKind::HealthRecovered
            };
            let data = json!({
                "metric": "packet_loss",
                "value": self.health.packet_loss,
                "threshold": LOSS_DEGRADED,
            });
            self.emit(kind, data, out);
        }
    }
}

fn average<'a>(values: impl Iterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0_f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

struct CallbackEntry {
    id: CallbackId,
    kind: EventKind,
    callback: EventCallback,
}

struct Inner {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    ping_interval: Duration,
    health_check_interval: Duration,
    timeout_threshold: Duration,
    state: Mutex<ManagerState>,
    callbacks: Mutex<Vec<CallbackEntry>>,
    next_callback_id: AtomicU64,
    cancel_reconnect: Notify,
}

/// Cheap to clone; every clone drives the same session
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                policy: config.reconnect.clone(),
                ping_interval: config.ping_interval,
                health_check_interval: config.health_check_interval,
                timeout_threshold: config.timeout_threshold,
                state: Mutex::new(ManagerState::new()),
                callbacks: Mutex::new(Vec::new()),
                next_callback_id: AtomicU64::new(1),
                cancel_reconnect: Notify::new(),
            }),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.state.lock().await.state
    }

    pub async fn health(&self) -> ConnectionHealth {
        self.inner.state.lock().await.health.clone()
    }

    pub async fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().await.reconnect_attempts
    }

    pub async fn set_state(&self, new_state: ConnectionState, reason: &str) {
        let mut events = Vec::new();
        self.inner
            .state
            .lock()
            .await
            .transition(new_state, reason, &mut events);
        self.dispatch(events).await;
    }

    /// Opens and authenticates a transport
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let current = self.state().await;
        if current == ConnectionState::Authenticated {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting, "Connecting").await;
        if let Err(e) = self.inner.connector.connect().await {
            self.inner.state.lock().await.health.error_count += 1;
            self.set_state(
                ConnectionState::Disconnected,
                &format!("Connection failed: {e}"),
            )
            .await;
            return Err(e);
        }
        self.handle_connection_success().await;

        self.set_state(ConnectionState::Authenticating, "Sending authentication")
            .await;
        match self.inner.connector.authenticate().await {
            Ok(()) => {
                self.handle_authentication_success().await;
                Ok(())
            }
            Err(e) => {
                self.inner.connector.disconnect().await;
                self.set_state(
                    ConnectionState::Error,
                    &format!("Authentication failed: {e}"),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Voluntary shutdown: no reconnection follows
    pub async fn disconnect(&self) {
        self.cancel_reconnection().await;
        self.stop_monitoring().await;
        self.inner.connector.disconnect().await;
        self.handle_connection_lost(DisconnectReason::ClientRequest)
            .await;
    }

    pub async fn handle_connection_success(&self) {
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            st.transition(ConnectionState::Connected, "Connection established", &mut events);
            let attempts = st.reconnect_attempts;
            st.reconnect_attempts = 0;

            let now = timestamp_secs();
            st.connected_since = Some(now);
            st.health.last_message_time = now;
            st.health.connection_uptime = 0.0;
            st.health.error_count = 0;

            st.emit(
                EventKind::ConnectionSuccess,
                json!({ "attempts": attempts }),
                &mut events,
            );
        }
        self.dispatch(events).await;
    }

    pub async fn handle_authentication_success(&self) {
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            st.transition(
                ConnectionState::Authenticated,
                "Authentication successful",
                &mut events,
            );
            st.emit(EventKind::AuthenticationSuccess, json!({}), &mut events);
        }
        self.dispatch(events).await;
    }

    /// Records a loss and, unless it was requested by the client, starts
    /// reconnecting when the policy allows it.
    ///
    /// Losses reported while no transport is expected (already disconnected,
    /// reconnecting or in the terminal error state) are ignored.
    pub async fn handle_connection_lost(&self, reason: DisconnectReason) {
        let voluntary = reason == DisconnectReason::ClientRequest;
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            let expected_transport = matches!(
                st.state,
                ConnectionState::Connected
                    | ConnectionState::Authenticating
                    | ConnectionState::Authenticated
                    | ConnectionState::Timeout
            );
            if !voluntary && !expected_transport {
                debug!("Ignoring connection loss ({}) in state {}", reason, st.state);
                return;
            }

            st.refresh_uptime();
            st.transition(
                ConnectionState::Disconnected,
                &format!("Connection lost: {reason}"),
                &mut events,
            );
            st.connected_since = None;
            if !voluntary {
                st.health.error_count += 1;
            }

            let uptime = st.health.connection_uptime;
            st.emit(
                EventKind::ConnectionLost,
                json!({ "reason": reason.as_str(), "uptime": uptime }),
                &mut events,
            );
        }
        self.dispatch(events).await;

        if self.inner.policy.enabled && !voluntary {
            self.start_reconnection().await;
        }
    }

    /// Retries immediately from any state, including the terminal error
    /// state, with a fresh attempt budget
    pub async fn force_reconnect(&self) {
        {
            let mut st = self.inner.state.lock().await;
            if st.state == ConnectionState::Reconnecting {
                return;
            }
            if st.state.is_connected() {
                warn!("Forcing reconnection while connected");
            }
            st.reconnect_attempts = 0;
        }
        self.inner.connector.disconnect().await;
        self.start_reconnection().await;
    }

    pub async fn cancel_reconnection(&self) {
        let mut events = Vec::new();
        let task = {
            let mut st = self.inner.state.lock().await;
            st.reconnect_attempts = 0;
            if st.state == ConnectionState::Reconnecting {
                st.transition(
                    ConnectionState::Disconnected,
                    "Reconnection cancelled",
                    &mut events,
                );
            }
            st.reconnect_task.take()
        };
        self.inner.cancel_reconnect.notify_waiters();
        self.dispatch(events).await;

        if let Some(mut task) = task {
            if timeout(JOIN_TIMEOUT, &mut task).await.is_err() {
                warn!("Reconnection task did not stop in time, aborting");
                task.abort();
            }
        }
    }

    async fn start_reconnection(&self) {
        let mut events = Vec::new();
        let spawn = {
            let mut st = self.inner.state.lock().await;
            if st.state == ConnectionState::Reconnecting {
                return;
            }

            if st.reconnect_attempts >= self.inner.policy.max_attempts {
                error!(
                    "Max reconnection attempts ({}) exceeded",
                    self.inner.policy.max_attempts
                );
                st.transition(
                    ConnectionState::Error,
                    "Max reconnection attempts exceeded",
                    &mut events,
                );
                st.emit(
                    EventKind::ReconnectFailed,
                    json!({ "reason": "max_attempts_exceeded" }),
                    &mut events,
                );
                false
            } else {
                st.transition(
                    ConnectionState::Reconnecting,
                    "Starting reconnection",
                    &mut events,
                );
                let attempt = st.reconnect_attempts + 1;
                st.emit(
                    EventKind::ReconnectStarted,
                    json!({ "attempt": attempt }),
                    &mut events,
                );
                true
            }
        };
        self.dispatch(events).await;

        if spawn {
            let task = tokio::spawn(self.clone().reconnection_loop());
            self.inner.state.lock().await.reconnect_task = Some(task);
        }
    }

    async fn reconnection_loop(self) {
        let max_attempts = self.inner.policy.max_attempts;

        loop {
            let attempt = {
                let mut st = self.inner.state.lock().await;
                if st.state != ConnectionState::Reconnecting || st.reconnect_attempts >= max_attempts {
                    break;
                }
                st.reconnect_attempts += 1;
                st.reconnect_attempts
            };

            let delay = self.inner.policy.delay_for_attempt(attempt);
            info!(
                "Reconnection attempt {}/{} in {:.1}s",
                attempt,
                max_attempts,
                delay.as_secs_f64()
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.inner.cancel_reconnect.notified() => {
                    debug!("Reconnection cancelled during backoff");
                    return;
                }
            }
            if self.state().await != ConnectionState::Reconnecting {
                return;
            }

            match self.establish().await {
                Ok(()) => {
                    if self.state().await != ConnectionState::Reconnecting {
                        self.inner.connector.disconnect().await;
                        return;
                    }
                    self.handle_connection_success().await;
                    self.handle_authentication_success().await;

                    let mut events = Vec::new();
                    {
                        let mut st = self.inner.state.lock().await;
                        st.health.reconnect_count += 1;
                        st.emit(
                            EventKind::ReconnectSuccess,
                            json!({ "attempts": attempt }),
                            &mut events,
                        );
                    }
                    self.dispatch(events).await;
                    info!("Reconnection successful");
                    return;
                }
                Err(e) => {
                    warn!("Reconnection attempt {} failed: {}", attempt, e);
                    self.inner.connector.disconnect().await;
                }
            }
        }

        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            if st.state == ConnectionState::Reconnecting && st.reconnect_attempts >= max_attempts {
                error!("All reconnection attempts failed");
                st.transition(ConnectionState::Error, "Reconnection failed", &mut events);
                st.emit(
                    EventKind::ReconnectFailed,
                    json!({ "reason": "all_attempts_failed" }),
                    &mut events,
                );
            }
        }
        self.dispatch(events).await;
    }

    async fn establish(&self) -> Result<(), ConnectionError> {
        self.inner.connector.connect().await?;
        self.inner.connector.authenticate().await
    }

    pub async fn start_monitoring(&self) {
        let mut st = self.inner.state.lock().await;
        if st.monitor.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.clone().monitoring_loop(shutdown_rx));
        st.monitor = Some((shutdown_tx, task));
        debug!("Connection monitoring started");
    }

    pub async fn stop_monitoring(&self) {
        let monitor = self.inner.state.lock().await.monitor.take();
        if let Some((shutdown, mut task)) = monitor {
            let _ = shutdown.send(true);
            if timeout(JOIN_TIMEOUT, &mut task).await.is_err() {
                warn!("Health monitor did not stop in time, aborting");
                task.abort();
            }
            debug!("Connection monitoring stopped");
        }
    }

    async fn monitoring_loop(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.inner.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_ping: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            self.check_health(&mut last_ping).await;
        }
        debug!("Health monitoring loop stopped");
    }

    async fn check_health(&self, last_ping: &mut Option<Instant>) {
        let state = self.state().await;

        let ping_due = last_ping.map_or(true, |at| at.elapsed() >= self.inner.ping_interval);
        if state.is_connected() && ping_due {
            match self.inner.connector.send_ping().await {
                Ok(()) => *last_ping = Some(Instant::now()),
                Err(e) => warn!("Failed to send ping: {}", e),
            }
        }

        if let Some(stats) = self.inner.connector.transport_stats().await {
            self.update_health(|health| health.apply_transport(&stats))
                .await;
        }

        let timed_out = {
            let st = self.inner.state.lock().await;
            let last = st.health.last_message_time;
            last > 0.0
                && timestamp_secs() - last > self.inner.timeout_threshold.as_secs_f64()
                && st.state.is_connected()
        };
        if timed_out {
            warn!("Connection timeout detected");
            self.set_state(ConnectionState::Timeout, "No messages received")
                .await;
            self.inner.connector.disconnect().await;
            self.handle_connection_lost(DisconnectReason::Timeout).await;
        }

        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            let recent_ping = average(st.ping_history.recent(PING_WARNING_WINDOW));
            if let Some(avg) = recent_ping.filter(|avg| *avg > PING_WARNING_MS) {
                st.emit(
                    EventKind::HealthWarning,
                    json!({ "type": "high_ping", "value": avg }),
                    &mut events,
                );
            }
            let recent_loss = average(st.loss_history.recent(LOSS_WARNING_WINDOW));
            if let Some(avg) = recent_loss.filter(|avg| *avg > LOSS_WARNING) {
                st.emit(
                    EventKind::HealthWarning,
                    json!({ "type": "high_packet_loss", "value": avg }),
                    &mut events,
                );
            }
        }
        self.dispatch(events).await;
    }

    /// Applies `update` to the health record, then refreshes uptime and
    /// checks the degradation thresholds
    pub async fn update_health<F>(&self, update: F)
    where
        F: FnOnce(&mut ConnectionHealth),
    {
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            update(&mut st.health);
            st.refresh_uptime();
            st.check_thresholds(&mut events);
        }
        self.dispatch(events).await;
    }

    /// Records a round trip time in milliseconds
    pub async fn record_ping(&self, ping_ms: f64) {
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            st.health.ping = ping_ms;
            st.ping_history.push(ping_ms);
            st.check_thresholds(&mut events);
        }
        self.dispatch(events).await;
    }

    pub async fn record_message_received(&self) {
        self.inner.state.lock().await.health.last_message_time = timestamp_secs();
    }

    /// Records the loss rate for a window; ignored when nothing was sent
    pub async fn calculate_packet_loss(&self, sent_count: u64, received_count: u64) {
        if sent_count == 0 {
            return;
        }
        let loss = sent_count.saturating_sub(received_count) as f64 / sent_count as f64;

        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;
            st.health.packet_loss = loss;
            st.loss_history.push(loss);
            st.check_thresholds(&mut events);
        }
        self.dispatch(events).await;
    }

    pub async fn get_connection_stats(&self) -> ConnectionStats {
        let mut st = self.inner.state.lock().await;
        st.refresh_uptime();
        ConnectionStats {
            state: st.state,
            last_state_change: st.last_state_change,
            health: st.health.clone(),
            average_ping: average(st.ping_history.iter()).unwrap_or(0.0),
            average_packet_loss: average(st.loss_history.iter()).unwrap_or(0.0),
            policy_enabled: self.inner.policy.enabled,
            reconnect_attempts: st.reconnect_attempts,
            max_reconnect_attempts: self.inner.policy.max_attempts,
            events_recorded: st.events.len(),
        }
    }

    /// Up to `count` most recent events, oldest first
    pub async fn get_recent_events(&self, count: usize) -> Vec<ManagerEvent> {
        self.inner
            .state
            .lock()
            .await
            .events
            .recent(count)
            .cloned()
            .collect()
    }

    pub async fn add_event_callback<F>(&self, kind: EventKind, callback: F) -> CallbackId
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        let id = CallbackId(self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed));
        self.inner.callbacks.lock().await.push(CallbackEntry {
            id,
            kind,
            callback: Arc::new(callback),
        });
        id
    }

    pub async fn remove_event_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.inner.callbacks.lock().await;
        let before = callbacks.len();
        callbacks.retain(|entry| entry.id != id);
        callbacks.len() != before
    }

    async fn dispatch(&self, events: Vec<ManagerEvent>) {
        if events.is_empty() {
            return;
        }

        let callbacks: Vec<(EventKind, EventCallback)> = self
            .inner
            .callbacks
            .lock()
            .await
            .iter()
            .map(|entry| (entry.kind, Arc::clone(&entry.callback)))
            .collect();

        for event in &events {
            for (kind, callback) in &callbacks {
                if *kind != event.kind {
                    continue;
                }
                if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                    error!("Event callback error for {}", event.kind);
                }
            }
        }
    }
}
