// frontend/src/manager.rs
//
// One logical telemetry connection for the whole dashboard. Sockets come and
// go underneath; subscribers only ever see data / status / error events.

use crate::config::{validate_endpoint, FeedConfig};
use crate::error::FeedError;
use crate::listeners::{Channel, Listener, ListenerId, Registry};
use crate::reconnect::{ReconnectPolicy, RetryDecision, RetryTask, Scheduler};
use crate::transport::{EventSink, Socket, Transport, TransportEvent};
use riverwatch_shared::{decode_frame, TelemetryRecord};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Inner {
    state: ConnectionState,
    endpoint: Option<String>,
    socket: Option<Box<dyn Socket>>,
    // bumped for every socket we open or abandon; older events are ignored
    generation: u64,
    manual_close: bool,
    policy: ReconnectPolicy,
    // identifies the retry timer that is allowed to fire
    retry_token: u64,
    last_error: Option<FeedError>,
}

pub(crate) struct Shared {
    config: FeedConfig,
    inner: Mutex<Inner>,
    listeners: Registry,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    this: Weak<Shared>,
}

/// Cheap to clone; every clone drives the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &inner.state)
            .field("endpoint", &inner.endpoint)
            .field("attempts", &inner.policy.attempts())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        config: FeedConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let shared = Arc::new_cyclic(|this| Shared {
            config,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                endpoint: None,
                socket: None,
                generation: 0,
                manual_close: false,
                policy,
                retry_token: 0,
                last_error: None,
            }),
            listeners: Registry::new(),
            transport,
            scheduler,
            this: this.clone(),
        });
        Self { shared }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    /// Connect to the configured endpoint. A missing or invalid endpoint is
    /// reported on the error channel.
    pub fn start(&self) {
        match self.shared.config.endpoint() {
            Ok(endpoint) => self.shared.open(endpoint, true),
            Err(e) => self.shared.report_config(e),
        }
    }

    /// No-op while already connecting or connected to the same endpoint.
    pub fn connect(&self, endpoint: &str) {
        match validate_endpoint(endpoint) {
            Ok(endpoint) => self.shared.open(endpoint, true),
            Err(e) => self.shared.report_config(e),
        }
    }

    /// `manual = true` is deliberate: pending retries are cancelled and none
    /// are scheduled until the next explicit connect. `manual = false` drops
    /// the socket and lets the reconnect policy take over; with no socket open
    /// it does nothing.
    pub fn close(&self, manual: bool) {
        self.shared.close(manual);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn endpoint(&self) -> Option<String> {
        self.shared.lock().endpoint.clone()
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.shared.lock().policy.attempts()
    }

    pub fn retry_pending(&self) -> bool {
        self.shared.lock().policy.is_pending()
    }

    pub fn last_error(&self) -> Option<FeedError> {
        self.shared.lock().last_error.clone()
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    /// Unknown or already-removed handles are ignored.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    pub fn on_data(&self, f: impl Fn(&TelemetryRecord) + Send + Sync + 'static) -> ListenerId {
        self.add_listener(Listener::data(f))
    }

    pub fn on_status(&self, f: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        self.add_listener(Listener::status(f))
    }

    pub fn on_error(&self, f: impl Fn(Option<&FeedError>) + Send + Sync + 'static) -> ListenerId {
        self.add_listener(Listener::error(f))
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        self.shared.listeners.count(channel)
    }

    /// True after `close(true)` until the next connect.
    pub fn closed_manually(&self) -> bool {
        self.shared.lock().manual_close
    }

    pub(crate) fn same_as(&self, other: &ConnectionManager) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Handle for listeners that need to query the manager without keeping
    /// it alive.
    pub(crate) fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.shared))
    }
}

#[derive(Clone)]
pub(crate) struct WeakManager(Weak<Shared>);

impl WeakManager {
    pub(crate) fn upgrade(&self) -> Option<ConnectionManager> {
        self.0.upgrade().map(|shared| ConnectionManager { shared })
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, endpoint: String, explicit: bool) {
        let was_connected;
        let stale;
        let failed;
        let generation;
        {
            let mut inner = self.lock();
            if matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) && inner.endpoint.as_deref() == Some(endpoint.as_str())
            {
                debug!(endpoint = %endpoint, state = %inner.state, "connect ignored; already active");
                return;
            }

            inner.manual_close = false;
            inner.policy.cancel();
            inner.retry_token += 1;
            if explicit {
                inner.policy.reset();
            }

            was_connected = inner.state == ConnectionState::Connected;
            stale = inner.socket.take();
            inner.generation += 1;
            generation = inner.generation;
            inner.endpoint = Some(endpoint.clone());
            inner.state = ConnectionState::Connecting;

            info!(
                endpoint = %endpoint,
                generation,
                attempt = inner.policy.attempts(),
                "opening telemetry connection"
            );
            let sink = EventSink::new(self.this.clone(), generation);
            match self.transport.open(&endpoint, sink) {
                Ok(socket) => {
                    inner.socket = Some(socket);
                    failed = None;
                }
                Err(e) => failed = Some(e),
            }
        }

        if let Some(mut socket) = stale {
            socket.close();
        }
        if was_connected {
            self.listeners.emit_status(false);
        }
        if let Some(e) = failed {
            // same path as a socket that errors before it opens
            self.handle_event(generation, TransportEvent::Error(e.to_string()));
            self.handle_event(
                generation,
                TransportEvent::Closed {
                    code: None,
                    reason: e.to_string(),
                },
            );
        }
    }

    fn close(&self, manual: bool) {
        let socket;
        let retry_err;
        {
            let mut inner = self.lock();
            let active = inner.socket.is_some() || inner.state != ConnectionState::Disconnected;
            if !manual && !active {
                // nothing to drop; a deliberate close or a pending retry stays as it is
                debug!("unplanned close ignored; no active socket");
                return;
            }
            inner.manual_close = manual;
            inner.generation += 1;
            socket = inner.socket.take();
            inner.state = ConnectionState::Disconnected;
            if manual {
                if inner.policy.cancel() {
                    debug!("pending reconnect cancelled");
                }
                inner.retry_token += 1;
                retry_err = None;
            } else {
                retry_err = self.schedule_retry(&mut inner);
            }
            info!(manual, "telemetry connection closed");
        }

        if let Some(mut socket) = socket {
            socket.close();
        }
        self.listeners.emit_status(false);
        if let Some(err) = retry_err {
            self.listeners.emit_error(Some(&err));
        }
    }

    fn report_config(&self, err: FeedError) {
        {
            let mut inner = self.lock();
            if inner.last_error.as_ref() == Some(&err) {
                return;
            }
            inner.last_error = Some(err.clone());
        }
        warn!(error = %err, "telemetry feed misconfigured");
        self.listeners.emit_error(Some(&err));
    }

    pub(crate) fn handle_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                {
                    let mut inner = self.lock();
                    if inner.generation != generation || inner.state != ConnectionState::Connecting
                    {
                        return;
                    }
                    inner.state = ConnectionState::Connected;
                    inner.policy.reset();
                    inner.last_error = None;
                    info!(endpoint = ?inner.endpoint, generation, "telemetry connected");
                }
                self.listeners.emit_status(true);
                self.listeners.emit_error(None);
            }

            TransportEvent::Frame(text) => {
                if self.lock().generation != generation {
                    return;
                }
                match decode_frame(&text) {
                    Ok(record) => self.listeners.emit_record(&record),
                    Err(e) => debug!(error = %e, len = text.len(), "dropping telemetry frame"),
                }
            }

            TransportEvent::Error(msg) => {
                let err = FeedError::Transient(msg);
                {
                    let mut inner = self.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.last_error = Some(err.clone());
                }
                warn!(error = %err, generation, "telemetry socket error");
                self.listeners.emit_error(Some(&err));
            }

            TransportEvent::Closed { code, reason } => {
                let retry_err;
                {
                    let mut inner = self.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.socket = None;
                    inner.state = ConnectionState::Disconnected;
                    info!(?code, reason = %reason, generation, "telemetry socket closed");
                    retry_err = self.schedule_retry(&mut inner);
                }
                self.listeners.emit_status(false);
                if let Some(err) = retry_err {
                    self.listeners.emit_error(Some(&err));
                }
            }
        }
    }

    /// Consult the policy after an unplanned disconnect. Returns the error to
    /// surface, transient while retrying and terminal once exhausted.
    fn schedule_retry(&self, inner: &mut Inner) -> Option<FeedError> {
        if inner.manual_close {
            return None;
        }
        let endpoint = inner.endpoint.clone()?;

        inner.retry_token += 1;
        let token = inner.retry_token;
        let this = self.this.clone();
        let task: RetryTask = Box::new(move || {
            if let Some(shared) = this.upgrade() {
                shared.retry(token);
            }
        });

        let err = match inner.policy.schedule(&*self.scheduler, task) {
            RetryDecision::Scheduled { attempt, delay } => {
                let max = inner.policy.config().max_attempts;
                info!(
                    endpoint = %endpoint,
                    attempt = attempt + 1,
                    max,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling telemetry reconnect"
                );
                FeedError::Transient(format!(
                    "connection to {endpoint} lost; retry {} of {max} in {} ms",
                    attempt + 1,
                    delay.as_millis()
                ))
            }
            RetryDecision::Exhausted { attempts } => {
                warn!(endpoint = %endpoint, attempts, "telemetry reconnect attempts exhausted");
                FeedError::RetriesExhausted { attempts }
            }
        };
        inner.last_error = Some(err.clone());
        Some(err)
    }

    fn retry(&self, token: u64) {
        let endpoint = {
            let mut inner = self.lock();
            if inner.retry_token != token
                || inner.manual_close
                || inner.state != ConnectionState::Disconnected
            {
                debug!(token, "stale reconnect timer ignored");
                return;
            }
            inner.policy.fired();
            inner.endpoint.clone()
        };
        if let Some(endpoint) = endpoint {
            self.open(endpoint, false);
        }
    }
}
