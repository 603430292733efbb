//! Authenticated realtime session.
//!
//! A [`ConnectionSession`] owns one background task that connects, sends the
//! auth frame, pumps events between the connection and the dispatcher, and
//! reconnects with exponential backoff when the connection drops.
//!
//! Delivery is best-effort and at-most-once: events sent while the session is
//! not open are dropped with a warning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tourney_core::EventDispatcher;
use tourney_protocol::Event;
use tracing::{debug, error, info, warn};

use crate::traits::{Connection, Connector, TransportError};

/// Connectivity as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `connect` has not been called.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Authenticated frame sent; events flow.
    Open,
    /// Waiting out the backoff delay.
    Reconnecting,
    /// Torn down. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay unit.
    pub base: Duration,
    /// Upper bound on any delay.
    pub cap: Duration,
}

impl Backoff {
    /// Create a backoff policy.
    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay after `failures` consecutive failed cycles: `min(base * 2^failures, cap)`.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Realtime endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// Backoff base in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl SessionConfig {
    /// Backoff policy from the configured delays.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    url: String,
    backoff: Backoff,
    state: watch::Sender<SessionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    failures: AtomicU32,
    last_error: Mutex<Option<String>>,
    admin: Mutex<Option<bool>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

/// One pump step.
enum Step {
    Send(Event),
    Recv(Result<Option<Event>, TransportError>),
}

impl Shared {
    /// Move to `next` unless the session is already closed.
    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn record_error(&self, error: &TransportError) {
        *lock(&self.last_error) = Some(error.to_string());
    }

    /// Authenticate, then move events until the connection fails or the
    /// session is cancelled. `Ok` means cancelled.
    async fn serve(&self, conn: &mut dyn Connection, user_id: &str) -> Result<(), TransportError> {
        conn.send(&Event::auth(user_id)).await?;

        self.failures.store(0, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(tx);
        self.set_state(SessionState::Open);
        info!(user = %user_id, url = %self.url, "Session open");

        let mut authenticated = false;
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                Some(event) = rx.recv() => Step::Send(event),
                inbound = conn.recv() => Step::Recv(inbound),
            };

            match step {
                Step::Send(event) => match conn.send(&event).await {
                    Ok(()) => debug!(event_type = %event.type_name(), "Sent event"),
                    Err(e) if e.is_recoverable() => {
                        warn!(event_type = %event.type_name(), error = %e, "Dropping unsendable event");
                    }
                    Err(e) => return Err(e),
                },
                Step::Recv(Ok(Some(event))) => {
                    let rejected = match &event {
                        Event::Authenticated { user_id, admin } => {
                            authenticated = true;
                            *lock(&self.admin) = Some(*admin);
                            info!(user = %user_id, admin, "Authenticated");
                            None
                        }
                        Event::Error { message } if !authenticated => Some(message.clone()),
                        _ => None,
                    };

                    self.dispatcher.publish(&event);

                    if let Some(message) = rejected {
                        return Err(TransportError::AuthRejected(message));
                    }
                }
                Step::Recv(Ok(None)) => return Err(TransportError::ConnectionClosed),
                Step::Recv(Err(e)) if e.is_recoverable() => {
                    warn!(error = %e, "Dropping malformed event");
                }
                Step::Recv(Err(e)) => return Err(e),
            }
        }
    }

    async fn run(self: Arc<Self>, user_id: String) {
        loop {
            self.set_state(SessionState::Connecting);
            debug!(url = %self.url, transport = self.connector.name(), "Connecting");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect(&self.url) => result,
            };

            let failure = match connected {
                Ok(mut conn) => {
                    let result = self.serve(conn.as_mut(), &user_id).await;
                    *lock(&self.outbound) = None;
                    if let Err(e) = conn.close().await {
                        debug!(error = %e, "Close failed");
                    }

                    match result {
                        Ok(()) => break,
                        Err(TransportError::AuthRejected(message)) => {
                            error!(user = %user_id, %message, "Authentication rejected; not reconnecting");
                            *lock(&self.last_error) = Some(message);
                            self.closed.store(true, Ordering::SeqCst);
                            self.cancel.cancel();
                            break;
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            let failures = self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            let delay = self.backoff.delay(failures);
            self.record_error(&failure);
            self.set_state(SessionState::Reconnecting);
            warn!(
                error = %failure,
                failures,
                delay_ms = delay.as_millis() as u64,
                "Connection lost; reconnecting"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        *lock(&self.outbound) = None;
        self.state.send_replace(SessionState::Closed);
        debug!("Session task finished");
    }
}

/// A realtime session for one user.
///
/// Inbound events are published on the dispatcher. Dropping the session tears
/// it down.
pub struct ConnectionSession {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSession {
    /// Create an idle session.
    pub fn new(
        connector: Arc<dyn Connector>,
        dispatcher: Arc<EventDispatcher>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            shared: Arc::new(Shared {
                connector,
                dispatcher,
                backoff: config.backoff(),
                url: config.url,
                state,
                outbound: Mutex::new(None),
                failures: AtomicU32::new(0),
                last_error: Mutex::new(None),
                admin: Mutex::new(None),
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start connecting as `user_id`.
    ///
    /// Returns `false` if the session was already started or torn down.
    pub fn connect(&self, user_id: impl Into<String>) -> bool {
        if self.is_closed() {
            warn!("Session is closed; not connecting");
            return false;
        }

        let mut task = lock(&self.task);
        if task.is_some() {
            warn!("Session already started");
            return false;
        }

        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(shared.run(user_id.into())));
        true
    }

    /// Send an event to the server.
    ///
    /// Returns `false` and drops the event if the session is not open.
    pub fn send(&self, event: Event) -> bool {
        let state = self.state();
        if state != SessionState::Open {
            warn!(event_type = %event.type_name(), %state, "Session not open; dropping event");
            return false;
        }

        match lock(&self.shared.outbound).as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                warn!(event_type = %event.type_name(), "Session not open; dropping event");
                false
            }
        }
    }

    /// Tear the session down: cancel any pending reconnect and close the
    /// connection. Safe to call repeatedly; returns `true` on the first call.
    pub fn close(&self) -> bool {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.shared.cancel.cancel();
        *lock(&self.shared.outbound) = None;
        self.shared.state.send_replace(SessionState::Closed);
        info!("Session closed");
        true
    }

    /// Wait for the background task to finish.
    pub async fn join(&self) {
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!(error = %e, "Session task ended abnormally");
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive failed connection cycles.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.shared.failures.load(Ordering::SeqCst)
    }

    /// Last connection error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    /// Admin flag from the server's `authenticated` reply.
    #[must_use]
    pub fn is_admin(&self) -> Option<bool> {
        *lock(&self.shared.admin)
    }

    /// Whether the session has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}
