//! Snapshot synchronization between the admin, the store and viewers.
//!
//! An admin coordinator applies edits locally right away and persists the
//! whole snapshot once edits go quiet for the debounce window. A viewer
//! coordinator never edits; it polls the store (or receives pushed snapshots)
//! and swaps its local copy wholesale whenever the content fingerprint
//! changes.
//!
//! Concurrent admins are not reconciled: the last debounce window to finish
//! overwrites the store.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tourney_protocol::{
    now_millis, Bracket, BracketSize, Fingerprint, ProtocolError, Slot, TournamentSnapshot,
};
use tracing::{debug, info, trace, warn};

use crate::authz::Role;
use crate::bracket::{self, BracketError, Decision, SlotField};
use crate::store::{SnapshotStore, StoreError};

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A viewer attempted a mutation.
    #[error("Only admins may edit the bracket")]
    Unauthorized,

    /// The edit was rejected by the bracket engine.
    #[error(transparent)]
    Bracket(#[from] BracketError),

    /// Reading or writing the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The snapshot could not be fingerprinted.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No bracket has been loaded or created yet.
    #[error("No bracket loaded yet")]
    NotReady,
}

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet window before an admin edit is persisted, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Viewer poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Size used when an admin finds no persisted tournament.
    #[serde(default)]
    pub default_size: BracketSize,
}

fn default_debounce_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            default_size: BracketSize::default(),
        }
    }
}

impl SyncConfig {
    /// Debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// How [`SyncCoordinator::bootstrap`] obtained the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// A persisted snapshot was loaded.
    Remote,
    /// Nothing was persisted; an admin created and persisted a default bracket.
    Created,
    /// Nothing was persisted; a viewer waits in the loading state.
    Empty,
}

#[derive(Default)]
struct LocalState {
    snapshot: Option<TournamentSnapshot>,
    /// Fingerprint of the last snapshot taken from the store.
    fingerprint: Option<Fingerprint>,
}

struct Shared {
    role: Role,
    store: Arc<dyn SnapshotStore>,
    config: SyncConfig,
    state: Mutex<LocalState>,
    view: watch::Sender<Option<TournamentSnapshot>>,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Swap in `snapshot` unless its fingerprint matches the current one.
    fn replace(&self, snapshot: TournamentSnapshot) -> Result<bool, ProtocolError> {
        let fingerprint = snapshot.fingerprint()?;

        let mut state = lock(&self.state);
        if state.fingerprint.as_ref() == Some(&fingerprint) {
            trace!(fingerprint = %fingerprint, "Snapshot unchanged");
            return Ok(false);
        }
        state.snapshot = Some(snapshot.clone());
        state.fingerprint = Some(fingerprint.clone());
        drop(state);

        debug!(fingerprint = %fingerprint, "Replaced local snapshot");
        self.view.send_replace(Some(snapshot));
        Ok(true)
    }

    /// Drop the local snapshot and go back to the loading state.
    fn clear(&self) -> bool {
        let mut state = lock(&self.state);
        if state.snapshot.is_none() {
            return false;
        }
        *state = LocalState::default();
        drop(state);

        debug!("Local snapshot cleared");
        self.view.send_replace(None);
        true
    }

    async fn poll_once(&self) -> Result<bool, SyncError> {
        match self.store.load().await? {
            Some(snapshot) => Ok(self.replace(snapshot)?),
            None => Ok(self.clear()),
        }
    }

    /// Stamp the current snapshot and hand it back for persisting.
    fn stamp(&self) -> Option<TournamentSnapshot> {
        let mut state = lock(&self.state);
        let snapshot = state.snapshot.as_mut()?;
        snapshot.last_updated = now_millis();
        Some(snapshot.clone())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(snapshot) = self.stamp() else {
            return Ok(());
        };
        self.store.save(&snapshot).await?;
        debug!(last_updated = snapshot.last_updated, "Snapshot persisted");
        Ok(())
    }
}

/// Arbitrates local edits, the persisted snapshot and viewers.
///
/// Must be used from within a Tokio runtime: edits spawn the debounce timer.
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    /// Cancels the quiet period of the current debounce window. A window
    /// that has started writing is left to finish.
    debounce: Mutex<Option<CancellationToken>>,
    /// Clear-then-persist of the last reset.
    resetting: Mutex<Option<JoinHandle<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Create a coordinator for a user with `role`.
    pub fn new(role: Role, store: Arc<dyn SnapshotStore>, config: SyncConfig) -> Self {
        let (view, _) = watch::channel(None);
        debug!(role = %role, ?config, "Creating sync coordinator");

        Self {
            shared: Arc::new(Shared {
                role,
                store,
                config,
                state: Mutex::new(LocalState::default()),
                view,
                cancel: CancellationToken::new(),
            }),
            debounce: Mutex::new(None),
            resetting: Mutex::new(None),
            poller: Mutex::new(None),
        }
    }

    /// The role this coordinator acts for.
    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// The current local snapshot, `None` while loading.
    #[must_use]
    pub fn snapshot(&self) -> Option<TournamentSnapshot> {
        lock(&self.shared.state).snapshot.clone()
    }

    /// Whether there is nothing to show yet.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        lock(&self.shared.state).snapshot.is_none()
    }

    /// Watch the rendered view. The value only changes on a real change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<TournamentSnapshot>> {
        self.shared.view.subscribe()
    }

    /// Load the persisted snapshot, creating one if an admin finds none.
    ///
    /// A failed write of the freshly created bracket is logged and the local
    /// bracket is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn bootstrap(&self) -> Result<Bootstrap, SyncError> {
        if let Some(snapshot) = self.shared.store.load().await? {
            self.shared.replace(snapshot)?;
            info!(role = %self.role(), "Loaded persisted tournament");
            return Ok(Bootstrap::Remote);
        }

        if !self.role().can_edit() {
            info!("No tournament yet, waiting for an admin");
            return Ok(Bootstrap::Empty);
        }

        let size = self.shared.config.default_size;
        self.install(bracket::build(size));
        info!(size = %size, "Created default tournament");

        if let Err(e) = self.shared.persist().await {
            warn!(error = %e, "Failed to persist new tournament; keeping local bracket");
        }
        Ok(Bootstrap::Created)
    }

    /// Start a new bracket of `size` contestants. Persisted after the
    /// debounce window.
    ///
    /// # Errors
    ///
    /// Returns an error for viewers or unsupported sizes.
    pub fn select_size(&self, size: u32) -> Result<(), SyncError> {
        self.authorize()?;
        let bracket = bracket::initialize(size)?;
        self.install(bracket);
        self.schedule_persist();
        Ok(())
    }

    /// Write a contestant name or score.
    ///
    /// Returns `false` when the target does not exist or is already decided.
    ///
    /// # Errors
    ///
    /// Returns an error for viewers or before any bracket exists.
    pub fn record_slot(
        &self,
        round: &str,
        index: usize,
        slot: Slot,
        field: SlotField,
    ) -> Result<bool, SyncError> {
        self.edit(|b| {
            let changed = bracket::record_slot(b, round, index, slot, field);
            Ok((changed, changed))
        })
    }

    /// Decide a match and advance its winner.
    ///
    /// # Errors
    ///
    /// Returns an error for viewers, before any bracket exists, or when the
    /// bracket engine rejects the decision.
    pub fn decide_winner(&self, round: &str, index: usize) -> Result<Decision, SyncError> {
        self.edit(|b| bracket::decide_winner(b, round, index).map(|d| (d, true)))
    }

    /// Throw the tournament away and start over with `size` contestants.
    ///
    /// Unlike other edits this is not debounced: any pending debounce window
    /// is cancelled, the store is cleared and the fresh bracket persisted right
    /// away. Later edits do not cancel the clear.
    ///
    /// # Errors
    ///
    /// Returns an error for viewers or unsupported sizes.
    pub fn reset(&self, size: u32) -> Result<(), SyncError> {
        self.authorize()?;
        let bracket = bracket::initialize(size)?;
        self.install(bracket);
        info!(size, "Tournament reset");
        self.cancel_pending();

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            if shared.cancel.is_cancelled() {
                return;
            }
            if let Err(e) = shared.store.clear().await {
                warn!(error = %e, "Failed to clear persisted tournament");
            }
            if let Err(e) = shared.persist().await {
                warn!(error = %e, "Failed to persist reset tournament; keeping local bracket");
            }
        });
        // An earlier reset still in flight runs to completion.
        drop(lock(&self.resetting).replace(handle));
        Ok(())
    }

    /// Persist immediately, cancelling any pending debounce. Waits for an
    /// unfinished reset first so its clear cannot land after this write.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.authorize()?;
        self.cancel_pending();

        let resetting = lock(&self.resetting).take();
        if let Some(handle) = resetting {
            if let Err(e) = handle.await {
                warn!(error = %e, "Reset task failed");
            }
        }
        self.shared.persist().await?;
        Ok(())
    }

    /// Offer a snapshot received from the realtime channel.
    ///
    /// Viewers replace their local state when the fingerprint differs.
    /// Admins keep their local state. Returns whether the view changed.
    pub fn apply_remote(&self, snapshot: TournamentSnapshot) -> bool {
        if self.role().can_edit() {
            trace!("Admin ignores remote snapshot");
            return false;
        }
        match self.shared.replace(snapshot) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = %e, "Dropping remote snapshot");
                false
            }
        }
    }

    /// The persisted tournament was cleared; viewers return to loading.
    pub fn apply_remote_reset(&self) -> bool {
        if self.role().can_edit() {
            return false;
        }
        self.shared.clear()
    }

    /// Fetch the persisted snapshot once and apply it.
    ///
    /// Returns whether the view changed. Admins never poll.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn poll_once(&self) -> Result<bool, SyncError> {
        if self.role().can_edit() {
            return Ok(false);
        }
        self.shared.poll_once().await
    }

    /// Start polling the store on the configured interval (viewers only).
    pub fn start_polling(&self) {
        if self.role().can_edit() {
            debug!("Admins do not poll");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let period = shared.config.poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match shared.poll_once().await {
                    Ok(true) => info!("Tournament updated"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Poll failed"),
                }
            }
            debug!("Polling stopped");
        });

        if let Some(previous) = lock(&self.poller).replace(handle) {
            previous.abort();
        }
    }

    /// Cancel every timer. Pending edits that have not been persisted yet are
    /// dropped; call [`SyncCoordinator::flush`] first to keep them.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.cancel_pending();
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
        debug!(role = %self.role(), "Sync coordinator shut down");
    }

    fn authorize(&self) -> Result<(), SyncError> {
        if self.role().can_edit() {
            Ok(())
        } else {
            warn!("Rejected edit from viewer");
            Err(SyncError::Unauthorized)
        }
    }

    /// Replace the whole local bracket.
    fn install(&self, bracket: Bracket) {
        let snapshot = TournamentSnapshot::new(bracket, now_millis());
        let mut state = lock(&self.shared.state);
        state.snapshot = Some(snapshot.clone());
        state.fingerprint = None;
        drop(state);
        self.shared.view.send_replace(Some(snapshot));
    }

    /// Apply an edit to the local bracket. `f` returns its result and whether
    /// anything changed.
    fn edit<T>(
        &self,
        f: impl FnOnce(&mut Bracket) -> Result<(T, bool), BracketError>,
    ) -> Result<T, SyncError> {
        self.authorize()?;

        let mut state = lock(&self.shared.state);
        let snapshot = state.snapshot.as_mut().ok_or(SyncError::NotReady)?;
        let (out, changed) = f(&mut snapshot.bracket)?;
        if !changed {
            return Ok(out);
        }

        snapshot.size = snapshot.bracket.size;
        snapshot.champion = snapshot.bracket.champion.clone();
        let view = snapshot.clone();
        drop(state);

        self.shared.view.send_replace(Some(view));
        self.schedule_persist();
        Ok(out)
    }

    /// (Re)start the debounce timer.
    fn schedule_persist(&self) {
        let window = self.shared.cancel.child_token();
        if let Some(previous) = lock(&self.debounce).replace(window.clone()) {
            previous.cancel();
        }

        let shared = Arc::clone(&self.shared);
        let quiet = shared.config.debounce();
        tokio::spawn(async move {
            tokio::select! {
                _ = window.cancelled() => return,
                _ = tokio::time::sleep(quiet) => {}
            }
            if let Err(e) = shared.persist().await {
                warn!(error = %e, "Failed to persist tournament; keeping local state");
            }
        });
    }

    /// Cancel the quiet period of the current debounce window, if any.
    fn cancel_pending(&self) {
        if let Some(window) = lock(&self.debounce).take() {
            window.cancel();
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}
