//! Snapshot persistence.
//!
//! The coordinator talks to persistence only through [`SnapshotStore`]. The
//! server keeps snapshots in a [`MemoryStore`]; clients reach it over HTTP.

use async_trait::async_trait;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tourney_protocol::TournamentSnapshot;
use tracing::debug;

/// Default change-notification capacity.
const DEFAULT_CHANGE_CAPACITY: usize = 64;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backing service answered with an unexpected status.
    #[error("Store rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The stored value could not be decoded.
    #[error("Invalid stored snapshot: {0}")]
    Decode(String),
}

/// Read/write access to the persisted tournament snapshot.
///
/// Writes replace the whole snapshot; there is no partial update.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the current snapshot, `None` if nothing has been persisted.
    async fn load(&self) -> Result<Option<TournamentSnapshot>, StoreError>;

    /// Replace the persisted snapshot.
    async fn save(&self, snapshot: &TournamentSnapshot) -> Result<(), StoreError>;

    /// Remove the persisted snapshot.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Change notification from a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// A snapshot was saved.
    Saved(TournamentSnapshot),
    /// The snapshot was cleared.
    Cleared,
}

/// In-memory snapshot store with change notifications.
#[derive(Debug)]
pub struct MemoryStore {
    current: RwLock<Option<TournamentSnapshot>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Create an empty store with a specific notification capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            current: RwLock::new(None),
            changes,
        }
    }

    /// Create a store holding an initial snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: TournamentSnapshot) -> Self {
        let store = Self::new();
        *store.write() = Some(snapshot);
        store
    }

    /// Subscribe to changes. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Current snapshot without going through the async trait.
    #[must_use]
    pub fn get(&self) -> Option<TournamentSnapshot> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Replace the snapshot and notify subscribers.
    ///
    /// Returns the number of subscribers notified.
    pub fn set(&self, snapshot: TournamentSnapshot) -> usize {
        *self.write() = Some(snapshot.clone());
        debug!(last_updated = snapshot.last_updated, "Snapshot stored");
        self.changes.send(StoreChange::Saved(snapshot)).unwrap_or_default()
    }

    /// Remove the snapshot and notify subscribers.
    pub fn remove(&self) -> usize {
        *self.write() = None;
        debug!("Snapshot cleared");
        self.changes.send(StoreChange::Cleared).unwrap_or_default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<TournamentSnapshot>> {
        self.current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Option<TournamentSnapshot>, StoreError> {
        Ok(self.get())
    }

    async fn save(&self, snapshot: &TournamentSnapshot) -> Result<(), StoreError> {
        self.set(snapshot.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.remove();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket;

    fn snapshot(at: u64) -> TournamentSnapshot {
        TournamentSnapshot::new(bracket::initialize(4).unwrap(), at)
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save(&snapshot(1)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot(1)));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_notifies_subscribers() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        assert_eq!(store.set(snapshot(5)), 1);
        store.remove();

        assert_eq!(rx.recv().await.unwrap(), StoreChange::Saved(snapshot(5)));
        assert_eq!(rx.recv().await.unwrap(), StoreChange::Cleared);

        drop(rx);
        assert_eq!(store.set(snapshot(6)), 0);
    }
}
