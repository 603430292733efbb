//! # tourney-core
//!
//! Bracket engine, event dispatch and snapshot synchronization for Tourney.
//!
//! - **Bracket** - Pure single-elimination engine: build, record, decide, advance
//! - **Dispatcher** - Typed in-process publish/subscribe for inbound events
//! - **Store** - Snapshot persistence seam plus an in-memory implementation
//! - **Sync** - Admin debounce, viewer polling and remote snapshot reconciliation
//! - **Authz** - Admin allow-list
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Session    │────▶│ Dispatcher  │────▶│    Sync     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                           │       │
//!                                           ▼       ▼
//!                                    ┌─────────┐ ┌─────────┐
//!                                    │ Bracket │ │  Store  │
//!                                    └─────────┘ └─────────┘
//! ```

pub mod authz;
pub mod bracket;
pub mod dispatcher;
pub mod store;
pub mod sync;

pub use authz::{AdminPolicy, Role};
pub use bracket::{BracketError, Decision, SlotField};
pub use dispatcher::{DispatcherStats, EventDispatcher, Handler, Subscription};
pub use store::{MemoryStore, SnapshotStore, StoreChange, StoreError};
pub use sync::{Bootstrap, SyncConfig, SyncCoordinator, SyncError};
