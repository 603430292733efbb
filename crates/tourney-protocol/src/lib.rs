//! # tourney-protocol
//!
//! Wire protocol definitions for the Tourney realtime bracket service.
//!
//! This crate defines the JSON event envelope exchanged over the realtime
//! channel, the closed set of known events, and the bracket/snapshot model that
//! is persisted and broadcast as a whole.
//!
//! ## Event Types
//!
//! - `auth` / `authenticated` - Connection handshake
//! - `tournament_updated` / `tournament_reset` - Snapshot broadcasts
//! - `error` - Server-side errors
//!
//! ## Example
//!
//! ```rust
//! use tourney_protocol::{codec, Event};
//!
//! let frame = codec::encode(&Event::auth("user-42")).unwrap();
//! assert_eq!(frame, r#"{"type":"auth","data":{"userId":"user-42"}}"#);
//!
//! let decoded = codec::decode(&frame).unwrap();
//! assert_eq!(decoded, Event::auth("user-42"));
//! ```

pub mod codec;
pub mod event;
pub mod snapshot;

pub use codec::{decode, encode, ProtocolError, MAX_FRAME_SIZE};
pub use event::{Envelope, Event, EventKind};
pub use snapshot::{
    now_millis, round_name, Bracket, BracketSize, Fingerprint, Match, Player, Round, Slot,
    TournamentSnapshot, FINAL_ROUND,
};
