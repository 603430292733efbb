//! Event types for the Tourney realtime channel.
//!
//! Every message on the wire is a JSON envelope `{ "type": ..., "data": ... }`.
//! Known types decode into a closed [`Event`] union; anything else is kept as
//! [`Event::Unknown`] so newer servers can add events without breaking older
//! clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::TournamentSnapshot;

/// The raw wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type name used for dispatch.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload; `null` when the event carries none.
    #[serde(default)]
    pub data: Value,
}

/// Known event kinds.
///
/// Dispatch is keyed by kind; unknown wire types have no kind and are never
/// routed to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Auth,
    Authenticated,
    TournamentUpdated,
    TournamentReset,
    Error,
}

impl EventKind {
    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Auth => "auth",
            EventKind::Authenticated => "authenticated",
            EventKind::TournamentUpdated => "tournament_updated",
            EventKind::TournamentReset => "tournament_reset",
            EventKind::Error => "error",
        }
    }

    /// Resolve a wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auth" => Some(EventKind::Auth),
            "authenticated" => Some(EventKind::Authenticated),
            "tournament_updated" => Some(EventKind::TournamentUpdated),
            "tournament_reset" => Some(EventKind::TournamentReset),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `auth` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthData {
    pub user_id: String,
}

/// Payload of an `authenticated` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthenticatedData {
    pub user_id: String,
    pub admin: bool,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ErrorData {
    pub message: String,
}

/// A decoded realtime event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// First client frame after the socket opens.
    Auth {
        /// Opaque identity of the connecting user.
        user_id: String,
    },

    /// Server acknowledgment of `Auth`.
    Authenticated {
        /// Echoed user id.
        user_id: String,
        /// Whether the user is on the admin allow-list.
        admin: bool,
    },

    /// A new tournament snapshot was persisted.
    TournamentUpdated {
        /// The full snapshot.
        snapshot: TournamentSnapshot,
    },

    /// The persisted tournament was cleared.
    TournamentReset,

    /// Server-side error notification.
    Error {
        /// Human-readable error message.
        message: String,
    },

    /// An event type this build does not know.
    Unknown {
        /// The wire type name.
        kind: String,
        /// The untouched payload.
        data: Value,
    },
}

impl Event {
    /// Get the event kind, `None` for unknown events.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Event::Auth { .. } => Some(EventKind::Auth),
            Event::Authenticated { .. } => Some(EventKind::Authenticated),
            Event::TournamentUpdated { .. } => Some(EventKind::TournamentUpdated),
            Event::TournamentReset => Some(EventKind::TournamentReset),
            Event::Error { .. } => Some(EventKind::Error),
            Event::Unknown { .. } => None,
        }
    }

    /// Wire type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Event::Unknown { kind, .. } => kind,
            other => other.kind().map(EventKind::as_str).unwrap_or_default(),
        }
    }

    /// Create a new Auth event.
    #[must_use]
    pub fn auth(user_id: impl Into<String>) -> Self {
        Event::Auth {
            user_id: user_id.into(),
        }
    }

    /// Create a new Authenticated event.
    #[must_use]
    pub fn authenticated(user_id: impl Into<String>, admin: bool) -> Self {
        Event::Authenticated {
            user_id: user_id.into(),
            admin,
        }
    }

    /// Create a new TournamentUpdated event.
    #[must_use]
    pub fn tournament_updated(snapshot: TournamentSnapshot) -> Self {
        Event::TournamentUpdated { snapshot }
    }

    /// Create a new Error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        assert_eq!(Event::auth("u1").kind(), Some(EventKind::Auth));
        assert_eq!(Event::TournamentReset.kind(), Some(EventKind::TournamentReset));

        let unknown = Event::Unknown {
            kind: "chat".into(),
            data: Value::Null,
        };
        assert_eq!(unknown.kind(), None);
        assert_eq!(unknown.type_name(), "chat");
    }

    #[test]
    fn test_kind_names() {
        for kind in [
            EventKind::Auth,
            EventKind::Authenticated,
            EventKind::TournamentUpdated,
            EventKind::TournamentReset,
            EventKind::Error,
        ] {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("presence"), None);
    }
}
