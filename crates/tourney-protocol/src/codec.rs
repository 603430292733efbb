//! Codec for encoding and decoding Tourney events.
//!
//! Events travel as JSON text frames. Decoding happens in two steps: the outer
//! envelope first, then the payload for known types.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::event::{AuthData, AuthenticatedData, Envelope, ErrorData, Event, EventKind};

/// Maximum frame size (1 MiB). A 32-contestant snapshot is a few KiB.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or envelope decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload of a known event type has the wrong shape.
    #[error("Invalid payload for '{kind}': {source}")]
    InvalidPayload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode an event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(event: &Event) -> Result<String, ProtocolError> {
    let envelope = to_envelope(event)?;
    let text = serde_json::to_string(&envelope)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an event from a JSON text frame.
///
/// Unrecognized types decode to [`Event::Unknown`] rather than failing.
///
/// # Errors
///
/// Returns an error if the frame is too large, is not an envelope, or carries
/// a malformed payload for a known type.
pub fn decode(text: &str) -> Result<Event, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    let envelope: Envelope = serde_json::from_str(text)?;
    from_envelope(envelope)
}

/// Convert an event into its wire envelope.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn to_envelope(event: &Event) -> Result<Envelope, ProtocolError> {
    let data = match event {
        Event::Auth { user_id } => serde_json::to_value(AuthData {
            user_id: user_id.clone(),
        })?,
        Event::Authenticated { user_id, admin } => serde_json::to_value(AuthenticatedData {
            user_id: user_id.clone(),
            admin: *admin,
        })?,
        Event::TournamentUpdated { snapshot } => serde_json::to_value(snapshot)?,
        Event::TournamentReset => Value::Null,
        Event::Error { message } => serde_json::to_value(ErrorData {
            message: message.clone(),
        })?,
        Event::Unknown { data, .. } => data.clone(),
    };

    Ok(Envelope {
        kind: event.type_name().to_string(),
        data,
    })
}

/// Convert a wire envelope into an event.
///
/// # Errors
///
/// Returns an error if a known type carries a malformed payload.
pub fn from_envelope(envelope: Envelope) -> Result<Event, ProtocolError> {
    let Some(kind) = EventKind::from_name(&envelope.kind) else {
        return Ok(Event::Unknown {
            kind: envelope.kind,
            data: envelope.data,
        });
    };

    let event = match kind {
        EventKind::Auth => {
            let AuthData { user_id } = payload(kind, envelope.data)?;
            Event::Auth { user_id }
        }
        EventKind::Authenticated => {
            let AuthenticatedData { user_id, admin } = payload(kind, envelope.data)?;
            Event::Authenticated { user_id, admin }
        }
        EventKind::TournamentUpdated => Event::TournamentUpdated {
            snapshot: payload(kind, envelope.data)?,
        },
        EventKind::TournamentReset => Event::TournamentReset,
        EventKind::Error => {
            let ErrorData { message } = payload(kind, envelope.data)?;
            Event::Error { message }
        }
    };

    Ok(event)
}

fn payload<T: DeserializeOwned>(kind: EventKind, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Bracket, BracketSize, Match, Round, TournamentSnapshot};

    fn snapshot() -> TournamentSnapshot {
        let bracket = Bracket {
            size: BracketSize::Four,
            rounds: vec![
                Round {
                    name: "Round 1".into(),
                    matches: vec![Match::new("r1m0"), Match::new("r1m1")],
                },
                Round {
                    name: "Final".into(),
                    matches: vec![Match::new("r2m0")],
                },
            ],
            champion: None,
        };
        TournamentSnapshot::new(bracket, 7)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let events = vec![
            Event::auth("user-1"),
            Event::authenticated("user-1", true),
            Event::tournament_updated(snapshot()),
            Event::TournamentReset,
            Event::error("Unauthorized"),
        ];

        for event in events {
            let encoded = encode(&event).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(event, decoded);
        }
    }

    #[test]
    fn test_auth_wire_format() {
        let encoded = encode(&Event::auth("abc")).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value, serde_json::json!({"type": "auth", "data": {"userId": "abc"}}));
    }

    #[test]
    fn test_decode_unknown_type() {
        let event = decode(r#"{"type":"chat","data":{"text":"hi"}}"#).unwrap();
        match event {
            Event::Unknown { kind, data } => {
                assert_eq!(kind, "chat");
                assert_eq!(data["text"], "hi");
            }
            other => panic!("Expected Unknown event, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_data_defaults_to_null() {
        assert_eq!(
            decode(r#"{"type":"tournament_reset"}"#).unwrap(),
            Event::TournamentReset
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode(r#"{"data":{}}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode(r#"{"type":"auth","data":{"user":"x"}}"#),
            Err(ProtocolError::InvalidPayload {
                kind: EventKind::Auth,
                ..
            })
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let event = Event::error("x".repeat(MAX_FRAME_SIZE + 1));
        match encode(&event) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }
}
