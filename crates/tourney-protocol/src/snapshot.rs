//! Bracket and snapshot data model.
//!
//! These are plain data types shared by every layer: the bracket engine mutates
//! them, the HTTP surface persists them and the realtime channel carries them
//! inside `tournament_updated` events.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::codec::ProtocolError;

/// Name of the last round of every bracket.
pub const FINAL_ROUND: &str = "Final";

/// Supported bracket sizes (number of contestants).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
#[repr(u32)]
pub enum BracketSize {
    Four = 4,
    #[default]
    Eight = 8,
    Sixteen = 16,
    ThirtyTwo = 32,
}

impl BracketSize {
    /// All supported sizes, smallest first.
    pub const ALL: [BracketSize; 4] = [
        BracketSize::Four,
        BracketSize::Eight,
        BracketSize::Sixteen,
        BracketSize::ThirtyTwo,
    ];

    /// Number of contestants.
    #[must_use]
    pub fn contestants(self) -> usize {
        self as usize
    }

    /// Number of rounds, `log2(size)`.
    #[must_use]
    pub fn round_count(self) -> usize {
        (self as u32).trailing_zeros() as usize
    }
}

impl From<BracketSize> for u32 {
    fn from(size: BracketSize) -> u32 {
        size as u32
    }
}

impl TryFrom<u32> for BracketSize {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(BracketSize::Four),
            8 => Ok(BracketSize::Eight),
            16 => Ok(BracketSize::Sixteen),
            32 => Ok(BracketSize::ThirtyTwo),
            _ => Err("Bracket size must be one of 4, 8, 16, 32"),
        }
    }
}

impl fmt::Display for BracketSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

/// One of the two contestant slots of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Player1,
    Player2,
}

impl Slot {
    /// The slot a winner of `match_index` occupies in the following round.
    #[must_use]
    pub fn for_feeder(match_index: usize) -> Self {
        if match_index % 2 == 0 {
            Slot::Player1
        } else {
            Slot::Player2
        }
    }
}

impl std::str::FromStr for Slot {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player1" | "p1" | "1" => Ok(Slot::Player1),
            "player2" | "p2" | "2" => Ok(Slot::Player2),
            _ => Err("Slot must be player1 or player2"),
        }
    }
}

/// A contestant slot: name plus optional score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub score: Option<f64>,
}

impl Player {
    /// Whether the slot has a name. Whitespace-only names count as empty.
    #[must_use]
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// A pairing of two contestants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub player1: Player,
    pub player2: Player,
    pub winner: Option<String>,
    pub completed: bool,
}

impl Match {
    /// Create an empty, undecided match.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            player1: Player::default(),
            player2: Player::default(),
            winner: None,
            completed: false,
        }
    }

    /// Mutably borrow a slot.
    pub fn slot_mut(&mut self, slot: Slot) -> &mut Player {
        match slot {
            Slot::Player1 => &mut self.player1,
            Slot::Player2 => &mut self.player2,
        }
    }
}

/// A named, ordered group of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub name: String,
    pub matches: Vec<Match>,
}

/// Name of the round at `index` (0-based) in a bracket with `round_count` rounds.
#[must_use]
pub fn round_name(index: usize, round_count: usize) -> String {
    if index + 1 == round_count {
        FINAL_ROUND.to_string()
    } else {
        format!("Round {}", index + 1)
    }
}

/// A full single-elimination bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub size: BracketSize,
    pub rounds: Vec<Round>,
    pub champion: Option<String>,
}

impl Bracket {
    /// Position of a round by name.
    #[must_use]
    pub fn round_index(&self, name: &str) -> Option<usize> {
        self.rounds.iter().position(|r| r.name == name)
    }

    /// Look up a round by name.
    #[must_use]
    pub fn round(&self, name: &str) -> Option<&Round> {
        self.rounds.iter().find(|r| r.name == name)
    }

    /// Look up a round by name, mutably.
    pub fn round_mut(&mut self, name: &str) -> Option<&mut Round> {
        self.rounds.iter_mut().find(|r| r.name == name)
    }

    /// Look up a single match.
    #[must_use]
    pub fn match_at(&self, round: &str, index: usize) -> Option<&Match> {
        self.round(round).and_then(|r| r.matches.get(index))
    }

    /// The Final match, if the bracket has one.
    #[must_use]
    pub fn final_match(&self) -> Option<&Match> {
        self.match_at(FINAL_ROUND, 0)
    }
}

/// The unit persisted and retrieved as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSnapshot {
    pub size: BracketSize,
    pub bracket: Bracket,
    pub champion: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub last_updated: u64,
}

impl TournamentSnapshot {
    /// Wrap a bracket, copying its size and champion to the top level.
    #[must_use]
    pub fn new(bracket: Bracket, last_updated: u64) -> Self {
        Self {
            size: bracket.size,
            champion: bracket.champion.clone(),
            bracket,
            last_updated,
        }
    }

    /// Compute the value-based content fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn fingerprint(&self) -> Result<Fingerprint, ProtocolError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(Fingerprint::of(&bytes))
    }
}

/// SHA-256 digest of a snapshot's JSON serialization.
///
/// Two snapshots with equal content have equal fingerprints regardless of
/// where or when they were deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for log lines.
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bracket() -> Bracket {
        let mut first = Match::new("r1m0");
        first.player1 = Player {
            name: "Alice".into(),
            score: Some(2.5),
        };
        first.player2 = Player {
            name: "Bob".into(),
            score: Some(1.0),
        };
        first.winner = Some("Alice".into());
        first.completed = true;

        let mut last = Match::new("r2m0");
        last.player1.name = "Alice".into();

        Bracket {
            size: BracketSize::Four,
            rounds: vec![
                Round {
                    name: "Round 1".into(),
                    matches: vec![first, Match::new("r1m1")],
                },
                Round {
                    name: FINAL_ROUND.into(),
                    matches: vec![last],
                },
            ],
            champion: None,
        }
    }

    #[test]
    fn test_bracket_size_conversion() {
        assert_eq!(BracketSize::try_from(16), Ok(BracketSize::Sixteen));
        assert!(BracketSize::try_from(6).is_err());
        assert!(BracketSize::try_from(64).is_err());
        assert_eq!(u32::from(BracketSize::ThirtyTwo), 32);
    }

    #[test]
    fn test_round_count() {
        assert_eq!(BracketSize::Four.round_count(), 2);
        assert_eq!(BracketSize::Eight.round_count(), 3);
        assert_eq!(BracketSize::Sixteen.round_count(), 4);
        assert_eq!(BracketSize::ThirtyTwo.round_count(), 5);
    }

    #[test]
    fn test_round_names() {
        assert_eq!(round_name(0, 3), "Round 1");
        assert_eq!(round_name(1, 3), "Round 2");
        assert_eq!(round_name(2, 3), "Final");
    }

    #[test]
    fn test_slot_for_feeder() {
        assert_eq!(Slot::for_feeder(0), Slot::Player1);
        assert_eq!(Slot::for_feeder(1), Slot::Player2);
        assert_eq!(Slot::for_feeder(6), Slot::Player1);
    }

    #[test]
    fn test_bracket_json_roundtrip() {
        let bracket = sample_bracket();
        let json = serde_json::to_string(&bracket).unwrap();
        let decoded: Bracket = serde_json::from_str(&json).unwrap();
        assert_eq!(bracket, decoded);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snapshot = TournamentSnapshot::new(sample_bracket(), 1_700_000_000_000);
        let value = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(value["size"], 4);
        assert_eq!(value["lastUpdated"], 1_700_000_000_000u64);
        assert!(value["champion"].is_null());
        let first = &value["bracket"]["rounds"][0]["matches"][0];
        assert_eq!(first["player1"]["name"], "Alice");
        assert_eq!(first["player1"]["score"], 2.5);
        assert_eq!(first["winner"], "Alice");
    }

    #[test]
    fn test_fingerprint_is_value_based() {
        let a = TournamentSnapshot::new(sample_bracket(), 42);
        let json = serde_json::to_string(&a).unwrap();
        let b: TournamentSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        let digest = a.fingerprint().unwrap();
        assert_eq!(digest.as_str().len(), 64);
        assert!(digest.as_str().bytes().all(|c| c.is_ascii_hexdigit()));

        let mut c = b.clone();
        c.bracket.rounds[0].matches[1].player1.name = "Carol".into();
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn test_lookup_helpers() {
        let bracket = sample_bracket();
        assert_eq!(bracket.round_index("Final"), Some(1));
        assert!(bracket.round("Round 9").is_none());
        assert_eq!(bracket.final_match().unwrap().player1.name, "Alice");
        assert!(bracket.match_at("Round 1", 5).is_none());
    }
}
