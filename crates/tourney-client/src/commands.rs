//! Admin console commands.
//!
//! Matches are addressed by id (`r1m0` is the first match of round 1).
//!
//! ```text
//! size 16                 start a 16 player bracket
//! name r1m0 p1 Alice      set a contestant name
//! score r1m0 p2 2.5       set a score (`-` clears it)
//! win r1m0                decide the match and advance the winner
//! reset [size]            start over
//! show | help | quit
//! ```

use anyhow::{anyhow, Result};
use std::str::FromStr;
use thiserror::Error;
use tourney_core::{SlotField, SyncCoordinator};
use tourney_protocol::Slot;

/// Command help text.
pub const HELP: &str = "\
commands:
  size <4|8|16|32>            start a new bracket
  name <match> <p1|p2> <name> set a contestant name
  score <match> <p1|p2> <n|-> set or clear a score
  win <match>                 decide a match
  reset [size]                start over
  show                        print the bracket
  quit                        exit";

/// Parse errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid match id '{0}': expected r<round>m<index>, e.g. r1m0")]
    BadMatch(String),

    #[error("invalid slot '{0}': expected p1 or p2")]
    BadSlot(String),

    #[error("invalid number '{0}'")]
    BadNumber(String),
}

/// A match address: 1-based round number, 0-based match index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRef {
    pub round: usize,
    pub index: usize,
}

impl FromStr for MatchRef {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || CommandError::BadMatch(s.to_string());
        let rest = s.strip_prefix('r').ok_or_else(bad)?;
        let (round, index) = rest.split_once('m').ok_or_else(bad)?;
        let round: usize = round.parse().map_err(|_| bad())?;
        let index: usize = index.parse().map_err(|_| bad())?;
        if round == 0 {
            return Err(bad());
        }
        Ok(Self { round, index })
    }
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Size(u32),
    Name {
        target: MatchRef,
        slot: Slot,
        name: String,
    },
    Score {
        target: MatchRef,
        slot: Slot,
        score: Option<f64>,
    },
    Win(MatchRef),
    Reset(Option<u32>),
    Show,
    Help,
    Quit,
}

fn slot(token: &str) -> Result<Slot, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::BadSlot(token.to_string()))
}

fn number<T: FromStr>(token: &str) -> Result<T, CommandError> {
    token
        .parse()
        .map_err(|_| CommandError::BadNumber(token.to_string()))
}

/// Parse one console line.
///
/// # Errors
///
/// Returns a [`CommandError`] describing what is wrong with the line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(CommandError::Empty)?;

    match verb {
        "size" => match (words.next(), words.next()) {
            (Some(n), None) => Ok(Command::Size(number(n)?)),
            _ => Err(CommandError::Usage("size <4|8|16|32>")),
        },
        "name" => {
            let (Some(target), Some(which)) = (words.next(), words.next()) else {
                return Err(CommandError::Usage("name <match> <p1|p2> <name>"));
            };
            let name = words.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(CommandError::Usage("name <match> <p1|p2> <name>"));
            }
            Ok(Command::Name {
                target: target.parse()?,
                slot: slot(which)?,
                name,
            })
        }
        "score" => match (words.next(), words.next(), words.next(), words.next()) {
            (Some(target), Some(which), Some(value), None) => {
                let score = if value == "-" {
                    None
                } else {
                    let score: f64 = number(value)?;
                    if !score.is_finite() {
                        return Err(CommandError::BadNumber(value.to_string()));
                    }
                    Some(score)
                };
                Ok(Command::Score {
                    target: target.parse()?,
                    slot: slot(which)?,
                    score,
                })
            }
            _ => Err(CommandError::Usage("score <match> <p1|p2> <n|->")),
        },
        "win" => match (words.next(), words.next()) {
            (Some(target), None) => Ok(Command::Win(target.parse()?)),
            _ => Err(CommandError::Usage("win <match>")),
        },
        "reset" => match (words.next(), words.next()) {
            (None, _) => Ok(Command::Reset(None)),
            (Some(n), None) => Ok(Command::Reset(Some(number(n)?))),
            _ => Err(CommandError::Usage("reset [size]")),
        },
        "show" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Resolve a match address to a round name using the current bracket.
fn round_name(coordinator: &SyncCoordinator, target: MatchRef) -> Result<String> {
    let snapshot = coordinator
        .snapshot()
        .ok_or_else(|| anyhow!("no bracket yet; use 'size' first"))?;
    snapshot
        .bracket
        .rounds
        .get(target.round - 1)
        .map(|r| r.name.clone())
        .ok_or_else(|| anyhow!("round {} does not exist", target.round))
}

/// Apply an edit command. Returns a line to show the operator.
///
/// # Errors
///
/// Returns an error if the coordinator rejects the edit.
pub fn execute(coordinator: &SyncCoordinator, command: Command) -> Result<String> {
    match command {
        Command::Size(size) => {
            coordinator.select_size(size)?;
            Ok(format!("new {size} player bracket"))
        }
        Command::Name { target, slot, name } => {
            let round = round_name(coordinator, target)?;
            let changed =
                coordinator.record_slot(&round, target.index, slot, SlotField::Name(name))?;
            Ok(unchanged_note(changed, "name set"))
        }
        Command::Score {
            target,
            slot,
            score,
        } => {
            let round = round_name(coordinator, target)?;
            let changed =
                coordinator.record_slot(&round, target.index, slot, SlotField::Score(score))?;
            Ok(unchanged_note(changed, "score set"))
        }
        Command::Win(target) => {
            let round = round_name(coordinator, target)?;
            let decision = coordinator.decide_winner(&round, target.index)?;
            if decision.champion {
                Ok(format!("{} is the champion!", decision.winner))
            } else {
                Ok(format!("{} advances", decision.winner))
            }
        }
        Command::Reset(size) => {
            let size = size
                .or_else(|| coordinator.snapshot().map(|s| u32::from(s.size)))
                .unwrap_or(8);
            coordinator.reset(size)?;
            Ok(format!("tournament reset ({size} players)"))
        }
        Command::Show | Command::Help | Command::Quit => Ok(String::new()),
    }
}

fn unchanged_note(changed: bool, done: &str) -> String {
    if changed {
        done.to_string()
    } else {
        "no change: match missing or already decided".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tourney_core::{MemoryStore, Role, SnapshotStore, SyncConfig};
    use tourney_protocol::BracketSize;

    #[test]
    fn test_parse_match_ref() {
        assert_eq!(
            "r2m3".parse::<MatchRef>(),
            Ok(MatchRef { round: 2, index: 3 })
        );
        for bad in ["m0", "r0m0", "r1", "r1mx", "rxm1", ""] {
            assert!(bad.parse::<MatchRef>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_parse_commands() {
        let target = MatchRef { round: 1, index: 0 };

        assert_eq!(parse("size 16"), Ok(Command::Size(16)));
        assert_eq!(
            parse("name r1m0 p1 Ada Lovelace"),
            Ok(Command::Name {
                target,
                slot: Slot::Player1,
                name: "Ada Lovelace".into()
            })
        );
        assert_eq!(
            parse("score r1m0 player2 2.5"),
            Ok(Command::Score {
                target,
                slot: Slot::Player2,
                score: Some(2.5)
            })
        );
        assert_eq!(
            parse("score r1m0 2 -"),
            Ok(Command::Score {
                target,
                slot: Slot::Player2,
                score: None
            })
        );
        assert_eq!(parse("  win r1m0 "), Ok(Command::Win(target)));
        assert_eq!(parse("reset"), Ok(Command::Reset(None)));
        assert_eq!(parse("reset 4"), Ok(Command::Reset(Some(4))));
        assert_eq!(parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(CommandError::Empty));
        assert_eq!(parse("dance"), Err(CommandError::Unknown("dance".into())));
        assert!(matches!(parse("size"), Err(CommandError::Usage(_))));
        assert!(matches!(parse("name r1m0 p1"), Err(CommandError::Usage(_))));
        assert_eq!(parse("name r1m0 p3 X"), Err(CommandError::BadSlot("p3".into())));
        assert_eq!(parse("score r1m0 p1 lots"), Err(CommandError::BadNumber("lots".into())));
        assert_eq!(parse("score r1m0 p1 NaN"), Err(CommandError::BadNumber("NaN".into())));
        assert_eq!(parse("win final"), Err(CommandError::BadMatch("final".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_plays_a_bracket() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn SnapshotStore> = store.clone();
        let admin = SyncCoordinator::new(Role::Admin, dyn_store, SyncConfig::default());

        assert!(execute(&admin, parse("win r1m0").unwrap()).is_err());
        execute(&admin, parse("size 4").unwrap()).unwrap();

        for line in [
            "name r1m0 p1 Alice",
            "name r1m0 p2 Bob",
            "score r1m0 p1 3",
            "score r1m0 p2 1",
            "name r1m1 p1 Carol",
            "name r1m1 p2 Dave",
            "score r1m1 p1 0",
            "score r1m1 p2 2",
        ] {
            assert!(!execute(&admin, parse(line).unwrap()).unwrap().is_empty());
        }
        assert_eq!(execute(&admin, parse("win r1m0").unwrap()).unwrap(), "Alice advances");
        assert_eq!(execute(&admin, parse("win r1m1").unwrap()).unwrap(), "Dave advances");

        execute(&admin, parse("score r2m0 p1 5").unwrap()).unwrap();
        execute(&admin, parse("score r2m0 p2 5").unwrap()).unwrap();
        assert_eq!(
            execute(&admin, parse("win r2m0").unwrap()).unwrap(),
            "Alice is the champion!"
        );
        assert_eq!(
            execute(&admin, parse("name r1m0 p1 Eve").unwrap()).unwrap(),
            "no change: match missing or already decided"
        );
        assert!(execute(&admin, parse("win r3m0").unwrap()).is_err());

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        assert_eq!(store.get().unwrap().champion.as_deref(), Some("Alice"));

        execute(&admin, parse("reset").unwrap()).unwrap();
        let snapshot = admin.snapshot().unwrap();
        assert_eq!(snapshot.size, BracketSize::Four);
        assert!(snapshot.champion.is_none());
    }

    #[tokio::test]
    async fn test_viewer_cannot_execute() {
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        let viewer = SyncCoordinator::new(Role::Viewer, store, SyncConfig::default());

        let err = execute(&viewer, parse("size 8").unwrap()).unwrap_err();
        assert!(err.to_string().contains("Only admins"));
    }
}
