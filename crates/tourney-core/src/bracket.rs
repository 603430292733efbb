//! Single-elimination bracket engine.
//!
//! All operations are plain state transitions over a [`Bracket`] value. They
//! never block and never touch the network; persistence is the sync
//! coordinator's job.

use thiserror::Error;
use tourney_protocol::{
    round_name, Bracket, BracketSize, Match, Player, Round, Slot, FINAL_ROUND,
};
use tracing::{debug, trace};

/// Bracket validation errors.
///
/// A rejected operation leaves the bracket untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BracketError {
    /// Size is not one of 4, 8, 16, 32.
    #[error("Unsupported bracket size {0}: expected 4, 8, 16 or 32")]
    InvalidSize(u32),

    /// Round name does not exist.
    #[error("Round not found: {0}")]
    RoundNotFound(String),

    /// Match index is out of range for the round.
    #[error("Match {index} not found in {round}")]
    MatchNotFound { round: String, index: usize },

    /// Match already has a winner.
    #[error("Match {0} is already decided")]
    AlreadyCompleted(String),

    /// One of the two player names is empty.
    #[error("Match {0} needs both player names")]
    MissingPlayer(String),

    /// One of the two scores is missing.
    #[error("Match {0} needs both scores")]
    MissingScore(String),

    /// Structural invariant violated.
    #[error("Malformed bracket: {0}")]
    Malformed(String),
}

/// A value written into a contestant slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotField {
    /// Contestant name.
    Name(String),
    /// Contestant score; `None` clears it.
    Score(Option<f64>),
}

/// Outcome of a successful [`decide_winner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Name of the winning contestant.
    pub winner: String,
    /// Whether this decision crowned the champion.
    pub champion: bool,
}

/// Build an empty bracket for `size` contestants.
///
/// # Errors
///
/// Returns [`BracketError::InvalidSize`] unless `size` is 4, 8, 16 or 32.
pub fn initialize(size: u32) -> Result<Bracket, BracketError> {
    let size = BracketSize::try_from(size).map_err(|_| BracketError::InvalidSize(size))?;
    Ok(build(size))
}

/// Build an empty bracket for an already validated size.
#[must_use]
pub fn build(size: BracketSize) -> Bracket {
    let count = size.round_count();
    let mut matches_in_round = size.contestants() / 2;

    let rounds = (0..count)
        .map(|r| {
            let round = Round {
                name: round_name(r, count),
                matches: (0..matches_in_round)
                    .map(|m| Match::new(format!("r{}m{}", r + 1, m)))
                    .collect(),
            };
            matches_in_round /= 2;
            round
        })
        .collect();

    debug!(size = %size, rounds = count, "Initialized bracket");

    Bracket {
        size,
        rounds,
        champion: None,
    }
}

/// Discard all bracket state and start over with `size` contestants.
///
/// # Errors
///
/// Returns [`BracketError::InvalidSize`] for an unsupported size, in which case
/// the bracket is left as it was.
pub fn reset(bracket: &mut Bracket, size: u32) -> Result<(), BracketError> {
    *bracket = initialize(size)?;
    Ok(())
}

/// Write a name or score into one slot of an undecided match.
///
/// Returns `false` without touching anything when the round or match does not
/// exist, the match is already decided, or the score is not a finite number.
pub fn record_slot(
    bracket: &mut Bracket,
    round: &str,
    index: usize,
    slot: Slot,
    field: SlotField,
) -> bool {
    let Some(target) = bracket
        .round_mut(round)
        .and_then(|r| r.matches.get_mut(index))
    else {
        trace!(round = %round, index, "Ignoring write to missing match");
        return false;
    };

    if target.completed {
        trace!(round = %round, index, "Ignoring write to decided match");
        return false;
    }
    if let SlotField::Score(Some(score)) = &field {
        if !score.is_finite() {
            debug!(round = %round, index, score = *score, "Ignoring non-finite score");
            return false;
        }
    }

    let player = target.slot_mut(slot);
    match field {
        SlotField::Name(name) => player.name = name,
        SlotField::Score(score) => player.score = score,
    }
    true
}

/// Decide a match from its scores and advance the winner.
///
/// Ties favor player 1. Deciding the Final crowns the champion instead of
/// advancing. A decided match is never decided again, so calling this twice
/// is harmless.
///
/// # Errors
///
/// Returns an error, leaving the bracket untouched, if the match does not
/// exist, is already decided, or lacks a name or score.
pub fn decide_winner(
    bracket: &mut Bracket,
    round: &str,
    index: usize,
) -> Result<Decision, BracketError> {
    let round_index = bracket
        .round_index(round)
        .ok_or_else(|| BracketError::RoundNotFound(round.to_string()))?;
    let is_final = round_index + 1 == bracket.rounds.len();

    let target = bracket.rounds[round_index]
        .matches
        .get_mut(index)
        .ok_or_else(|| BracketError::MatchNotFound {
            round: round.to_string(),
            index,
        })?;

    if target.completed {
        return Err(BracketError::AlreadyCompleted(target.id.clone()));
    }
    if !target.player1.has_name() || !target.player2.has_name() {
        return Err(BracketError::MissingPlayer(target.id.clone()));
    }
    let (Some(score1), Some(score2)) = (target.player1.score, target.player2.score) else {
        return Err(BracketError::MissingScore(target.id.clone()));
    };

    let winner = if score1 >= score2 {
        target.player1.name.clone()
    } else {
        target.player2.name.clone()
    };
    target.winner = Some(winner.clone());
    target.completed = true;

    debug!(round = %round, index, winner = %winner, "Match decided");

    if is_final {
        bracket.champion = Some(winner.clone());
        debug!(champion = %winner, "Champion crowned");
        return Ok(Decision {
            winner,
            champion: true,
        });
    }

    advance_winner(bracket, round, index, &winner);
    Ok(Decision {
        winner,
        champion: false,
    })
}

/// Place `winner` into the following round.
///
/// The winner of match `i` lands in match `i / 2`, as player 1 for even `i`
/// and player 2 for odd `i`, with an empty score. A decided target match is
/// left as it is. Returns whether a slot was written.
pub fn advance_winner(bracket: &mut Bracket, round: &str, index: usize, winner: &str) -> bool {
    let Some(next) = bracket.round_index(round).map(|i| i + 1) else {
        return false;
    };
    let Some(target) = bracket
        .rounds
        .get_mut(next)
        .and_then(|r| r.matches.get_mut(index / 2))
    else {
        return false;
    };

    if target.completed {
        debug!(next = %target.id, winner = %winner, "Next match already decided, not advancing");
        return false;
    }

    let slot = Slot::for_feeder(index);
    *target.slot_mut(slot) = Player {
        name: winner.to_string(),
        score: None,
    };
    trace!(next = %target.id, ?slot, winner = %winner, "Advanced winner");
    true
}

/// Check the structural invariants of a bracket received from elsewhere.
///
/// # Errors
///
/// Returns [`BracketError::Malformed`] describing the first violation found.
pub fn validate(bracket: &Bracket) -> Result<(), BracketError> {
    let size = bracket.size;
    let count = size.round_count();

    if bracket.rounds.len() != count {
        return Err(BracketError::Malformed(format!(
            "{} rounds for size {}, expected {}",
            bracket.rounds.len(),
            size,
            count
        )));
    }

    let mut expected = size.contestants() / 2;
    for (i, round) in bracket.rounds.iter().enumerate() {
        if round.name != round_name(i, count) {
            return Err(BracketError::Malformed(format!(
                "round {} is named '{}'",
                i + 1,
                round.name
            )));
        }
        if round.matches.len() != expected {
            return Err(BracketError::Malformed(format!(
                "{} has {} matches, expected {}",
                round.name,
                round.matches.len(),
                expected
            )));
        }
        for m in &round.matches {
            let scores = [m.player1.score, m.player2.score];
            if scores.iter().flatten().any(|s| !s.is_finite()) {
                return Err(BracketError::Malformed(format!(
                    "match {} has a non-finite score",
                    m.id
                )));
            }
            if m.completed {
                let valid = m
                    .winner
                    .as_ref()
                    .is_some_and(|w| *w == m.player1.name || *w == m.player2.name);
                if !valid {
                    return Err(BracketError::Malformed(format!(
                        "match {} is completed without a valid winner",
                        m.id
                    )));
                }
            }
        }
        expected /= 2;
    }

    let final_winner = bracket
        .final_match()
        .filter(|m| m.completed)
        .and_then(|m| m.winner.as_ref());
    if bracket.champion.as_ref() != final_winner {
        return Err(BracketError::Malformed(format!(
            "champion {:?} does not match the {} result",
            bracket.champion, FINAL_ROUND
        )));
    }

    Ok(())
}
