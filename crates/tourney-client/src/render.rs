//! Plain-text bracket rendering.

use std::fmt::Write;
use tourney_protocol::{Match, Player, TournamentSnapshot};

/// Shown while there is no bracket to display.
pub const LOADING: &str = "Waiting for the tournament to start...";

fn player(p: &Player) -> String {
    let name = if p.has_name() { p.name.as_str() } else { "TBD" };
    match p.score {
        Some(score) => format!("{name} ({score})"),
        None => name.to_string(),
    }
}

fn line(m: &Match) -> String {
    let mut out = format!("  {:<6} {} vs {}", m.id, player(&m.player1), player(&m.player2));
    if let Some(winner) = m.winner.as_ref().filter(|_| m.completed) {
        let _ = write!(out, "  -> {winner}");
    }
    out
}

/// Render the bracket round by round, or the loading message.
#[must_use]
pub fn render(snapshot: Option<&TournamentSnapshot>) -> String {
    let Some(snapshot) = snapshot else {
        return LOADING.to_string();
    };

    let mut out = format!("{} player bracket\n", snapshot.size);
    for round in &snapshot.bracket.rounds {
        let _ = writeln!(out, "== {} ==", round.name);
        for m in &round.matches {
            let _ = writeln!(out, "{}", line(m));
        }
    }
    if let Some(champion) = &snapshot.champion {
        let _ = writeln!(out, "Champion: {champion}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourney_core::bracket::{self, SlotField};
    use tourney_protocol::Slot;

    #[test]
    fn test_render_loading() {
        assert_eq!(render(None), LOADING);
    }

    #[test]
    fn test_render_decided_final() {
        let mut b = bracket::initialize(4).unwrap();
        for (slot, name, score) in [(Slot::Player1, "Alice", 2.5), (Slot::Player2, "Bob", 1.0)] {
            bracket::record_slot(&mut b, "Round 1", 0, slot, SlotField::Name(name.into()));
            bracket::record_slot(&mut b, "Round 1", 0, slot, SlotField::Score(Some(score)));
        }
        bracket::decide_winner(&mut b, "Round 1", 0).unwrap();

        let text = render(Some(&TournamentSnapshot::new(b, 0)));
        assert!(text.starts_with("4 player bracket\n== Round 1 ==\n"));
        assert!(text.contains("r1m0   Alice (2.5) vs Bob (1)  -> Alice"));
        assert!(text.contains("r1m1   TBD vs TBD"));
        assert!(text.contains("== Final ==\n  r2m0   Alice vs TBD"));
        assert!(!text.contains("Champion"));
    }
}
