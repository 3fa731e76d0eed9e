//! Round-robin schedule generation (circle method).
//!
//! Member 0 stays fixed while the remaining slots rotate one position per
//! round. An odd roster gets a placeholder "bye" slot; whoever faces the bye
//! sits the round out. Output depends only on roster order, so the same
//! roster snapshot always yields the same schedule.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{LeagueError, Result};
use crate::models::Fixture;
use crate::types::{FixtureId, LeagueId, RoundNo, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundRobinFormat {
    /// Every pair meets once
    #[default]
    Single,
    /// Every pair meets twice, second leg with sides swapped
    Double,
}

/// One home/away pairing inside a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub home: UserId,
    pub away: UserId,
}

impl Pairing {
    /// Unordered key for the pair
    pub fn key(&self) -> (UserId, UserId) {
        if self.home <= self.away {
            (self.home, self.away)
        } else {
            (self.away, self.home)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRound {
    pub round_no: RoundNo,
    pub pairings: Vec<Pairing>,
    /// Member sitting out this round (odd rosters only)
    pub bye: Option<UserId>,
}

/// Number of rounds in one leg for a roster of `members` players
pub fn rounds_per_leg(members: usize) -> usize {
    if members < 2 {
        0
    } else if members % 2 == 0 {
        members - 1
    } else {
        members
    }
}

/// Generate the full round-robin schedule for an ordered roster.
///
/// Fails with a validation error when the roster has fewer than two members
/// or contains the same member twice.
pub fn generate_schedule(
    roster: &[UserId],
    format: RoundRobinFormat,
) -> Result<Vec<ScheduledRound>> {
    if roster.len() < 2 {
        return Err(LeagueError::validation(
            "roster",
            format!("at least 2 members are required, got {}", roster.len()),
        ));
    }

    let mut seen = HashSet::with_capacity(roster.len());
    if let Some(dup) = roster.iter().find(|id| !seen.insert(**id)) {
        return Err(LeagueError::validation(
            "roster",
            format!("member {} appears more than once", dup),
        ));
    }

    let first_leg = circle_rounds(roster);
    let leg_len = first_leg.len() as RoundNo;

    let mut rounds = first_leg.clone();
    if format == RoundRobinFormat::Double {
        rounds.extend(first_leg.into_iter().map(|round| ScheduledRound {
            round_no: round.round_no + leg_len,
            pairings: round
                .pairings
                .iter()
                .map(|p| Pairing {
                    home: p.away,
                    away: p.home,
                })
                .collect(),
            bye: round.bye,
        }));
    }

    Ok(rounds)
}

fn circle_rounds(roster: &[UserId]) -> Vec<ScheduledRound> {
    let mut slots: Vec<Option<UserId>> = roster.iter().copied().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    let leg = rounds_per_leg(roster.len());
    let mut rounds = Vec::with_capacity(leg);

    for r in 0..leg {
        let mut pairings = Vec::with_capacity(n / 2);
        let mut bye = None;

        for i in 0..n / 2 {
            match (slots[i], slots[n - 1 - i]) {
                (Some(a), Some(b)) => {
                    // Fixed member alternates sides by round, the rest by table position.
                    let a_home = if i == 0 { r % 2 == 0 } else { (r + i) % 2 == 1 };
                    let (home, away) = if a_home { (a, b) } else { (b, a) };
                    pairings.push(Pairing { home, away });
                }
                (Some(a), None) | (None, Some(a)) => bye = Some(a),
                (None, None) => {}
            }
        }

        rounds.push(ScheduledRound {
            round_no: r as RoundNo + 1,
            pairings,
            bye,
        });

        slots[1..].rotate_right(1);
    }

    rounds
}

/// Materialize a schedule as fixtures for a league
pub fn build_fixtures(league_id: LeagueId, schedule: &[ScheduledRound]) -> Vec<Fixture> {
    schedule
        .iter()
        .flat_map(|round| {
            round.pairings.iter().map(move |p| Fixture {
                id: FixtureId::new(),
                league_id,
                round_no: round.round_no,
                home_user_id: p.home,
                away_user_id: p.away,
            })
        })
        .collect()
}
