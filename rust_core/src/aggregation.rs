//! Head-to-head fixture aggregation.
//!
//! Each member's prediction points over the round's mapped matches are
//! summed; the higher total wins the fixture. A fixture stays pending while
//! its round is unmapped, has no matches, or has any match without a final
//! score. Pending fixtures carry provisional totals where they exist but never
//! award league points.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::config::ScoringRules;
use crate::mapper::RoundMatches;
use crate::models::Fixture;
use crate::scoring::{member_total, PredictionIndex};
use crate::types::{Points, RoundNo, UserId};

/// Result of a fixture from one member's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H2hOutcome {
    Win,
    Draw,
    Loss,
}

impl H2hOutcome {
    /// One-letter form code
    pub fn code(&self) -> char {
        match self {
            H2hOutcome::Win => 'W',
            H2hOutcome::Draw => 'D',
            H2hOutcome::Loss => 'L',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PendingReason {
    /// The round has no matchday mapping
    Unmapped,
    /// The mapped matchday has no real matches
    NoMatches,
    /// Some mapped matches have no final score yet
    Unplayed { remaining: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FixtureStatus {
    Resolved {
        home_total: Points,
        away_total: Points,
        home_points: Points,
        away_points: Points,
    },
    Pending {
        pending: PendingReason,
        /// Totals over the already played matches, if any were played
        provisional: Option<(Points, Points)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureResult {
    pub fixture: Fixture,
    #[serde(flatten)]
    pub status: FixtureStatus,
}

impl FixtureResult {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, FixtureStatus::Pending { .. })
    }

    pub fn round_no(&self) -> RoundNo {
        self.fixture.round_no
    }

    /// (own total, opponent total) for a member of a resolved fixture
    pub fn totals_for(&self, user: UserId) -> Option<(Points, Points)> {
        let FixtureStatus::Resolved {
            home_total,
            away_total,
            ..
        } = self.status
        else {
            return None;
        };
        if user == self.fixture.home_user_id {
            Some((home_total, away_total))
        } else if user == self.fixture.away_user_id {
            Some((away_total, home_total))
        } else {
            None
        }
    }

    /// League points earned by a member; None while pending
    pub fn league_points_for(&self, user: UserId) -> Option<Points> {
        let FixtureStatus::Resolved {
            home_points,
            away_points,
            ..
        } = self.status
        else {
            return None;
        };
        if user == self.fixture.home_user_id {
            Some(home_points)
        } else if user == self.fixture.away_user_id {
            Some(away_points)
        } else {
            None
        }
    }

    /// Win/draw/loss for a member; None while pending
    pub fn outcome_for(&self, user: UserId) -> Option<H2hOutcome> {
        let (own, other) = self.totals_for(user)?;
        Some(match own.cmp(&other) {
            Ordering::Greater => H2hOutcome::Win,
            Ordering::Equal => H2hOutcome::Draw,
            Ordering::Less => H2hOutcome::Loss,
        })
    }
}

/// Compute the result of one fixture from its round's matches
pub fn aggregate_fixture(
    fixture: &Fixture,
    round: &RoundMatches,
    predictions: &PredictionIndex,
    rules: &ScoringRules,
) -> FixtureResult {
    let matches = match round {
        RoundMatches::Unmapped => {
            return pending(fixture, PendingReason::Unmapped, None);
        }
        RoundMatches::Mapped { matches, .. } if matches.is_empty() => {
            return pending(fixture, PendingReason::NoMatches, None);
        }
        RoundMatches::Mapped { matches, .. } => matches,
    };

    let home = member_total(fixture.home_user_id, matches, predictions, rules);
    let away = member_total(fixture.away_user_id, matches, predictions, rules);

    if !(home.complete && away.complete) {
        let provisional = (home.scored_matches > 0).then_some((home.points, away.points));
        return pending(
            fixture,
            PendingReason::Unplayed {
                remaining: round.unplayed_count(),
            },
            provisional,
        );
    }

    let (home_points, away_points) = match home.points.cmp(&away.points) {
        Ordering::Greater => (rules.win_points, rules.loss_points),
        Ordering::Equal => (rules.draw_points, rules.draw_points),
        Ordering::Less => (rules.loss_points, rules.win_points),
    };

    FixtureResult {
        fixture: fixture.clone(),
        status: FixtureStatus::Resolved {
            home_total: home.points,
            away_total: away.points,
            home_points,
            away_points,
        },
    }
}

fn pending(
    fixture: &Fixture,
    reason: PendingReason,
    provisional: Option<(Points, Points)>,
) -> FixtureResult {
    FixtureResult {
        fixture: fixture.clone(),
        status: FixtureStatus::Pending {
            pending: reason,
            provisional,
        },
    }
}

/// Aggregate many fixtures in parallel. Output order matches input order;
/// rounds missing from `rounds` are treated as unmapped.
pub fn aggregate_fixtures(
    fixtures: &[Fixture],
    rounds: &FxHashMap<RoundNo, RoundMatches>,
    predictions: &PredictionIndex,
    rules: &ScoringRules,
) -> Vec<FixtureResult> {
    let results: Vec<FixtureResult> = fixtures
        .par_iter()
        .map(|fixture| {
            let round = rounds
                .get(&fixture.round_no)
                .unwrap_or(&RoundMatches::Unmapped);
            aggregate_fixture(fixture, round, predictions, rules)
        })
        .collect();

    debug!(
        fixtures = results.len(),
        pending = results.iter().filter(|r| r.is_pending()).count(),
        "Aggregated fixtures"
    );

    results
}
