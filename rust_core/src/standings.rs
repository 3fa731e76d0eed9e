//! League table and member summaries.
//!
//! Only resolved fixtures count. Rows are ordered by league points
//! descending, then display name compared case-insensitively, then user id so
//! the order is total even when two members share a name.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};

use crate::aggregation::{FixtureResult, H2hOutcome};
use crate::config::ScoringRules;
use crate::error::{LeagueError, Result};
use crate::models::Member;
use crate::types::{FixtureId, Points, RoundNo, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsRow {
    /// 1-based table position
    pub rank: usize,
    pub user_id: UserId,
    pub display_name: String,
    pub points: Points,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    /// Most recent first
    pub form: Vec<H2hOutcome>,
}

impl StandingsRow {
    /// Compact form guide, e.g. "WWDLW"
    pub fn form_string(&self) -> String {
        self.form.iter().map(|o| o.code()).collect()
    }
}

/// One resolved head-to-head match from a member's perspective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentMatch {
    pub fixture_id: FixtureId,
    pub round_no: RoundNo,
    pub opponent_id: UserId,
    pub opponent_name: String,
    pub own_total: Points,
    pub opponent_total: Points,
    pub result: H2hOutcome,
    pub league_points: Points,
}

/// Profile view of one member inside a league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub position: usize,
    pub points: Points,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub form: Vec<H2hOutcome>,
    /// Newest first
    pub recent: Vec<RecentMatch>,
}

#[derive(Default)]
struct Tally {
    points: Points,
    wins: u32,
    draws: u32,
    losses: u32,
    // (round, outcome) for every resolved fixture
    history: Vec<(RoundNo, H2hOutcome)>,
}

/// Compare two members for table order given their league points
fn table_order(a: (&Member, Points), b: (&Member, Points)) -> Ordering {
    b.1.cmp(&a.1)
        .then_with(|| {
            a.0.display_name
                .to_lowercase()
                .cmp(&b.0.display_name.to_lowercase())
        })
        .then_with(|| a.0.user_id.cmp(&b.0.user_id))
}

/// Build the ranked table for a league's roster from its fixture results.
///
/// Pending fixtures and fixtures involving non-members are ignored. A league
/// without any resolved fixture yields every member on 0, alphabetically.
pub fn build_standings(
    members: &[Member],
    results: &[FixtureResult],
    rules: &ScoringRules,
) -> Vec<StandingsRow> {
    let mut tallies: FxHashMap<UserId, Tally> = members
        .iter()
        .map(|m| (m.user_id, Tally::default()))
        .collect();

    for result in results.iter().filter(|r| !r.is_pending()) {
        for user in [result.fixture.home_user_id, result.fixture.away_user_id] {
            let (Some(tally), Some(outcome), Some(points)) = (
                tallies.get_mut(&user),
                result.outcome_for(user),
                result.league_points_for(user),
            ) else {
                continue;
            };
            tally.points += points;
            match outcome {
                H2hOutcome::Win => tally.wins += 1,
                H2hOutcome::Draw => tally.draws += 1,
                H2hOutcome::Loss => tally.losses += 1,
            }
            tally.history.push((result.round_no(), outcome));
        }
    }

    let mut order: Vec<&Member> = members.iter().collect();
    order.sort_by(|a, b| {
        let pa = tallies.get(&a.user_id).map_or(0, |t| t.points);
        let pb = tallies.get(&b.user_id).map_or(0, |t| t.points);
        table_order((a, pa), (b, pb))
    });

    order
        .into_iter()
        .enumerate()
        .map(|(i, member)| {
            let mut tally = tallies.remove(&member.user_id).unwrap_or_default();
            tally.history.sort_by_key(|(round, _)| Reverse(*round));
            StandingsRow {
                rank: i + 1,
                user_id: member.user_id,
                display_name: member.display_name.clone(),
                points: tally.points,
                played: tally.wins + tally.draws + tally.losses,
                wins: tally.wins,
                draws: tally.draws,
                losses: tally.losses,
                form: tally
                    .history
                    .iter()
                    .take(rules.form_length)
                    .map(|(_, o)| *o)
                    .collect(),
            }
        })
        .collect()
}

/// Summarize one member: table position, form, recent matches and season totals.
///
/// Fails with `NotFound` when the user is not on the roster.
pub fn member_summary(
    user: UserId,
    members: &[Member],
    results: &[FixtureResult],
    rules: &ScoringRules,
) -> Result<MemberSummary> {
    let table = build_standings(members, results, rules);
    let row = table
        .into_iter()
        .find(|r| r.user_id == user)
        .ok_or_else(|| LeagueError::not_found("member", user))?;

    let names: FxHashMap<UserId, &str> = members
        .iter()
        .map(|m| (m.user_id, m.display_name.as_str()))
        .collect();

    let mut recent: Vec<RecentMatch> = results
        .iter()
        .filter_map(|r| {
            let opponent_id = r.fixture.opponent(user)?;
            let (own_total, opponent_total) = r.totals_for(user)?;
            Some(RecentMatch {
                fixture_id: r.fixture.id,
                round_no: r.round_no(),
                opponent_id,
                opponent_name: names
                    .get(&opponent_id)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| Member::fallback_name(opponent_id)),
                own_total,
                opponent_total,
                result: r.outcome_for(user)?,
                league_points: r.league_points_for(user)?,
            })
        })
        .collect();
    recent.sort_by_key(|m| Reverse(m.round_no));
    recent.truncate(rules.recent_matches);

    Ok(MemberSummary {
        user_id: row.user_id,
        display_name: row.display_name,
        position: row.rank,
        points: row.points,
        played: row.played,
        wins: row.wins,
        draws: row.draws,
        losses: row.losses,
        form: row.form,
        recent,
    })
}
