//! Round-to-matchday mapping.
//!
//! A league round is bound to at most one (competition, season, matchday)
//! triple. Resolving a round yields the real matches of that matchday in
//! kickoff order, or `RoundMatches::Unmapped` when no mapping exists yet.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{LeagueError, Result};
use crate::models::{Matchday, RealMatch, RoundMapping};
use crate::types::{LeagueId, RoundNo};

/// Outcome of resolving a league round to real matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundMatches {
    /// No mapping has been set for the round
    Unmapped,
    Mapped {
        mapping: RoundMapping,
        matches: Vec<RealMatch>,
    },
}

impl RoundMatches {
    pub fn is_mapped(&self) -> bool {
        matches!(self, RoundMatches::Mapped { .. })
    }

    /// Matches of the round, empty when unmapped
    pub fn matches(&self) -> &[RealMatch] {
        match self {
            RoundMatches::Unmapped => &[],
            RoundMatches::Mapped { matches, .. } => matches,
        }
    }

    pub fn unplayed_count(&self) -> usize {
        self.matches().iter().filter(|m| !m.is_played()).count()
    }
}

/// Validate and build a mapping for a league round
pub fn build_mapping(
    league_id: LeagueId,
    round_no: RoundNo,
    competition_code: &str,
    season: i32,
    matchday: i32,
) -> Result<RoundMapping> {
    if round_no == 0 {
        return Err(LeagueError::validation("round_no", "rounds start at 1"));
    }
    if competition_code.trim().is_empty() {
        return Err(LeagueError::validation(
            "competition_code",
            "competition code must not be empty",
        ));
    }
    if season <= 0 {
        return Err(LeagueError::validation(
            "season",
            format!("season must be positive, got {}", season),
        ));
    }
    if matchday <= 0 {
        return Err(LeagueError::validation(
            "matchday",
            format!("matchday must be positive, got {}", matchday),
        ));
    }

    Ok(RoundMapping {
        league_id,
        round_no,
        matchday: Matchday::new(competition_code, season, matchday),
    })
}

/// Kickoff ascending with unscheduled matches last, ties broken by match id
pub fn compare_matches(a: &RealMatch, b: &RealMatch) -> Ordering {
    let by_kickoff = match (a.kickoff, b.kickoff) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_kickoff.then_with(|| a.id.cmp(&b.id))
}

/// Resolve a round against a set of candidate matches.
///
/// Candidates outside the mapped matchday are ignored, so callers may pass a
/// superset (for example every match of a season).
pub fn resolve_round<'a, I>(mapping: Option<&RoundMapping>, candidates: I) -> RoundMatches
where
    I: IntoIterator<Item = &'a RealMatch>,
{
    let Some(mapping) = mapping else {
        return RoundMatches::Unmapped;
    };

    let mut matches: Vec<RealMatch> = candidates
        .into_iter()
        .filter(|m| mapping.matchday.contains(m))
        .cloned()
        .collect();
    matches.sort_by(compare_matches);

    RoundMatches::Mapped {
        mapping: mapping.clone(),
        matches,
    }
}
