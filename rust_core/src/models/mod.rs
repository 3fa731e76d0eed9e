// Source-of-truth entities. Derived views (fixture results, standings) live
// next to the code that computes them.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FixtureId, LeagueId, MatchId, RoundNo, Score, UserId};

// ============================================================================
// Leagues & Membership
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub id: LeagueId,
    pub name: String,
    pub owner_id: UserId,
    /// Upper-case, unique across all leagues
    pub join_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub league_id: LeagueId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

/// Member/profile lookup result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub username: String,
}

/// Roster entry: a membership joined with the member's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Display name used when the member has no profile
    pub fn fallback_name(user_id: UserId) -> String {
        let id = user_id.0.simple().to_string();
        format!("user-{}", &id[..8])
    }
}

// ============================================================================
// Rounds & Real Matches
// ============================================================================

/// Real-world matchday selector: (competition code, season, matchday)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Matchday {
    pub competition_code: String,
    pub season: i32,
    pub matchday: i32,
}

impl Matchday {
    pub fn new(competition_code: &str, season: i32, matchday: i32) -> Self {
        Self {
            competition_code: normalize_competition_code(competition_code),
            season,
            matchday,
        }
    }

    /// Case-insensitive on the competition code
    pub fn contains(&self, m: &RealMatch) -> bool {
        self.season == m.season
            && self.matchday == m.matchday
            && self.competition_code.to_lowercase() == m.competition_code.to_lowercase()
    }
}

/// Competition codes are stored trimmed and upper-case ("ekstra" -> "EKSTRA")
pub fn normalize_competition_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundMapping {
    pub league_id: LeagueId,
    pub round_no: RoundNo,
    #[serde(flatten)]
    pub matchday: Matchday,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealMatch {
    pub id: MatchId,
    pub competition_code: String,
    pub season: i32,
    pub matchday: i32,
    pub kickoff: Option<DateTime<Utc>>,
    pub home_team: String,
    pub away_team: String,
    /// None until the match has been played
    pub final_score: Option<Score>,
}

impl RealMatch {
    pub fn is_played(&self) -> bool {
        self.final_score.is_some()
    }
}

// ============================================================================
// Predictions & Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub user_id: UserId,
    pub match_id: MatchId,
    pub predicted: Score,
    pub updated_at: DateTime<Utc>,
}

/// Scheduled head-to-head pairing of two members in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub league_id: LeagueId,
    pub round_no: RoundNo,
    pub home_user_id: UserId,
    pub away_user_id: UserId,
}

impl Fixture {
    /// Get the opponent for a given member
    pub fn opponent(&self, user: UserId) -> Option<UserId> {
        if user == self.home_user_id {
            Some(self.away_user_id)
        } else if user == self.away_user_id {
            Some(self.home_user_id)
        } else {
            None
        }
    }
}
