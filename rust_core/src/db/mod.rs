//! Persistence boundary.
//!
//! `LeagueStore` is the typed data-access layer the service runs against:
//! - `postgres::PgStore` for production (sqlx, migrations in `migrations/`)
//! - `memory::MemoryStore` for tests and embedding
//!
//! Stores only hold source-of-truth rows. Fixture results and standings are
//! always recomputed from a `LeagueSnapshot`.

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::mapper::{resolve_round, RoundMatches};
use crate::models::{
    Fixture, League, Matchday, Member, Prediction, Profile, RealMatch, RoundMapping,
};
use crate::types::{LeagueId, MatchId, RoundNo, Score, UserId};

pub use memory::MemoryStore;
pub use pool::{create_pool, DbPoolConfig};
pub use postgres::PgStore;
pub use retry::RetryConfig;

/// Consistent read of everything needed to recompute a league's derived views
#[derive(Debug, Clone, Default)]
pub struct LeagueSnapshot {
    /// Join order
    pub members: Vec<Member>,
    /// Round ascending, schedule order within a round
    pub fixtures: Vec<Fixture>,
    pub mappings: Vec<RoundMapping>,
    /// Real matches of every mapped matchday
    pub matches: Vec<RealMatch>,
    /// Members' predictions on `matches`
    pub predictions: Vec<Prediction>,
}

impl LeagueSnapshot {
    /// Resolve every scheduled round against the snapshot's matches
    pub fn rounds(&self) -> FxHashMap<RoundNo, RoundMatches> {
        let by_round: FxHashMap<RoundNo, &RoundMapping> =
            self.mappings.iter().map(|m| (m.round_no, m)).collect();

        let mut rounds = FxHashMap::default();
        for fixture in &self.fixtures {
            rounds.entry(fixture.round_no).or_insert_with(|| {
                resolve_round(by_round.get(&fixture.round_no).copied(), &self.matches)
            });
        }
        rounds
    }

    pub fn mapping(&self, round_no: RoundNo) -> Option<&RoundMapping> {
        self.mappings.iter().find(|m| m.round_no == round_no)
    }
}

#[async_trait]
pub trait LeagueStore: Send + Sync {
    // ------------------------------------------------------------------
    // Leagues & membership
    // ------------------------------------------------------------------

    /// Insert a league together with the owner's membership.
    ///
    /// Fails with `Conflict` when the join code is already taken.
    async fn create_league(&self, league: &League) -> Result<()>;

    async fn get_league(&self, league_id: LeagueId) -> Result<Option<League>>;

    /// Look up a league by an already normalized join code
    async fn find_league_by_code(&self, join_code: &str) -> Result<Option<League>>;

    /// Add a membership; returns false when the user was already a member
    async fn add_member(
        &self,
        league_id: LeagueId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn is_member(&self, league_id: LeagueId, user_id: UserId) -> Result<bool>;

    /// Leagues the user belongs to, newest first
    async fn leagues_for_member(&self, user_id: UserId) -> Result<Vec<League>>;

    /// Roster in join order with display names
    async fn list_members(&self, league_id: LeagueId) -> Result<Vec<Member>>;

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Create or rename a profile. Usernames are unique case-insensitively;
    /// a name held by another user is a `Conflict`.
    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>>;

    // ------------------------------------------------------------------
    // Real matches
    // ------------------------------------------------------------------

    async fn upsert_real_match(&self, real_match: &RealMatch) -> Result<()>;

    async fn get_real_match(&self, match_id: MatchId) -> Result<Option<RealMatch>>;

    /// Set the final score; returns false when the match does not exist
    async fn set_final_score(&self, match_id: MatchId, score: Score) -> Result<bool>;

    async fn matches_for_matchday(&self, matchday: &Matchday) -> Result<Vec<RealMatch>>;

    // ------------------------------------------------------------------
    // Round mappings
    // ------------------------------------------------------------------

    async fn upsert_round_mapping(&self, mapping: &RoundMapping) -> Result<()>;

    async fn get_round_mapping(
        &self,
        league_id: LeagueId,
        round_no: RoundNo,
    ) -> Result<Option<RoundMapping>>;

    // ------------------------------------------------------------------
    // Predictions
    // ------------------------------------------------------------------

    /// Insert or overwrite the prediction for (user, match). Concurrent
    /// writers on the same key leave exactly one row holding one of the
    /// submitted values.
    async fn upsert_prediction(&self, prediction: &Prediction) -> Result<()>;

    async fn predictions_for_user(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>>;

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Store a league's whole schedule in one write.
    ///
    /// Fails with `Conflict` when the league already has fixtures; concurrent
    /// calls for one league are serialized.
    async fn insert_schedule(&self, league_id: LeagueId, fixtures: &[Fixture]) -> Result<()>;

    async fn fixtures_for_league(&self, league_id: LeagueId) -> Result<Vec<Fixture>>;

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Read members, fixtures, mappings, matches and predictions of a league
    /// as of one point in time
    async fn league_snapshot(&self, league_id: LeagueId) -> Result<LeagueSnapshot>;
}
