//! League operations over a `LeagueStore`.
//!
//! Every operation takes the caller's identity explicitly. Derived views
//! (round fixtures, standings, member summaries) are recomputed from one
//! store snapshot per call and never written back.

use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregation::{aggregate_fixture, aggregate_fixtures, FixtureResult};
use crate::config::ScoringRules;
use crate::db::{LeagueSnapshot, LeagueStore};
use crate::error::{LeagueError, Result};
use crate::join_code::{generate_join_code, normalize_join_code};
use crate::mapper::{build_mapping, resolve_round, RoundMatches};
use crate::models::{
    normalize_competition_code, League, Member, Prediction, Profile, RealMatch, RoundMapping,
};
use crate::schedule::{build_fixtures, generate_schedule, RoundRobinFormat, ScheduledRound};
use crate::scoring::PredictionIndex;
use crate::standings::{build_standings, member_summary, MemberSummary, StandingsRow};
use crate::types::{LeagueId, MatchId, RoundNo, Score, UserId};

pub const MIN_LEAGUE_NAME_LEN: usize = 3;
pub const MIN_USERNAME_LEN: usize = 3;

/// Fresh join codes tried before giving up with a conflict
const JOIN_CODE_ATTEMPTS: usize = 8;

/// A fixture result with both members' display names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureView {
    #[serde(flatten)]
    pub result: FixtureResult,
    pub home_name: String,
    pub away_name: String,
}

/// Everything shown for one league round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundView {
    pub round_no: RoundNo,
    pub matches: RoundMatches,
    pub fixtures: Vec<FixtureView>,
}

pub struct LeagueService<S> {
    store: S,
    rules: ScoringRules,
    schedule_locks: Mutex<FxHashMap<LeagueId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: LeagueStore> LeagueService<S> {
    pub fn new(store: S, rules: ScoringRules) -> Self {
        Self {
            store,
            rules,
            schedule_locks: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    fn schedule_lock(&self, league_id: LeagueId) -> Arc<tokio::sync::Mutex<()>> {
        self.schedule_locks
            .lock()
            .entry(league_id)
            .or_default()
            .clone()
    }

    /// Drop the league's entry once no other task holds or waits on it.
    /// Clones are only handed out under the map lock, so a count of one
    /// seen under that lock cannot race with a new waiter.
    fn release_schedule_lock(&self, league_id: LeagueId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.schedule_locks.lock();
        drop(lock);
        if locks
            .get(&league_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&league_id);
        }
    }

    async fn league(&self, league_id: LeagueId) -> Result<League> {
        self.store
            .get_league(league_id)
            .await?
            .ok_or_else(|| LeagueError::not_found("league", league_id))
    }

    /// Load the league and check the caller belongs to it
    async fn league_for_member(&self, caller: UserId, league_id: LeagueId) -> Result<League> {
        let league = self.league(league_id).await?;
        if !self.store.is_member(league_id, caller).await? {
            return Err(LeagueError::forbidden(format!(
                "{} is not a member of {}",
                caller, league_id
            )));
        }
        Ok(league)
    }

    async fn league_for_owner(&self, caller: UserId, league_id: LeagueId) -> Result<League> {
        let league = self.league(league_id).await?;
        if league.owner_id != caller {
            return Err(LeagueError::forbidden(format!(
                "only the owner of {} may do this",
                league_id
            )));
        }
        Ok(league)
    }

    // ========================================================================
    // Leagues & membership
    // ========================================================================

    /// Create a league owned by the caller, who becomes its first member
    pub async fn create_league(&self, caller: UserId, name: &str) -> Result<League> {
        let name = name.trim();
        if name.chars().count() < MIN_LEAGUE_NAME_LEN {
            return Err(LeagueError::validation(
                "name",
                format!("league name must be at least {} characters", MIN_LEAGUE_NAME_LEN),
            ));
        }

        for attempt in 1..=JOIN_CODE_ATTEMPTS {
            let league = League {
                id: LeagueId::new(),
                name: name.to_string(),
                owner_id: caller,
                join_code: generate_join_code(),
                created_at: Utc::now(),
            };
            match self.store.create_league(&league).await {
                Ok(()) => {
                    info!(league_id = %league.id, owner = %caller, "League created");
                    return Ok(league);
                }
                Err(LeagueError::Conflict { .. }) => {
                    warn!(
                        attempt,
                        code = %league.join_code,
                        "Join code collision, drawing another"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(LeagueError::conflict(
            "could not allocate a unique join code, try again",
        ))
    }

    /// Join a league by its code. Joining a league twice is a no-op.
    pub async fn join_league_by_code(&self, caller: UserId, code: &str) -> Result<League> {
        let code = normalize_join_code(code)?;
        let league = self
            .store
            .find_league_by_code(&code)
            .await?
            .ok_or_else(|| LeagueError::not_found("league", &code))?;

        if self.store.add_member(league.id, caller, Utc::now()).await? {
            info!(league_id = %league.id, user = %caller, "Member joined");
        } else {
            debug!(league_id = %league.id, user = %caller, "Already a member");
        }
        Ok(league)
    }

    /// Leagues the caller belongs to, newest first
    pub async fn leagues_for_member(&self, caller: UserId) -> Result<Vec<League>> {
        self.store.leagues_for_member(caller).await
    }

    /// Roster in join order
    pub async fn members(&self, caller: UserId, league_id: LeagueId) -> Result<Vec<Member>> {
        self.league_for_member(caller, league_id).await?;
        self.store.list_members(league_id).await
    }

    // ========================================================================
    // Schedule & round mapping
    // ========================================================================

    /// Generate and store the league's round-robin schedule.
    ///
    /// Owner only. A league gets exactly one schedule; a second call fails
    /// with `Conflict` and leaves the stored fixtures untouched.
    pub async fn generate_schedule(
        &self,
        caller: UserId,
        league_id: LeagueId,
        format: RoundRobinFormat,
    ) -> Result<Vec<ScheduledRound>> {
        self.league_for_owner(caller, league_id).await?;

        let lock = self.schedule_lock(league_id);
        let result = {
            let _guard = lock.lock().await;
            self.store_schedule(league_id, format).await
        };
        self.release_schedule_lock(league_id, lock);
        result
    }

    async fn store_schedule(
        &self,
        league_id: LeagueId,
        format: RoundRobinFormat,
    ) -> Result<Vec<ScheduledRound>> {
        let roster: Vec<UserId> = self
            .store
            .list_members(league_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        let schedule = generate_schedule(&roster, format)?;
        let fixtures = build_fixtures(league_id, &schedule);
        self.store.insert_schedule(league_id, &fixtures).await?;

        info!(
            %league_id,
            members = roster.len(),
            rounds = schedule.len(),
            fixtures = fixtures.len(),
            ?format,
            "Schedule generated"
        );
        Ok(schedule)
    }

    /// Bind a round to a (competition, season, matchday). Replaces any
    /// previous mapping; derived views pick the change up on their next read.
    pub async fn set_round_mapping(
        &self,
        caller: UserId,
        league_id: LeagueId,
        round_no: RoundNo,
        competition_code: &str,
        season: i32,
        matchday: i32,
    ) -> Result<RoundMapping> {
        self.league_for_owner(caller, league_id).await?;
        let mapping = build_mapping(league_id, round_no, competition_code, season, matchday)?;

        let previous = self.store.get_round_mapping(league_id, round_no).await?;
        self.store.upsert_round_mapping(&mapping).await?;

        match previous {
            Some(old) if old.matchday != mapping.matchday => info!(
                %league_id,
                round_no,
                from = ?old.matchday,
                to = ?mapping.matchday,
                "Round remapped"
            ),
            Some(_) => debug!(%league_id, round_no, "Round mapping unchanged"),
            None => info!(%league_id, round_no, matchday = ?mapping.matchday, "Round mapped"),
        }
        Ok(mapping)
    }

    /// Real matches of a round in kickoff order, or `Unmapped`
    pub async fn resolve_round(
        &self,
        caller: UserId,
        league_id: LeagueId,
        round_no: RoundNo,
    ) -> Result<RoundMatches> {
        self.league_for_member(caller, league_id).await?;
        let Some(mapping) = self.store.get_round_mapping(league_id, round_no).await? else {
            return Ok(RoundMatches::Unmapped);
        };
        let matches = self.store.matches_for_matchday(&mapping.matchday).await?;
        Ok(resolve_round(Some(&mapping), &matches))
    }

    // ========================================================================
    // Predictions, profiles & real matches
    // ========================================================================

    /// Create or overwrite the caller's prediction for a match.
    ///
    /// Closed once the match has a final score.
    pub async fn submit_prediction(
        &self,
        caller: UserId,
        match_id: MatchId,
        home_goals: i32,
        away_goals: i32,
    ) -> Result<Prediction> {
        let predicted = Score::new(home_goals, away_goals)?;
        let real_match = self
            .store
            .get_real_match(match_id)
            .await?
            .ok_or_else(|| LeagueError::not_found("match", match_id))?;
        if real_match.is_played() {
            return Err(LeagueError::validation(
                "match_id",
                format!("{} already has a final score", match_id),
            ));
        }

        let prediction = Prediction {
            user_id: caller,
            match_id,
            predicted,
            updated_at: Utc::now(),
        };
        self.store.upsert_prediction(&prediction).await?;
        debug!(user = %caller, %match_id, %predicted, "Prediction stored");
        Ok(prediction)
    }

    pub async fn upsert_profile(&self, caller: UserId, username: &str) -> Result<Profile> {
        let username = username.trim();
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(LeagueError::validation(
                "username",
                format!("username must be at least {} characters", MIN_USERNAME_LEN),
            ));
        }
        let profile = Profile {
            user_id: caller,
            username: username.to_string(),
        };
        self.store.upsert_profile(&profile).await?;
        Ok(profile)
    }

    /// Case-insensitive profile lookup
    pub async fn find_profile_by_username(&self, username: &str) -> Result<Profile> {
        self.store
            .find_profile_by_username(username)
            .await?
            .ok_or_else(|| LeagueError::not_found("profile", username.trim()))
    }

    /// Add or replace a match in the shared reference dataset
    pub async fn upsert_real_match(&self, mut real_match: RealMatch) -> Result<RealMatch> {
        real_match.competition_code = normalize_competition_code(&real_match.competition_code);
        if real_match.competition_code.is_empty() {
            return Err(LeagueError::validation(
                "competition_code",
                "competition code must not be empty",
            ));
        }
        if real_match.season <= 0 {
            return Err(LeagueError::validation("season", "season must be positive"));
        }
        if real_match.matchday <= 0 {
            return Err(LeagueError::validation("matchday", "matchday must be positive"));
        }
        if real_match.home_team.trim().is_empty() || real_match.away_team.trim().is_empty() {
            return Err(LeagueError::validation("team", "team names must not be empty"));
        }
        if let Some(score) = real_match.final_score {
            Score::new(score.home, score.away)?;
        }

        self.store.upsert_real_match(&real_match).await?;
        debug!(match_id = %real_match.id, code = %real_match.competition_code, "Real match stored");
        Ok(real_match)
    }

    pub async fn record_final_score(
        &self,
        match_id: MatchId,
        home_goals: i32,
        away_goals: i32,
    ) -> Result<RealMatch> {
        let score = Score::new(home_goals, away_goals)?;
        if !self.store.set_final_score(match_id, score).await? {
            return Err(LeagueError::not_found("match", match_id));
        }
        info!(%match_id, %score, "Final score recorded");
        self.store
            .get_real_match(match_id)
            .await?
            .ok_or_else(|| LeagueError::not_found("match", match_id))
    }

    // ========================================================================
    // Derived views
    // ========================================================================

    fn results(&self, snapshot: &LeagueSnapshot) -> Vec<FixtureResult> {
        let predictions: PredictionIndex = snapshot.predictions.iter().collect();
        aggregate_fixtures(&snapshot.fixtures, &snapshot.rounds(), &predictions, &self.rules)
    }

    /// Fixtures of one round with their results (resolved or pending)
    pub async fn round_fixtures(
        &self,
        caller: UserId,
        league_id: LeagueId,
        round_no: RoundNo,
    ) -> Result<RoundView> {
        self.league_for_member(caller, league_id).await?;
        let snapshot = self.store.league_snapshot(league_id).await?;

        let fixtures: Vec<_> = snapshot
            .fixtures
            .iter()
            .filter(|f| f.round_no == round_no)
            .collect();
        if fixtures.is_empty() {
            return Err(LeagueError::not_found(
                "round",
                format!("{} round {}", league_id, round_no),
            ));
        }

        let round = resolve_round(snapshot.mapping(round_no), &snapshot.matches);
        let predictions: PredictionIndex = snapshot.predictions.iter().collect();
        let names: FxHashMap<UserId, &str> = snapshot
            .members
            .iter()
            .map(|m| (m.user_id, m.display_name.as_str()))
            .collect();
        let name_of = |user: UserId| {
            names
                .get(&user)
                .map(|n| n.to_string())
                .unwrap_or_else(|| Member::fallback_name(user))
        };

        let fixtures = fixtures
            .into_iter()
            .map(|f| FixtureView {
                result: aggregate_fixture(f, &round, &predictions, &self.rules),
                home_name: name_of(f.home_user_id),
                away_name: name_of(f.away_user_id),
            })
            .collect();

        Ok(RoundView {
            round_no,
            matches: round,
            fixtures,
        })
    }

    /// The caller's own predictions on a round's mapped matches
    pub async fn member_predictions_for_round(
        &self,
        caller: UserId,
        league_id: LeagueId,
        round_no: RoundNo,
    ) -> Result<Vec<Prediction>> {
        let round = self.resolve_round(caller, league_id, round_no).await?;
        let match_ids: Vec<MatchId> = round.matches().iter().map(|m| m.id).collect();
        self.store.predictions_for_user(caller, &match_ids).await
    }

    pub async fn standings(
        &self,
        caller: UserId,
        league_id: LeagueId,
    ) -> Result<Vec<StandingsRow>> {
        self.league_for_member(caller, league_id).await?;
        let snapshot = self.store.league_snapshot(league_id).await?;
        let results = self.results(&snapshot);
        let table = build_standings(&snapshot.members, &results, &self.rules);
        debug!(
            %league_id,
            members = table.len(),
            resolved = results.iter().filter(|r| !r.is_pending()).count(),
            "Standings computed"
        );
        Ok(table)
    }

    pub async fn member_summary(
        &self,
        caller: UserId,
        league_id: LeagueId,
        user: UserId,
    ) -> Result<MemberSummary> {
        self.league_for_member(caller, league_id).await?;
        let snapshot = self.store.league_snapshot(league_id).await?;
        let results = self.results(&snapshot);
        member_summary(user, &snapshot.members, &results, &self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn service() -> LeagueService<MemoryStore> {
        LeagueService::new(MemoryStore::new(), ScoringRules::default())
    }

    #[tokio::test]
    async fn test_create_league_validates_trimmed_name() {
        let svc = service();
        let err = svc.create_league(UserId::new(), "  ab  ").await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let league = svc.create_league(UserId::new(), "  Office Pool ").await.unwrap();
        assert_eq!(league.name, "Office Pool");
        assert_eq!(league.join_code, league.join_code.to_uppercase());
    }

    #[tokio::test]
    async fn test_schedule_lock_is_shared_per_league() {
        let svc = service();
        let league = LeagueId::new();
        let a = svc.schedule_lock(league);
        let b = svc.schedule_lock(league);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &svc.schedule_lock(LeagueId::new())));
    }

    #[tokio::test]
    async fn test_schedule_locks_are_released_after_use() {
        let svc = service();
        let owner = UserId::new();
        let league = svc.create_league(owner, "Sunday League").await.unwrap();
        svc.store()
            .add_member(league.id, UserId::new(), Utc::now())
            .await
            .unwrap();

        svc.generate_schedule(owner, league.id, RoundRobinFormat::Single)
            .await
            .unwrap();
        assert!(svc.schedule_locks.lock().is_empty());

        let err = svc
            .generate_schedule(owner, league.id, RoundRobinFormat::Single)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(svc.schedule_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_held_schedule_lock_is_kept() {
        let svc = service();
        let league = LeagueId::new();
        let held = svc.schedule_lock(league);
        let released = svc.schedule_lock(league);
        svc.release_schedule_lock(league, released);
        assert!(svc.schedule_locks.lock().contains_key(&league));

        svc.release_schedule_lock(league, held);
        assert!(svc.schedule_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_non_member_is_forbidden() {
        let svc = service();
        let owner = UserId::new();
        let league = svc.create_league(owner, "Sunday League").await.unwrap();
        let err = svc.standings(UserId::new(), league.id).await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let err = svc.standings(owner, LeagueId::new()).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
