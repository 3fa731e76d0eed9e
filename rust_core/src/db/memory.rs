//! In-memory `LeagueStore`.
//!
//! All state sits behind one `parking_lot::RwLock`, so every method is
//! atomic and a snapshot sees a single consistent state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;

use super::{LeagueSnapshot, LeagueStore};
use crate::error::{LeagueError, Result};
use crate::models::{
    Fixture, League, Matchday, Member, Membership, Prediction, Profile, RealMatch, RoundMapping,
};
use crate::types::{LeagueId, MatchId, RoundNo, Score, UserId};

#[derive(Debug, Default)]
struct State {
    leagues: FxHashMap<LeagueId, League>,
    /// Insertion order doubles as join order
    memberships: Vec<Membership>,
    profiles: FxHashMap<UserId, Profile>,
    matches: FxHashMap<MatchId, RealMatch>,
    mappings: FxHashMap<(LeagueId, RoundNo), RoundMapping>,
    predictions: FxHashMap<(UserId, MatchId), Prediction>,
    fixtures: FxHashMap<LeagueId, Vec<Fixture>>,
}

impl State {
    fn is_member(&self, league_id: LeagueId, user_id: UserId) -> bool {
        self.memberships
            .iter()
            .any(|m| m.league_id == league_id && m.user_id == user_id)
    }

    fn members(&self, league_id: LeagueId) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .memberships
            .iter()
            .filter(|m| m.league_id == league_id)
            .map(|m| Member {
                user_id: m.user_id,
                display_name: self
                    .profiles
                    .get(&m.user_id)
                    .map(|p| p.username.clone())
                    .unwrap_or_else(|| Member::fallback_name(m.user_id)),
                joined_at: m.joined_at,
            })
            .collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        members
    }

    fn matchday_matches(&self, matchday: &Matchday) -> Vec<RealMatch> {
        self.matches
            .values()
            .filter(|m| matchday.contains(m))
            .cloned()
            .collect()
    }
}

/// `LeagueStore` kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored predictions
    pub fn prediction_count(&self) -> usize {
        self.state.read().predictions.len()
    }
}

#[async_trait]
impl LeagueStore for MemoryStore {
    async fn create_league(&self, league: &League) -> Result<()> {
        let mut state = self.state.write();
        if state.leagues.values().any(|l| l.join_code == league.join_code) {
            return Err(LeagueError::conflict(format!(
                "join code {} is already in use",
                league.join_code
            )));
        }
        if state.leagues.contains_key(&league.id) {
            return Err(LeagueError::conflict(format!("{} already exists", league.id)));
        }
        state.leagues.insert(league.id, league.clone());
        state.memberships.push(Membership {
            league_id: league.id,
            user_id: league.owner_id,
            joined_at: league.created_at,
        });
        Ok(())
    }

    async fn get_league(&self, league_id: LeagueId) -> Result<Option<League>> {
        Ok(self.state.read().leagues.get(&league_id).cloned())
    }

    async fn find_league_by_code(&self, join_code: &str) -> Result<Option<League>> {
        Ok(self
            .state
            .read()
            .leagues
            .values()
            .find(|l| l.join_code == join_code)
            .cloned())
    }

    async fn add_member(
        &self,
        league_id: LeagueId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write();
        if !state.leagues.contains_key(&league_id) {
            return Err(LeagueError::not_found("league", league_id));
        }
        if state.is_member(league_id, user_id) {
            return Ok(false);
        }
        state.memberships.push(Membership {
            league_id,
            user_id,
            joined_at,
        });
        Ok(true)
    }

    async fn is_member(&self, league_id: LeagueId, user_id: UserId) -> Result<bool> {
        Ok(self.state.read().is_member(league_id, user_id))
    }

    async fn leagues_for_member(&self, user_id: UserId) -> Result<Vec<League>> {
        let state = self.state.read();
        let mut leagues: Vec<League> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| state.leagues.get(&m.league_id).cloned())
            .collect();
        leagues.sort_by_key(|l| (Reverse(l.created_at), l.id));
        Ok(leagues)
    }

    async fn list_members(&self, league_id: LeagueId) -> Result<Vec<Member>> {
        Ok(self.state.read().members(league_id))
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let mut state = self.state.write();
        let wanted = profile.username.to_lowercase();
        let taken = state
            .profiles
            .values()
            .any(|p| p.user_id != profile.user_id && p.username.to_lowercase() == wanted);
        if taken {
            return Err(LeagueError::conflict(format!(
                "username {} is already taken",
                profile.username
            )));
        }
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let wanted = username.trim().to_lowercase();
        Ok(self
            .state
            .read()
            .profiles
            .values()
            .find(|p| p.username.to_lowercase() == wanted)
            .cloned())
    }

    async fn upsert_real_match(&self, real_match: &RealMatch) -> Result<()> {
        self.state
            .write()
            .matches
            .insert(real_match.id, real_match.clone());
        Ok(())
    }

    async fn get_real_match(&self, match_id: MatchId) -> Result<Option<RealMatch>> {
        Ok(self.state.read().matches.get(&match_id).cloned())
    }

    async fn set_final_score(&self, match_id: MatchId, score: Score) -> Result<bool> {
        let mut state = self.state.write();
        match state.matches.get_mut(&match_id) {
            Some(m) => {
                m.final_score = Some(score);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn matches_for_matchday(&self, matchday: &Matchday) -> Result<Vec<RealMatch>> {
        Ok(self.state.read().matchday_matches(matchday))
    }

    async fn upsert_round_mapping(&self, mapping: &RoundMapping) -> Result<()> {
        self.state
            .write()
            .mappings
            .insert((mapping.league_id, mapping.round_no), mapping.clone());
        Ok(())
    }

    async fn get_round_mapping(
        &self,
        league_id: LeagueId,
        round_no: RoundNo,
    ) -> Result<Option<RoundMapping>> {
        Ok(self.state.read().mappings.get(&(league_id, round_no)).cloned())
    }

    async fn upsert_prediction(&self, prediction: &Prediction) -> Result<()> {
        self.state
            .write()
            .predictions
            .insert((prediction.user_id, prediction.match_id), prediction.clone());
        Ok(())
    }

    async fn predictions_for_user(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>> {
        let state = self.state.read();
        Ok(match_ids
            .iter()
            .filter_map(|id| state.predictions.get(&(user_id, *id)).cloned())
            .collect())
    }

    async fn insert_schedule(&self, league_id: LeagueId, fixtures: &[Fixture]) -> Result<()> {
        let mut state = self.state.write();
        if state.fixtures.get(&league_id).is_some_and(|f| !f.is_empty()) {
            return Err(LeagueError::conflict(format!(
                "{} already has a schedule",
                league_id
            )));
        }
        let mut ordered = fixtures.to_vec();
        ordered.sort_by_key(|f| f.round_no);
        state.fixtures.insert(league_id, ordered);
        Ok(())
    }

    async fn fixtures_for_league(&self, league_id: LeagueId) -> Result<Vec<Fixture>> {
        Ok(self
            .state
            .read()
            .fixtures
            .get(&league_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn league_snapshot(&self, league_id: LeagueId) -> Result<LeagueSnapshot> {
        let state = self.state.read();

        let members = state.members(league_id);
        let fixtures = state.fixtures.get(&league_id).cloned().unwrap_or_default();

        let mut mappings: Vec<RoundMapping> = state
            .mappings
            .values()
            .filter(|m| m.league_id == league_id)
            .cloned()
            .collect();
        mappings.sort_by_key(|m| m.round_no);

        let mut seen = FxHashSet::default();
        let matches: Vec<RealMatch> = mappings
            .iter()
            .flat_map(|m| state.matchday_matches(&m.matchday))
            .filter(|m| seen.insert(m.id))
            .collect();

        let member_ids: FxHashSet<UserId> = members.iter().map(|m| m.user_id).collect();
        let predictions: Vec<Prediction> = matches
            .iter()
            .flat_map(|m| {
                member_ids
                    .iter()
                    .filter_map(|u| state.predictions.get(&(*u, m.id)).cloned())
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(LeagueSnapshot {
            members,
            fixtures,
            mappings,
            matches,
            predictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixtureId;
    use std::sync::Arc;

    fn league(owner: UserId, code: &str) -> League {
        League {
            id: LeagueId::new(),
            name: "Friday Five-a-side".to_string(),
            owner_id: owner,
            join_code: code.to_string(),
            created_at: Utc::now(),
        }
    }

    fn prediction(user: UserId, match_id: MatchId, home: i32, away: i32) -> Prediction {
        Prediction {
            user_id: user,
            match_id,
            predicted: Score { home, away },
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_league_adds_owner_and_rejects_duplicate_code() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let first = league(owner, "ABC234");
        store.create_league(&first).await.unwrap();
        assert!(store.is_member(first.id, owner).await.unwrap());

        let err = store
            .create_league(&league(UserId::new(), "ABC234"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent() {
        let store = MemoryStore::new();
        let l = league(UserId::new(), "QWERTY");
        store.create_league(&l).await.unwrap();

        let user = UserId::new();
        assert!(store.add_member(l.id, user, Utc::now()).await.unwrap());
        assert!(!store.add_member(l.id, user, Utc::now()).await.unwrap());
        assert_eq!(store.list_members(l.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_prediction_upsert_keeps_one_row() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let m = MatchId::new();
        store.upsert_prediction(&prediction(user, m, 1, 0)).await.unwrap();
        store.upsert_prediction(&prediction(user, m, 2, 2)).await.unwrap();

        assert_eq!(store.prediction_count(), 1);
        let stored = store.predictions_for_user(user, &[m]).await.unwrap();
        assert_eq!(stored[0].predicted, Score { home: 2, away: 2 });
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_submitted_value() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let m = MatchId::new();

        let mut handles = Vec::new();
        for goals in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_prediction(&prediction(user, m, goals, goals))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.prediction_count(), 1);
        let stored = store.predictions_for_user(user, &[m]).await.unwrap();
        let Score { home, away } = stored[0].predicted;
        assert_eq!(home, away);
        assert!((0..16).contains(&home));
    }

    #[tokio::test]
    async fn test_second_schedule_is_conflict() {
        let store = MemoryStore::new();
        let league_id = LeagueId::new();
        let fixture = Fixture {
            id: FixtureId::new(),
            league_id,
            round_no: 1,
            home_user_id: UserId::new(),
            away_user_id: UserId::new(),
        };
        store.insert_schedule(league_id, &[fixture.clone()]).await.unwrap();
        let err = store.insert_schedule(league_id, &[fixture]).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(store.fixtures_for_league(league_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_lookup_is_case_insensitive() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store
            .upsert_profile(&Profile {
                user_id: user,
                username: "KubaGol".to_string(),
            })
            .await
            .unwrap();

        let found = store.find_profile_by_username("kubagol").await.unwrap();
        assert_eq!(found.map(|p| p.user_id), Some(user));

        let err = store
            .upsert_profile(&Profile {
                user_id: UserId::new(),
                username: "KUBAGOL".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
