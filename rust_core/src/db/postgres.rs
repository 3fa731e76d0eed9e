//! PostgreSQL `LeagueStore` over sqlx.
//!
//! Upserts are single `INSERT ... ON CONFLICT` statements. Schedule
//! insertion serializes per league on `pg_advisory_xact_lock`, and snapshots
//! read inside one `REPEATABLE READ` read-only transaction. Every call goes
//! through `execute_with_retry`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::retry::{execute_with_retry, RetryConfig};
use super::{LeagueSnapshot, LeagueStore};
use crate::error::{LeagueError, Result};
use crate::models::{
    Fixture, League, Matchday, Member, Prediction, Profile, RealMatch, RoundMapping,
};
use crate::types::{FixtureId, LeagueId, MatchId, RoundNo, Score, UserId};

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LeagueRow {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    join_code: String,
    created_at: DateTime<Utc>,
}

impl From<LeagueRow> for League {
    fn from(row: LeagueRow) -> Self {
        League {
            id: row.id.into(),
            name: row.name,
            owner_id: row.owner_id.into(),
            join_code: row.join_code,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    user_id: Uuid,
    username: Option<String>,
    joined_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        let user_id = UserId::from(row.user_id);
        Member {
            user_id,
            display_name: row
                .username
                .unwrap_or_else(|| Member::fallback_name(user_id)),
            joined_at: row.joined_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    username: String,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            user_id: row.user_id.into(),
            username: row.username,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RealMatchRow {
    id: Uuid,
    competition_code: String,
    season: i32,
    matchday: i32,
    kickoff: Option<DateTime<Utc>>,
    home_team: String,
    away_team: String,
    home_goals: Option<i32>,
    away_goals: Option<i32>,
}

impl From<RealMatchRow> for RealMatch {
    fn from(row: RealMatchRow) -> Self {
        let final_score = match (row.home_goals, row.away_goals) {
            (Some(home), Some(away)) => Some(Score { home, away }),
            _ => None,
        };
        RealMatch {
            id: row.id.into(),
            competition_code: row.competition_code,
            season: row.season,
            matchday: row.matchday,
            kickoff: row.kickoff,
            home_team: row.home_team,
            away_team: row.away_team,
            final_score,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    league_id: Uuid,
    round_no: i32,
    competition_code: String,
    season: i32,
    matchday: i32,
}

impl From<MappingRow> for RoundMapping {
    fn from(row: MappingRow) -> Self {
        RoundMapping {
            league_id: row.league_id.into(),
            round_no: round_from_db(row.round_no),
            matchday: Matchday::new(&row.competition_code, row.season, row.matchday),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    user_id: Uuid,
    real_match_id: Uuid,
    pred_home: i32,
    pred_away: i32,
    updated_at: DateTime<Utc>,
}

impl From<PredictionRow> for Prediction {
    fn from(row: PredictionRow) -> Self {
        Prediction {
            user_id: row.user_id.into(),
            match_id: row.real_match_id.into(),
            predicted: Score {
                home: row.pred_home,
                away: row.pred_away,
            },
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FixtureRow {
    id: Uuid,
    league_id: Uuid,
    round_no: i32,
    home_user_id: Uuid,
    away_user_id: Uuid,
}

impl From<FixtureRow> for Fixture {
    fn from(row: FixtureRow) -> Self {
        Fixture {
            id: FixtureId::from(row.id),
            league_id: row.league_id.into(),
            round_no: round_from_db(row.round_no),
            home_user_id: row.home_user_id.into(),
            away_user_id: row.away_user_id.into(),
        }
    }
}

fn round_to_db(round_no: RoundNo) -> Result<i32> {
    i32::try_from(round_no).map_err(|_| {
        LeagueError::validation("round_no", format!("round {} is out of range", round_no))
    })
}

// round_no columns are CHECKed >= 1
fn round_from_db(round_no: i32) -> RoundNo {
    round_no.max(0) as RoundNo
}

/// Advisory lock key for a league: the first 8 bytes of its uuid
fn advisory_key(league_id: LeagueId) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&league_id.0.as_bytes()[..8]);
    i64::from_be_bytes(buf)
}

fn ids(match_ids: &[MatchId]) -> Vec<Uuid> {
    match_ids.iter().map(|id| id.0).collect()
}

// ============================================================================
// Shared queries
// ============================================================================

const LEAGUE_COLUMNS: &str = "l.id, l.name, l.owner_id, l.join_code, l.created_at";

const MATCH_COLUMNS: &str = "rm.id, rm.competition_code, rm.season, rm.matchday, rm.kickoff, \
     rm.home_team, rm.away_team, rm.home_goals, rm.away_goals";

async fn fetch_members<'e, E: PgExecutor<'e>>(
    executor: E,
    league_id: LeagueId,
) -> Result<Vec<Member>> {
    let rows = sqlx::query_as::<_, MemberRow>(
        r#"
        SELECT lm.user_id, p.username, lm.joined_at
        FROM league_members lm
        LEFT JOIN profiles p ON p.user_id = lm.user_id
        WHERE lm.league_id = $1
        ORDER BY lm.joined_at ASC, lm.user_id ASC
        "#,
    )
    .bind(league_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(Member::from).collect())
}

async fn fetch_fixtures<'e, E: PgExecutor<'e>>(
    executor: E,
    league_id: LeagueId,
) -> Result<Vec<Fixture>> {
    let rows = sqlx::query_as::<_, FixtureRow>(
        r#"
        SELECT id, league_id, round_no, home_user_id, away_user_id
        FROM fixtures
        WHERE league_id = $1
        ORDER BY round_no ASC, slot ASC
        "#,
    )
    .bind(league_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(Fixture::from).collect())
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    retry: RetryConfig,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `rust_core/migrations`
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn create_league_tx(pool: &PgPool, league: &League) -> Result<()> {
        let mut tx = pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO leagues (id, name, owner_id, join_code, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (join_code) DO NOTHING
            "#,
        )
        .bind(league.id)
        .bind(&league.name)
        .bind(league.owner_id)
        .bind(&league.join_code)
        .bind(league.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(LeagueError::conflict(format!(
                "join code {} is already in use",
                league.join_code
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO league_members (league_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (league_id, user_id) DO NOTHING
            "#,
        )
        .bind(league.id)
        .bind(league.owner_id)
        .bind(league.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_schedule_tx(
        pool: &PgPool,
        league_id: LeagueId,
        fixtures: &[Fixture],
    ) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(league_id))
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fixtures WHERE league_id = $1")
            .bind(league_id)
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Err(LeagueError::conflict(format!(
                "{} already has a schedule",
                league_id
            )));
        }

        for (slot, fixture) in fixtures.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO fixtures (id, league_id, round_no, slot, home_user_id, away_user_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(fixture.id)
            .bind(league_id)
            .bind(round_to_db(fixture.round_no)?)
            .bind(slot as i32)
            .bind(fixture.home_user_id)
            .bind(fixture.away_user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(%league_id, fixtures = fixtures.len(), "Schedule stored");
        Ok(())
    }

    async fn snapshot_tx(pool: &PgPool, league_id: LeagueId) -> Result<LeagueSnapshot> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let members = fetch_members(&mut *tx, league_id).await?;
        let fixtures = fetch_fixtures(&mut *tx, league_id).await?;

        let mappings: Vec<RoundMapping> = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT league_id, round_no, competition_code, season, matchday
            FROM round_matchday_map
            WHERE league_id = $1
            ORDER BY round_no ASC
            "#,
        )
        .bind(league_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(RoundMapping::from)
        .collect();

        let matches: Vec<RealMatch> = sqlx::query_as::<_, RealMatchRow>(&format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM real_matches rm
            WHERE EXISTS (
                SELECT 1 FROM round_matchday_map m
                WHERE m.league_id = $1
                  AND upper(m.competition_code) = upper(rm.competition_code)
                  AND m.season = rm.season
                  AND m.matchday = rm.matchday
            )
            ORDER BY rm.kickoff ASC NULLS LAST, rm.id ASC
            "#
        ))
        .bind(league_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(RealMatch::from)
        .collect();

        let match_ids: Vec<Uuid> = matches.iter().map(|m| m.id.0).collect();
        let predictions: Vec<Prediction> = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT up.user_id, up.real_match_id, up.pred_home, up.pred_away, up.updated_at
            FROM user_predictions up
            JOIN league_members lm ON lm.user_id = up.user_id AND lm.league_id = $1
            WHERE up.real_match_id = ANY($2)
            "#,
        )
        .bind(league_id)
        .bind(&match_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Prediction::from)
        .collect();

        tx.commit().await?;

        Ok(LeagueSnapshot {
            members,
            fixtures,
            mappings,
            matches,
            predictions,
        })
    }
}

#[async_trait]
impl LeagueStore for PgStore {
    async fn create_league(&self, league: &League) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "create_league", move || {
            Self::create_league_tx(pool, league)
        })
        .await
    }

    async fn get_league(&self, league_id: LeagueId) -> Result<Option<League>> {
        let pool = &self.pool;
        let row = execute_with_retry(&self.retry, "get_league", move || async move {
            sqlx::query_as::<_, LeagueRow>(&format!(
                "SELECT {LEAGUE_COLUMNS} FROM leagues l WHERE l.id = $1"
            ))
            .bind(league_id)
            .fetch_optional(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(row.map(League::from))
    }

    async fn find_league_by_code(&self, join_code: &str) -> Result<Option<League>> {
        let pool = &self.pool;
        let row = execute_with_retry(&self.retry, "find_league_by_code", move || async move {
            sqlx::query_as::<_, LeagueRow>(&format!(
                "SELECT {LEAGUE_COLUMNS} FROM leagues l WHERE l.join_code = $1"
            ))
            .bind(join_code)
            .fetch_optional(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(row.map(League::from))
    }

    async fn add_member(
        &self,
        league_id: LeagueId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<bool> {
        let pool = &self.pool;
        let inserted = execute_with_retry(&self.retry, "add_member", move || async move {
            sqlx::query(
                r#"
                INSERT INTO league_members (league_id, user_id, joined_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (league_id, user_id) DO NOTHING
                "#,
            )
            .bind(league_id)
            .bind(user_id)
            .bind(joined_at)
            .execute(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn is_member(&self, league_id: LeagueId, user_id: UserId) -> Result<bool> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "is_member", move || async move {
            sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM league_members WHERE league_id = $1 AND user_id = $2
                )
                "#,
            )
            .bind(league_id)
            .bind(user_id)
            .fetch_one(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await
    }

    async fn leagues_for_member(&self, user_id: UserId) -> Result<Vec<League>> {
        let pool = &self.pool;
        let rows = execute_with_retry(&self.retry, "leagues_for_member", move || async move {
            sqlx::query_as::<_, LeagueRow>(&format!(
                r#"
                SELECT {LEAGUE_COLUMNS}
                FROM leagues l
                JOIN league_members lm ON lm.league_id = l.id
                WHERE lm.user_id = $1
                ORDER BY l.created_at DESC, l.id ASC
                "#
            ))
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(rows.into_iter().map(League::from).collect())
    }

    async fn list_members(&self, league_id: LeagueId) -> Result<Vec<Member>> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "list_members", move || {
            fetch_members(pool, league_id)
        })
        .await
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "upsert_profile", move || async move {
            sqlx::query(
                r#"
                INSERT INTO profiles (user_id, username)
                VALUES ($1, $2)
                ON CONFLICT (user_id) DO UPDATE SET username = EXCLUDED.username
                "#,
            )
            .bind(profile.user_id)
            .bind(&profile.username)
            .execute(pool)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db) if db.is_unique_violation() => LeagueError::conflict(
                    format!("username {} is already taken", profile.username),
                ),
                _ => LeagueError::from(err),
            })
        })
        .await?;
        Ok(())
    }

    async fn find_profile_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let pool = &self.pool;
        let wanted = username.trim();
        let row = execute_with_retry(&self.retry, "find_profile_by_username", move || async move {
            sqlx::query_as::<_, ProfileRow>(
                "SELECT user_id, username FROM profiles WHERE lower(username) = lower($1)",
            )
            .bind(wanted)
            .fetch_optional(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(row.map(Profile::from))
    }

    async fn upsert_real_match(&self, real_match: &RealMatch) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "upsert_real_match", move || async move {
            sqlx::query(
                r#"
                INSERT INTO real_matches (
                    id, competition_code, season, matchday, kickoff,
                    home_team, away_team, home_goals, away_goals
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    competition_code = EXCLUDED.competition_code,
                    season = EXCLUDED.season,
                    matchday = EXCLUDED.matchday,
                    kickoff = EXCLUDED.kickoff,
                    home_team = EXCLUDED.home_team,
                    away_team = EXCLUDED.away_team,
                    home_goals = EXCLUDED.home_goals,
                    away_goals = EXCLUDED.away_goals
                "#,
            )
            .bind(real_match.id)
            .bind(&real_match.competition_code)
            .bind(real_match.season)
            .bind(real_match.matchday)
            .bind(real_match.kickoff)
            .bind(&real_match.home_team)
            .bind(&real_match.away_team)
            .bind(real_match.final_score.map(|s| s.home))
            .bind(real_match.final_score.map(|s| s.away))
            .execute(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(())
    }

    async fn get_real_match(&self, match_id: MatchId) -> Result<Option<RealMatch>> {
        let pool = &self.pool;
        let row = execute_with_retry(&self.retry, "get_real_match", move || async move {
            sqlx::query_as::<_, RealMatchRow>(&format!(
                "SELECT {MATCH_COLUMNS} FROM real_matches rm WHERE rm.id = $1"
            ))
            .bind(match_id)
            .fetch_optional(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(row.map(RealMatch::from))
    }

    async fn set_final_score(&self, match_id: MatchId, score: Score) -> Result<bool> {
        let pool = &self.pool;
        let updated = execute_with_retry(&self.retry, "set_final_score", move || async move {
            sqlx::query("UPDATE real_matches SET home_goals = $2, away_goals = $3 WHERE id = $1")
                .bind(match_id)
                .bind(score.home)
                .bind(score.away)
                .execute(pool)
                .await
                .map_err(LeagueError::from)
        })
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn matches_for_matchday(&self, matchday: &Matchday) -> Result<Vec<RealMatch>> {
        let pool = &self.pool;
        let rows = execute_with_retry(&self.retry, "matches_for_matchday", move || async move {
            sqlx::query_as::<_, RealMatchRow>(&format!(
                r#"
                SELECT {MATCH_COLUMNS}
                FROM real_matches rm
                WHERE upper(rm.competition_code) = upper($1)
                  AND rm.season = $2
                  AND rm.matchday = $3
                ORDER BY rm.kickoff ASC NULLS LAST, rm.id ASC
                "#
            ))
            .bind(&matchday.competition_code)
            .bind(matchday.season)
            .bind(matchday.matchday)
            .fetch_all(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(rows.into_iter().map(RealMatch::from).collect())
    }

    async fn upsert_round_mapping(&self, mapping: &RoundMapping) -> Result<()> {
        let pool = &self.pool;
        let round_no = round_to_db(mapping.round_no)?;
        execute_with_retry(&self.retry, "upsert_round_mapping", move || async move {
            sqlx::query(
                r#"
                INSERT INTO round_matchday_map
                    (league_id, round_no, competition_code, season, matchday)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (league_id, round_no) DO UPDATE SET
                    competition_code = EXCLUDED.competition_code,
                    season = EXCLUDED.season,
                    matchday = EXCLUDED.matchday
                "#,
            )
            .bind(mapping.league_id)
            .bind(round_no)
            .bind(&mapping.matchday.competition_code)
            .bind(mapping.matchday.season)
            .bind(mapping.matchday.matchday)
            .execute(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(())
    }

    async fn get_round_mapping(
        &self,
        league_id: LeagueId,
        round_no: RoundNo,
    ) -> Result<Option<RoundMapping>> {
        let pool = &self.pool;
        let round = round_to_db(round_no)?;
        let row = execute_with_retry(&self.retry, "get_round_mapping", move || async move {
            sqlx::query_as::<_, MappingRow>(
                r#"
                SELECT league_id, round_no, competition_code, season, matchday
                FROM round_matchday_map
                WHERE league_id = $1 AND round_no = $2
                "#,
            )
            .bind(league_id)
            .bind(round)
            .fetch_optional(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(row.map(RoundMapping::from))
    }

    async fn upsert_prediction(&self, prediction: &Prediction) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "upsert_prediction", move || async move {
            sqlx::query(
                r#"
                INSERT INTO user_predictions
                    (user_id, real_match_id, pred_home, pred_away, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id, real_match_id) DO UPDATE SET
                    pred_home = EXCLUDED.pred_home,
                    pred_away = EXCLUDED.pred_away,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(prediction.user_id)
            .bind(prediction.match_id)
            .bind(prediction.predicted.home)
            .bind(prediction.predicted.away)
            .bind(prediction.updated_at)
            .execute(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(())
    }

    async fn predictions_for_user(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>> {
        if match_ids.is_empty() {
            return Ok(Vec::new());
        }
        let pool = &self.pool;
        let match_ids = ids(match_ids);
        let match_ids = &match_ids;
        let rows = execute_with_retry(&self.retry, "predictions_for_user", move || async move {
            sqlx::query_as::<_, PredictionRow>(
                r#"
                SELECT user_id, real_match_id, pred_home, pred_away, updated_at
                FROM user_predictions
                WHERE user_id = $1 AND real_match_id = ANY($2)
                "#,
            )
            .bind(user_id)
            .bind(match_ids)
            .fetch_all(pool)
            .await
            .map_err(LeagueError::from)
        })
        .await?;
        Ok(rows.into_iter().map(Prediction::from).collect())
    }

    async fn insert_schedule(&self, league_id: LeagueId, fixtures: &[Fixture]) -> Result<()> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "insert_schedule", move || {
            Self::insert_schedule_tx(pool, league_id, fixtures)
        })
        .await
    }

    async fn fixtures_for_league(&self, league_id: LeagueId) -> Result<Vec<Fixture>> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "fixtures_for_league", move || {
            fetch_fixtures(pool, league_id)
        })
        .await
    }

    async fn league_snapshot(&self, league_id: LeagueId) -> Result<LeagueSnapshot> {
        let pool = &self.pool;
        execute_with_retry(&self.retry, "league_snapshot", move || {
            Self::snapshot_tx(pool, league_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_key_is_stable_per_league() {
        let league = LeagueId::new();
        assert_eq!(advisory_key(league), advisory_key(league));

        let nil = LeagueId(Uuid::nil());
        assert_eq!(advisory_key(nil), 0);
    }

    #[test]
    fn test_round_conversion() {
        assert_eq!(round_to_db(7).unwrap(), 7);
        assert!(round_to_db(u32::MAX).is_err());
        assert_eq!(round_from_db(3), 3);
    }

    #[test]
    fn test_match_row_without_both_goals_is_unplayed() {
        let row = RealMatchRow {
            id: Uuid::nil(),
            competition_code: "EKSTRA".to_string(),
            season: 2025,
            matchday: 1,
            kickoff: None,
            home_team: "Legia".to_string(),
            away_team: "Lech".to_string(),
            home_goals: Some(1),
            away_goals: None,
        };
        assert!(!RealMatch::from(row).is_played());
    }

    // ------------------------------------------------------------------
    // Against a live database; each test migrates its own schema
    // ------------------------------------------------------------------

    use chrono::TimeZone;
    use sqlx::postgres::PgPoolOptions;

    async fn fresh_store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let schema = format!("h2h_test_{}", Uuid::new_v4().simple());

        let admin = PgPool::connect(&url).await.unwrap();
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin)
            .await
            .unwrap();
        admin.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .after_connect(move |conn, _meta| {
                let sql = format!("SET search_path TO {schema}");
                Box::pin(async move {
                    sqlx::query(&sql).execute(conn).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap();

        let store = PgStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn league(code: &str) -> League {
        League {
            id: LeagueId::new(),
            name: "Office Pool".to_string(),
            owner_id: UserId::new(),
            join_code: code.to_string(),
            created_at: Utc::now(),
        }
    }

    fn real_match(matchday: i32, hour: u32) -> RealMatch {
        RealMatch {
            id: MatchId::new(),
            competition_code: "EKSTRA".to_string(),
            season: 2025,
            matchday,
            kickoff: Some(Utc.with_ymd_and_hms(2025, 8, 2, hour, 0, 0).unwrap()),
            home_team: "Legia".to_string(),
            away_team: "Lech".to_string(),
            final_score: None,
        }
    }

    fn prediction(user_id: UserId, match_id: MatchId, home: i32, away: i32) -> Prediction {
        Prediction {
            user_id,
            match_id,
            predicted: Score { home, away },
            updated_at: Utc::now(),
        }
    }

    fn fixture(league_id: LeagueId, round_no: RoundNo, home: UserId, away: UserId) -> Fixture {
        Fixture {
            id: FixtureId::new(),
            league_id,
            round_no,
            home_user_id: home,
            away_user_id: away,
        }
    }

    async fn fixture_count(store: &PgStore, league_id: LeagueId) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM fixtures WHERE league_id = $1")
            .bind(league_id)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_prediction_upsert_keeps_one_row_with_second_value() {
        let store = fresh_store().await;
        let user = UserId::new();
        let m = real_match(1, 12);
        store.upsert_real_match(&m).await.unwrap();

        store.upsert_prediction(&prediction(user, m.id, 1, 0)).await.unwrap();
        store.upsert_prediction(&prediction(user, m.id, 2, 2)).await.unwrap();

        let rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_predictions WHERE user_id = $1 AND real_match_id = $2",
        )
        .bind(user)
        .bind(m.id)
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(rows, 1);

        let stored = store.predictions_for_user(user, &[m.id]).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].predicted, Score { home: 2, away: 2 });
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_second_schedule_is_a_conflict() {
        let store = fresh_store().await;
        let l = league("PGSCH1");
        store.create_league(&l).await.unwrap();
        let guest = UserId::new();
        store.add_member(l.id, guest, Utc::now()).await.unwrap();

        let first = vec![fixture(l.id, 1, l.owner_id, guest)];
        store.insert_schedule(l.id, &first).await.unwrap();

        let second = vec![
            fixture(l.id, 1, guest, l.owner_id),
            fixture(l.id, 2, l.owner_id, guest),
        ];
        let err = store.insert_schedule(l.id, &second).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(fixture_count(&store, l.id).await, 1);

        let stored = store.fixtures_for_league(l.id).await.unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_concurrent_schedule_inserts_store_one_schedule() {
        let store = fresh_store().await;
        let l = league("PGSCH2");
        store.create_league(&l).await.unwrap();
        let guest = UserId::new();

        let a = vec![fixture(l.id, 1, l.owner_id, guest)];
        let b = vec![
            fixture(l.id, 1, guest, l.owner_id),
            fixture(l.id, 2, l.owner_id, guest),
        ];
        let (ra, rb) = tokio::join!(
            store.insert_schedule(l.id, &a),
            store.insert_schedule(l.id, &b)
        );

        assert!(ra.is_ok() != rb.is_ok(), "exactly one insert must win");
        let expected = if ra.is_ok() { a.len() } else { b.len() };
        assert_eq!(fixture_count(&store, l.id).await, expected as i64);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_duplicate_join_code_is_a_conflict() {
        let store = fresh_store().await;
        let first = league("PGJN42");
        store.create_league(&first).await.unwrap();
        assert!(store.is_member(first.id, first.owner_id).await.unwrap());

        let second = league("PGJN42");
        let err = store.create_league(&second).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(store.get_league(second.id).await.unwrap().is_none());
        assert!(!store.is_member(second.id, second.owner_id).await.unwrap());

        let found = store.find_league_by_code("PGJN42").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_username_is_unique_ignoring_case() {
        let store = fresh_store().await;
        let first = Profile {
            user_id: UserId::new(),
            username: "Ania".to_string(),
        };
        store.upsert_profile(&first).await.unwrap();

        let clash = Profile {
            user_id: UserId::new(),
            username: "ANIA".to_string(),
        };
        let err = store.upsert_profile(&clash).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let found = store.find_profile_by_username(" ania ").await.unwrap().unwrap();
        assert_eq!(found, first);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_snapshot_orders_matches_and_keeps_member_predictions() {
        let store = fresh_store().await;
        let l = league("PGSNP1");
        store.create_league(&l).await.unwrap();
        let guest = UserId::new();
        store.add_member(l.id, guest, Utc::now()).await.unwrap();
        store
            .insert_schedule(l.id, &[fixture(l.id, 1, l.owner_id, guest)])
            .await
            .unwrap();

        let mapping = RoundMapping {
            league_id: l.id,
            round_no: 1,
            matchday: Matchday::new("ekstra", 2025, 3),
        };
        store.upsert_round_mapping(&mapping).await.unwrap();

        let late = real_match(3, 18);
        let early_a = real_match(3, 12);
        let early_b = real_match(3, 12);
        let other_matchday = real_match(4, 12);
        for m in [&late, &early_a, &early_b, &other_matchday] {
            store.upsert_real_match(m).await.unwrap();
        }

        let outsider = UserId::new();
        store.upsert_prediction(&prediction(guest, late.id, 1, 0)).await.unwrap();
        store.upsert_prediction(&prediction(outsider, late.id, 0, 1)).await.unwrap();

        let snapshot = store.league_snapshot(l.id).await.unwrap();

        let mut early = vec![early_a.id, early_b.id];
        early.sort();
        let order: Vec<MatchId> = snapshot.matches.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![early[0], early[1], late.id]);

        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.fixtures.len(), 1);
        assert_eq!(snapshot.mappings, vec![mapping]);
        assert_eq!(snapshot.predictions.len(), 1);
        assert_eq!(snapshot.predictions[0].user_id, guest);
    }
}
