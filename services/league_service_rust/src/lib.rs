//! JSON-lines front end for the league service.
//!
//! One request per line in, one response per line out. Requests carry the
//! caller's user id (resolved upstream) and an `op` tag:
//!
//! ```text
//! {"caller":"<uuid>","op":"standings","league_id":"<uuid>"}
//! {"ok":true,"data":[...]}
//! {"ok":false,"error":{"kind":"forbidden","message":"..."}}
//! ```
//!
//! Real matches and final scores are shared by every league, so
//! `upsert_real_match` and `record_final_score` are accepted only from the
//! configured result maintainers. With none configured, both are refused.

pub mod config;

use h2h_league_core::models::RealMatch;
use h2h_league_core::{
    LeagueError, LeagueId, LeagueService, LeagueStore, MatchId, RoundNo, RoundRobinFormat, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub caller: UserId,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateLeague {
        name: String,
    },
    JoinLeague {
        code: String,
    },
    MyLeagues,
    Members {
        league_id: LeagueId,
    },
    GenerateSchedule {
        league_id: LeagueId,
        #[serde(default)]
        format: RoundRobinFormat,
    },
    SetRoundMapping {
        league_id: LeagueId,
        round_no: RoundNo,
        competition_code: String,
        season: i32,
        matchday: i32,
    },
    ResolveRound {
        league_id: LeagueId,
        round_no: RoundNo,
    },
    SubmitPrediction {
        match_id: MatchId,
        home_goals: i32,
        away_goals: i32,
    },
    UpsertProfile {
        username: String,
    },
    FindProfile {
        username: String,
    },
    UpsertRealMatch {
        real_match: RealMatch,
    },
    RecordFinalScore {
        match_id: MatchId,
        home_goals: i32,
        away_goals: i32,
    },
    RoundFixtures {
        league_id: LeagueId,
        round_no: RoundNo,
    },
    MyPredictions {
        league_id: LeagueId,
        round_no: RoundNo,
    },
    Standings {
        league_id: LeagueId,
    },
    MemberSummary {
        league_id: LeagueId,
        user_id: UserId,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    League(#[from] LeagueError),

    #[error("Invalid request: {0}")]
    BadRequest(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::League(e) => e.kind(),
            DispatchError::BadRequest(_) => "bad_request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &DispatchError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

pub struct Handler<S> {
    service: LeagueService<S>,
    result_maintainers: HashSet<UserId>,
}

impl<S: LeagueStore> Handler<S> {
    pub fn new(service: LeagueService<S>) -> Self {
        Self {
            service,
            result_maintainers: HashSet::new(),
        }
    }

    pub fn with_result_maintainers(
        mut self,
        maintainers: impl IntoIterator<Item = UserId>,
    ) -> Self {
        self.result_maintainers.extend(maintainers);
        self
    }

    fn check_result_maintainer(&self, caller: UserId) -> Result<(), DispatchError> {
        if self.result_maintainers.contains(&caller) {
            Ok(())
        } else {
            Err(LeagueError::forbidden(format!("{} may not write match results", caller)).into())
        }
    }

    pub fn service(&self) -> &LeagueService<S> {
        &self.service
    }

    /// Parse and run one request line
    pub async fn handle_line(&self, line: &str) -> Response {
        let result = match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => Err(DispatchError::from(e)),
        };
        match result {
            Ok(data) => Response::success(data),
            Err(e) => {
                warn!(kind = e.kind(), "Request failed: {}", e);
                Response::failure(&e)
            }
        }
    }

    pub async fn dispatch(&self, envelope: Envelope) -> Result<Value, DispatchError> {
        let svc = &self.service;
        let caller = envelope.caller;
        debug!(%caller, request = ?envelope.request, "Dispatching");

        let data = match envelope.request {
            Request::CreateLeague { name } => to_json(svc.create_league(caller, &name).await?)?,
            Request::JoinLeague { code } => to_json(svc.join_league_by_code(caller, &code).await?)?,
            Request::MyLeagues => to_json(svc.leagues_for_member(caller).await?)?,
            Request::Members { league_id } => to_json(svc.members(caller, league_id).await?)?,
            Request::GenerateSchedule { league_id, format } => {
                to_json(svc.generate_schedule(caller, league_id, format).await?)?
            }
            Request::SetRoundMapping {
                league_id,
                round_no,
                competition_code,
                season,
                matchday,
            } => to_json(
                svc.set_round_mapping(
                    caller,
                    league_id,
                    round_no,
                    &competition_code,
                    season,
                    matchday,
                )
                .await?,
            )?,
            Request::ResolveRound {
                league_id,
                round_no,
            } => to_json(svc.resolve_round(caller, league_id, round_no).await?)?,
            Request::SubmitPrediction {
                match_id,
                home_goals,
                away_goals,
            } => to_json(
                svc.submit_prediction(caller, match_id, home_goals, away_goals)
                    .await?,
            )?,
            Request::UpsertProfile { username } => {
                to_json(svc.upsert_profile(caller, &username).await?)?
            }
            Request::FindProfile { username } => {
                to_json(svc.find_profile_by_username(&username).await?)?
            }
            Request::UpsertRealMatch { real_match } => {
                self.check_result_maintainer(caller)?;
                to_json(svc.upsert_real_match(real_match).await?)?
            }
            Request::RecordFinalScore {
                match_id,
                home_goals,
                away_goals,
            } => {
                self.check_result_maintainer(caller)?;
                to_json(svc.record_final_score(match_id, home_goals, away_goals).await?)?
            }
            Request::RoundFixtures {
                league_id,
                round_no,
            } => to_json(svc.round_fixtures(caller, league_id, round_no).await?)?,
            Request::MyPredictions {
                league_id,
                round_no,
            } => to_json(
                svc.member_predictions_for_round(caller, league_id, round_no)
                    .await?,
            )?,
            Request::Standings { league_id } => to_json(svc.standings(caller, league_id).await?)?,
            Request::MemberSummary { league_id, user_id } => {
                to_json(svc.member_summary(caller, league_id, user_id).await?)?
            }
        };
        Ok(data)
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, DispatchError> {
    Ok(serde_json::to_value(value)?)
}

/// Serve newline-delimited requests until the reader is exhausted.
///
/// Blank lines are skipped. Returns the number of requests handled.
pub async fn serve<S, R, W>(handler: &Handler<S>, reader: R, mut writer: W) -> anyhow::Result<usize>
where
    S: LeagueStore,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handler.handle_line(&line).await;
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        handled += 1;
    }

    Ok(handled)
}
