//! H2H League Core - head-to-head prediction leagues.
//!
//! This crate provides:
//! - Round-robin schedule generation (circle method, single or double legs)
//! - Mapping of league rounds to real-world matchdays
//! - Prediction scoring (exact score / correct outcome)
//! - Head-to-head fixture aggregation with pending results
//! - Standings with case-insensitive tie-breaks, recent form and member summaries
//! - A `LeagueStore` persistence boundary with PostgreSQL and in-memory stores

mod types;

pub mod aggregation;
pub mod config;
pub mod db;
pub mod error;
pub mod join_code;
pub mod mapper;
pub mod models;
pub mod schedule;
pub mod scoring;
pub mod service;
pub mod standings;

pub use aggregation::{FixtureResult, FixtureStatus, H2hOutcome, PendingReason};
pub use config::ScoringRules;
pub use db::{LeagueSnapshot, LeagueStore, MemoryStore, PgStore};
pub use error::{LeagueError, Result};
pub use mapper::RoundMatches;
pub use schedule::{RoundRobinFormat, ScheduledRound};
pub use service::{FixtureView, LeagueService, RoundView};
pub use standings::{MemberSummary, RecentMatch, StandingsRow};
pub use types::*;
