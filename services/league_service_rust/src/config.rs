use anyhow::{Context, Result};
use h2h_league_core::UserId;
use std::env;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
    /// Callers allowed to write real matches and final scores
    pub result_maintainers: Vec<UserId>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            run_migrations: env::var("RUN_MIGRATIONS")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            result_maintainers: parse_user_ids(&env::var("RESULT_MAINTAINERS").unwrap_or_default())
                .context("RESULT_MAINTAINERS must be a comma-separated list of user ids")?,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_user_ids(value: &str) -> Result<Vec<UserId>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map(UserId::from)
                .with_context(|| format!("invalid user id {:?}", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_parse_user_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = parse_user_ids(&format!(" {a}, ,{b} ")).unwrap();
        assert_eq!(ids, vec![UserId(a), UserId(b)]);

        assert!(parse_user_ids("").unwrap().is_empty());
        assert!(parse_user_ids("not-a-uuid").is_err());
    }
}
