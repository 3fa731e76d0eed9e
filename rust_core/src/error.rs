//! Error type for league operations.
//!
//! Pending fixtures and unmapped rounds are not errors; they are reported
//! through `FixtureStatus::Pending` and `RoundMatches::Unmapped`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeagueError {
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, LeagueError>;

impl LeagueError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LeagueError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        LeagueError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LeagueError::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        LeagueError::Forbidden {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind for service responses
    pub fn kind(&self) -> &'static str {
        match self {
            LeagueError::Validation { .. } => "validation",
            LeagueError::NotFound { .. } => "not_found",
            LeagueError::Conflict { .. } => "conflict",
            LeagueError::Forbidden { .. } => "forbidden",
            LeagueError::Storage(_) | LeagueError::Migration(_) => "storage",
        }
    }
}
