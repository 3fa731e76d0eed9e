//! Database retry logic for transient failures
//!
//! Retries with exponential backoff when a storage error is classified as
//! transient: serialization failures, deadlocks, pool timeouts and IO errors.
//! Classification looks at `sqlx::Error` variants and SQLSTATE codes, never
//! at message text.

use std::env;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{LeagueError, Result};

/// SQLSTATE serialization_failure
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE deadlock_detected
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env::var("DB_RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            base_backoff_ms: env::var("DB_RETRY_BASE_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.base_backoff_ms),
            max_backoff_ms: env::var("DB_RETRY_MAX_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_backoff_ms),
        }
    }

    /// Backoff before the retry that follows attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms))
    }
}

/// Execute a database operation with automatic retry on transient failures
///
/// # Example
/// ```ignore
/// let league = execute_with_retry(&self.retry, "get_league", || async {
///     sqlx::query_as::<_, LeagueRow>("SELECT ... FROM leagues WHERE id = $1")
///         .bind(league_id)
///         .fetch_optional(&self.pool)
///         .await
///         .map_err(LeagueError::from)
/// })
/// .await?;
/// ```
pub async fn execute_with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < config.max_attempts && is_retriable_error(&e) => {
                let backoff = config.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Database operation failed: {}. Retrying",
                    e
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Check if a storage error is transient
pub fn is_retriable_error(e: &LeagueError) -> bool {
    let LeagueError::Storage(err) = e else {
        return false;
    };
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    fn io_error() -> LeagueError {
        LeagueError::Storage(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }

    #[test]
    fn test_is_retriable_error() {
        assert!(is_retriable_error(&LeagueError::Storage(sqlx::Error::PoolTimedOut)));
        assert!(is_retriable_error(&io_error()));

        assert!(!is_retriable_error(&LeagueError::Storage(sqlx::Error::RowNotFound)));
        assert!(!is_retriable_error(&LeagueError::conflict("join code taken")));
        assert!(!is_retriable_error(&LeagueError::validation("name", "too short")));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(5), Duration::from_millis(1_000));
        assert_eq!(config.backoff(40), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result = execute_with_retry(&fast(), "test", || {
            let count = attempt_count_clone.clone();
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst) + 1;
                if current < 3 {
                    Err(LeagueError::Storage(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_attempts() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<i32> = execute_with_retry(&fast(), "test", || {
            let count = attempt_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(io_error())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_conflict() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<i32> = execute_with_retry(&fast(), "test", || {
            let count = attempt_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(LeagueError::conflict("schedule already exists"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), "conflict");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
