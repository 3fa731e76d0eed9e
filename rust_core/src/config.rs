//! Scoring and table configuration.
//!
//! Defaults are the standard rules: 3 points for an exact score, 1 for the
//! right outcome, 3/1/0 league points for a head-to-head win/draw/loss and a
//! five-entry form guide. Every value can be overridden from the environment.

use std::env;

/// Point values and view sizes used by scoring, aggregation and standings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringRules {
    /// Prediction points for an exact scoreline
    pub exact_score_points: u32,
    /// Prediction points for the right outcome with a wrong scoreline
    pub outcome_points: u32,
    /// League points for winning a head-to-head fixture
    pub win_points: u32,
    /// League points for a drawn fixture
    pub draw_points: u32,
    /// League points for losing a fixture
    pub loss_points: u32,
    /// Number of entries in the recent form guide
    pub form_length: usize,
    /// Number of resolved fixtures listed in a member summary
    pub recent_matches: usize,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            exact_score_points: 3,
            outcome_points: 1,
            win_points: 3,
            draw_points: 1,
            loss_points: 0,
            form_length: 5,
            recent_matches: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ScoringRules {
    /// Load rules from environment variables, falling back to the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            exact_score_points: env_or("EXACT_SCORE_POINTS", defaults.exact_score_points),
            outcome_points: env_or("OUTCOME_POINTS", defaults.outcome_points),
            win_points: env_or("WIN_POINTS", defaults.win_points),
            draw_points: env_or("DRAW_POINTS", defaults.draw_points),
            loss_points: env_or("LOSS_POINTS", defaults.loss_points),
            form_length: env_or("FORM_LENGTH", defaults.form_length),
            recent_matches: env_or("RECENT_MATCHES", defaults.recent_matches),
        }
    }

    /// Log current configuration (useful at startup)
    pub fn log_config(&self) {
        tracing::info!(
            exact = self.exact_score_points,
            outcome = self.outcome_points,
            win = self.win_points,
            draw = self.draw_points,
            loss = self.loss_points,
            form_length = self.form_length,
            "Scoring rules loaded"
        );
    }
}
