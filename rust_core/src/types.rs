//! Identifier newtypes and score primitives shared across the crate.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::error::{LeagueError, Result};

/// Goal count as stored (INT4). Always validated non-negative before it is stored.
pub type Goals = i32;

/// Prediction points and league points.
pub type Points = u32;

/// League round number, dense from 1.
pub type RoundNo = u32;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// League identity
    LeagueId,
    "League"
);
uuid_id!(
    /// Member identity as resolved by the identity provider
    UserId,
    "User"
);
uuid_id!(
    /// Real-world match identity
    MatchId,
    "Match"
);
uuid_id!(FixtureId, "Fixture");

/// Outcome category of a scoreline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

/// A home/away goal pair. Used both for final results and for predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: Goals,
    pub away: Goals,
}

impl Score {
    /// Build a validated score. Negative goal counts are rejected with the
    /// offending field named.
    pub fn new(home: Goals, away: Goals) -> Result<Self> {
        if home < 0 {
            return Err(LeagueError::validation(
                "home_goals",
                format!("goal count must be non-negative, got {}", home),
            ));
        }
        if away < 0 {
            return Err(LeagueError::validation(
                "away_goals",
                format!("goal count must be non-negative, got {}", away),
            ));
        }
        Ok(Self { home, away })
    }

    /// Outcome category from the sign of (home - away)
    pub fn outcome(&self) -> Outcome {
        match self.home.cmp(&self.away) {
            Ordering::Greater => Outcome::HomeWin,
            Ordering::Equal => Outcome::Draw,
            Ordering::Less => Outcome::AwayWin,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}
