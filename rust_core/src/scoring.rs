//! Prediction scoring.
//!
//! Rules, evaluated in order:
//! 1. no prediction -> 0
//! 2. exact scoreline -> `exact_score_points` (3)
//! 3. right outcome (home win / draw / away win) -> `outcome_points` (1)
//! 4. otherwise -> 0
//!
//! Unplayed matches are not scored at all; `score_match` returns `None` for
//! them rather than zero.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::ScoringRules;
use crate::models::{Prediction, RealMatch};
use crate::types::{MatchId, Points, Score, UserId};

/// How a prediction compares to the final result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionGrade {
    Missing,
    Exact,
    Outcome,
    Miss,
}

impl PredictionGrade {
    pub fn points(&self, rules: &ScoringRules) -> Points {
        match self {
            PredictionGrade::Exact => rules.exact_score_points,
            PredictionGrade::Outcome => rules.outcome_points,
            PredictionGrade::Missing | PredictionGrade::Miss => 0,
        }
    }
}

/// Grade a prediction against a final score
pub fn grade(actual: Score, predicted: Option<Score>) -> PredictionGrade {
    match predicted {
        None => PredictionGrade::Missing,
        Some(p) if p == actual => PredictionGrade::Exact,
        Some(p) if p.outcome() == actual.outcome() => PredictionGrade::Outcome,
        Some(_) => PredictionGrade::Miss,
    }
}

/// Points for a prediction against a final score
pub fn score_prediction(actual: Score, predicted: Option<Score>, rules: &ScoringRules) -> Points {
    grade(actual, predicted).points(rules)
}

/// Points for a prediction on a real match; `None` while the match is unplayed
pub fn score_match(
    m: &RealMatch,
    predicted: Option<Score>,
    rules: &ScoringRules,
) -> Option<Points> {
    m.final_score
        .map(|actual| score_prediction(actual, predicted, rules))
}

/// Lookup of predicted scores by (member, match)
#[derive(Debug, Clone, Default)]
pub struct PredictionIndex {
    by_key: FxHashMap<(UserId, MatchId), Score>,
}

impl PredictionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: UserId, match_id: MatchId, predicted: Score) {
        self.by_key.insert((user, match_id), predicted);
    }

    pub fn get(&self, user: UserId, match_id: MatchId) -> Option<Score> {
        self.by_key.get(&(user, match_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl<'a> FromIterator<&'a Prediction> for PredictionIndex {
    fn from_iter<T: IntoIterator<Item = &'a Prediction>>(iter: T) -> Self {
        let mut index = Self::new();
        for p in iter {
            index.insert(p.user_id, p.match_id, p.predicted);
        }
        index
    }
}

/// A member's prediction points over a set of matches.
///
/// `complete` is false when at least one match is still unplayed; the total
/// then only covers the played matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRoundTotal {
    pub points: Points,
    pub scored_matches: usize,
    pub complete: bool,
}

/// Sum a member's prediction points over the given matches
pub fn member_total(
    user: UserId,
    matches: &[RealMatch],
    predictions: &PredictionIndex,
    rules: &ScoringRules,
) -> MemberRoundTotal {
    let mut points = 0;
    let mut scored_matches = 0;
    let mut complete = true;

    for m in matches {
        match score_match(m, predictions.get(user, m.id), rules) {
            Some(p) => {
                points += p;
                scored_matches += 1;
            }
            None => complete = false,
        }
    }

    MemberRoundTotal {
        points,
        scored_matches,
        complete,
    }
}
