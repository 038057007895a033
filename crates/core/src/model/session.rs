use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{DifficultyFilter, SubjectId, UserId};

//
// ─── SESSION MODE ──────────────────────────────────────────────────────────────
//

/// The five interaction kinds a session can run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Standard,
    Mock,
    Speed,
    MistakeReview,
    SpacedReview,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Mock => "mock",
            Self::Speed => "speed",
            Self::MistakeReview => "mistake_review",
            Self::SpacedReview => "spaced_review",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── QUIZ RESULT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizResultError {
    #[error("score ({score}) exceeds total ({total})")]
    ScoreExceedsTotal { score: u32, total: u32 },
}

/// Aggregate outcome of a completed standard or mock quiz. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    user_id: UserId,
    subject_id: SubjectId,
    score: u32,
    total: u32,
    percentage: f64,
    difficulty: DifficultyFilter,
    is_mock: bool,
    completed_at: DateTime<Utc>,
}

impl QuizResult {
    /// Build a result, deriving the percentage from score and total.
    ///
    /// # Errors
    ///
    /// Returns `QuizResultError::ScoreExceedsTotal` if `score > total`.
    pub fn new(
        user_id: UserId,
        subject_id: SubjectId,
        score: u32,
        total: u32,
        difficulty: DifficultyFilter,
        is_mock: bool,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, QuizResultError> {
        if score > total {
            return Err(QuizResultError::ScoreExceedsTotal { score, total });
        }

        Ok(Self {
            user_id,
            subject_id,
            score,
            total,
            percentage: percentage(score, total),
            difficulty,
            is_mock,
            completed_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    #[must_use]
    pub fn difficulty(&self) -> DifficultyFilter {
        self.difficulty
    }

    #[must_use]
    pub fn is_mock(&self) -> bool {
        self.is_mock
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn band(&self) -> ResultBand {
        ResultBand::from_percentage(self.percentage)
    }
}

/// `score / total * 100`, or 0 for an empty quiz.
#[must_use]
pub fn percentage(score: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(score) / f64::from(total) * 100.0
}

//
// ─── RESULT BAND ───────────────────────────────────────────────────────────────
//

/// Coarse grading band reported with a finished quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultBand {
    Excellent,
    Good,
    Average,
    NeedsPractice,
    NeedsPreparation,
}

impl ResultBand {
    #[must_use]
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Self::Excellent
        } else if percentage >= 75.0 {
            Self::Good
        } else if percentage >= 60.0 {
            Self::Average
        } else if percentage >= 40.0 {
            Self::NeedsPractice
        } else {
            Self::NeedsPreparation
        }
    }

    /// Estimated exam band range for this grade.
    #[must_use]
    pub fn band_range(self) -> &'static str {
        match self {
            Self::Excellent => "8.0-9.0",
            Self::Good => "6.5-7.5",
            Self::Average => "5.5-6.0",
            Self::NeedsPractice => "4.5-5.0",
            Self::NeedsPreparation => "3.0-4.0",
        }
    }
}
