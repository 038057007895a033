use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, ReviewCardId, UserId};

/// Easiness factor assigned to freshly created cards.
pub const INITIAL_EASINESS: f64 = 2.5;

/// Lower bound for the SM-2 easiness factor.
pub const MIN_EASINESS: f64 = 1.3;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur during review operations.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ReviewError {
    #[error("invalid review quality value: {0} (expected 0-5)")]
    InvalidQuality(u8),

    #[error("invalid persisted review card: {0}")]
    InvalidPersistedState(String),
}

//
// ─── QUALITY ──────────────────────────────────────────────────────────────────
//

/// SM-2 recall quality on the 0-5 scale.
///
/// Answers in this system are binary, so only [`Quality::PASS`] (4) and
/// [`Quality::FAIL`] (1) are produced by the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quality(u8);

impl Quality {
    pub const PASS: Quality = Quality(4);
    pub const FAIL: Quality = Quality(1);

    /// # Errors
    ///
    /// Returns `ReviewError::InvalidQuality` if the value is above 5.
    pub fn new(value: u8) -> Result<Self, ReviewError> {
        if value > 5 {
            return Err(ReviewError::InvalidQuality(value));
        }
        Ok(Self(value))
    }

    /// Map a correct/incorrect answer onto the coarse quality scale.
    #[must_use]
    pub fn from_correct(correct: bool) -> Self {
        if correct { Self::PASS } else { Self::FAIL }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Quality 3 and above counts as successful recall.
    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 >= 3
    }
}

//
// ─── REVIEW CARD ──────────────────────────────────────────────────────────────
//

/// Spaced-repetition state for one (user, question) pair.
///
/// Cards are created the first time a mistake on the question needs to be
/// scheduled and are only mutated by the SM-2 update. They are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCard {
    pub id: ReviewCardId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub next_review_date: NaiveDate,
    pub last_reviewed_date: Option<NaiveDate>,
}

impl ReviewCard {
    /// A brand-new card, immediately due on `today`.
    #[must_use]
    pub fn new(id: ReviewCardId, user_id: UserId, question_id: QuestionId, today: NaiveDate) -> Self {
        Self {
            id,
            user_id,
            question_id,
            easiness_factor: INITIAL_EASINESS,
            interval_days: 1,
            repetitions: 0,
            next_review_date: today,
            last_reviewed_date: None,
        }
    }

    /// Rehydrate a card from storage, enforcing the interval and easiness floors.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidPersistedState` when stored values break invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ReviewCardId,
        user_id: UserId,
        question_id: QuestionId,
        easiness_factor: f64,
        interval_days: u32,
        repetitions: u32,
        next_review_date: NaiveDate,
        last_reviewed_date: Option<NaiveDate>,
    ) -> Result<Self, ReviewError> {
        if !easiness_factor.is_finite() || easiness_factor < MIN_EASINESS {
            return Err(ReviewError::InvalidPersistedState(format!(
                "easiness factor {easiness_factor} below {MIN_EASINESS}"
            )));
        }
        if interval_days == 0 {
            return Err(ReviewError::InvalidPersistedState(
                "interval must be at least one day".into(),
            ));
        }

        Ok(Self {
            id,
            user_id,
            question_id,
            easiness_factor,
            interval_days,
            repetitions,
            next_review_date,
            last_reviewed_date,
        })
    }

    #[must_use]
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review_date <= today
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
