use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::model::{MIN_EASINESS, Quality, ReviewCard};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SchedulerError {
    #[error("easiness factor must be finite, got {provided}")]
    InvalidEasiness { provided: f64 },
    #[error("interval of {days} days overflows the calendar")]
    DateOverflow { days: u32 },
}

//
// ─── APPLIED REVIEW ────────────────────────────────────────────────────────────
//

/// Outcome of applying one SM-2 step: the updated card and whether it was a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReview {
    pub card: ReviewCard,
    pub passed: bool,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// SuperMemo-2 scheduler.
///
/// Pure: takes the current card state, a recall quality and today's date and
/// returns the next state. Never touches storage.
///
/// # Examples
///
/// ```
/// # use quiz_core::scheduler::Scheduler;
/// # use quiz_core::model::{Quality, QuestionId, ReviewCard, ReviewCardId, UserId};
/// let today = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let card = ReviewCard::new(ReviewCardId::new(1), UserId::new(1), QuestionId::new(1), today);
///
/// let applied = Scheduler::new().apply_review(&card, Quality::PASS, today)?;
/// assert_eq!(applied.card.interval_days, 1);
/// assert_eq!(applied.card.repetitions, 1);
/// # Ok::<(), quiz_core::scheduler::SchedulerError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Apply one review to `card`.
    ///
    /// - quality >= 3: interval 1, then 6, then `round(interval * ef)`; repetitions += 1
    /// - quality < 3: repetitions = 0, interval = 1
    /// - easiness is recomputed on every review and floored at 1.3
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidEasiness` for a non-finite easiness factor
    /// and `SchedulerError::DateOverflow` if the next review date is unrepresentable.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn apply_review(
        &self,
        card: &ReviewCard,
        quality: Quality,
        today: NaiveDate,
    ) -> Result<AppliedReview, SchedulerError> {
        if !card.easiness_factor.is_finite() {
            return Err(SchedulerError::InvalidEasiness {
                provided: card.easiness_factor,
            });
        }

        let mut next = card.clone();
        let passed = quality.is_success();

        if passed {
            next.interval_days = match card.repetitions {
                0 => 1,
                1 => 6,
                _ => {
                    let grown = (f64::from(card.interval_days) * card.easiness_factor).round();
                    if grown >= f64::from(u32::MAX) {
                        u32::MAX
                    } else {
                        (grown as u32).max(1)
                    }
                }
            };
            next.repetitions = card.repetitions.saturating_add(1);
        } else {
            next.repetitions = 0;
            next.interval_days = 1;
        }

        next.easiness_factor = Self::next_easiness(card.easiness_factor, quality);
        next.last_reviewed_date = Some(today);
        next.next_review_date = today
            .checked_add_days(Days::new(u64::from(next.interval_days)))
            .ok_or(SchedulerError::DateOverflow {
                days: next.interval_days,
            })?;

        Ok(AppliedReview { card: next, passed })
    }

    /// `max(1.3, ef + 0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`
    #[must_use]
    pub fn next_easiness(easiness_factor: f64, quality: Quality) -> f64 {
        let miss = 5.0 - f64::from(quality.value());
        (easiness_factor + 0.1 - miss * (0.08 + miss * 0.02)).max(MIN_EASINESS)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
