//! In-memory session state, the per-user session store and answer routing.

mod router;
mod store;

pub use router::{ROUTE_PRIORITY, route};
pub use store::{InMemorySessionStore, SessionSlot, SessionStore, SlotLease};

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use quiz_core::model::{
    DifficultyFilter, MistakeId, QuestionId, ReviewCardId, SessionMode, SubjectId, UserId,
};

use crate::error::SessionError;

//
// ─── SESSION KIND ──────────────────────────────────────────────────────────────
//

/// Mode-specific session state.
///
/// Parallel lists (`mistakes`, `card_ids`) are indexed like the session's
/// question list.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionKind {
    Standard {
        subject_id: SubjectId,
        difficulty: DifficultyFilter,
    },
    Mock {
        subject_id: SubjectId,
    },
    Speed {
        elapsed: Vec<Duration>,
    },
    MistakeReview {
        mistakes: Vec<Vec<MistakeId>>,
    },
    SpacedReview {
        card_ids: Vec<ReviewCardId>,
    },
}

impl SessionKind {
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        match self {
            Self::Standard { .. } => SessionMode::Standard,
            Self::Mock { .. } => SessionMode::Mock,
            Self::Speed { .. } => SessionMode::Speed,
            Self::MistakeReview { .. } => SessionMode::MistakeReview,
            Self::SpacedReview { .. } => SessionMode::SpacedReview,
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One user's in-progress practice interaction.
///
/// The question order is fixed at creation; `current_index` only moves forward
/// and each question can be scored once.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    kind: SessionKind,
    question_ids: Vec<QuestionId>,
    current_index: usize,
    score: u32,
    answered: HashSet<QuestionId>,
    started_at: DateTime<Utc>,
    question_started: Instant,
    timer: Option<u64>,
}

impl Session {
    fn build(
        user_id: UserId,
        kind: SessionKind,
        question_ids: Vec<QuestionId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            kind,
            question_ids,
            current_index: 0,
            score: 0,
            answered: HashSet::new(),
            started_at,
            question_started: Instant::now(),
            timer: None,
        }
    }

    #[must_use]
    pub fn standard(
        user_id: UserId,
        subject_id: SubjectId,
        difficulty: DifficultyFilter,
        question_ids: Vec<QuestionId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::build(
            user_id,
            SessionKind::Standard {
                subject_id,
                difficulty,
            },
            question_ids,
            started_at,
        )
    }

    #[must_use]
    pub fn mock(
        user_id: UserId,
        subject_id: SubjectId,
        question_ids: Vec<QuestionId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::build(user_id, SessionKind::Mock { subject_id }, question_ids, started_at)
    }

    #[must_use]
    pub fn speed(user_id: UserId, question_ids: Vec<QuestionId>, started_at: DateTime<Utc>) -> Self {
        let elapsed = Vec::with_capacity(question_ids.len());
        Self::build(user_id, SessionKind::Speed { elapsed }, question_ids, started_at)
    }

    /// Review session over `(question, originating mistakes)` pairs.
    #[must_use]
    pub fn mistake_review(
        user_id: UserId,
        items: Vec<(QuestionId, Vec<MistakeId>)>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let (question_ids, mistakes) = items.into_iter().unzip();
        Self::build(
            user_id,
            SessionKind::MistakeReview { mistakes },
            question_ids,
            started_at,
        )
    }

    /// Review session over `(question, review card)` pairs.
    #[must_use]
    pub fn spaced_review(
        user_id: UserId,
        items: Vec<(QuestionId, ReviewCardId)>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let (question_ids, card_ids) = items.into_iter().unzip();
        Self::build(
            user_id,
            SessionKind::SpacedReview { card_ids },
            question_ids,
            started_at,
        )
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.kind.mode()
    }

    #[must_use]
    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut SessionKind {
        &mut self.kind
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.question_ids.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current_index >= self.question_ids.len()
    }

    /// The outstanding question, if any.
    #[must_use]
    pub fn current_question(&self) -> Option<QuestionId> {
        self.question_ids.get(self.current_index).copied()
    }

    #[must_use]
    pub fn references(&self, question_id: QuestionId) -> bool {
        self.question_ids.contains(&question_id)
    }

    #[must_use]
    pub fn is_answered(&self, question_id: QuestionId) -> bool {
        self.answered.contains(&question_id)
    }

    /// Time spent on the outstanding question so far.
    #[must_use]
    pub fn question_elapsed(&self) -> Duration {
        self.question_started.elapsed()
    }

    pub(crate) fn restart_question_clock(&mut self) {
        self.question_started = Instant::now();
    }

    /// Generation of the answer timer armed for the outstanding question.
    #[must_use]
    pub fn timer_generation(&self) -> Option<u64> {
        self.timer
    }

    pub(crate) fn arm_timer(&mut self, generation: u64) {
        self.timer = Some(generation);
    }

    /// Whether an expiry for `question_id` from timer `generation` belongs
    /// to the outstanding question.
    #[must_use]
    pub fn is_expiry_current(&self, question_id: QuestionId, generation: u64) -> bool {
        self.current_question() == Some(question_id) && self.timer == Some(generation)
    }

    /// Check that `question_id` can be answered now.
    ///
    /// # Errors
    ///
    /// `DuplicateAnswer` for an already scored question, `OutOfOrder` for any
    /// question other than the outstanding one.
    pub fn ensure_answerable(&self, question_id: QuestionId) -> Result<(), SessionError> {
        if self.is_answered(question_id) {
            return Err(SessionError::DuplicateAnswer { question_id });
        }
        match self.current_question() {
            Some(expected) if expected == question_id => Ok(()),
            Some(expected) => Err(SessionError::OutOfOrder {
                question_id,
                expected,
            }),
            None => Err(SessionError::NoActiveSession),
        }
    }

    /// Score the outstanding question and advance the cursor.
    ///
    /// Returns the index of the question that was scored.
    pub(crate) fn record_answer(
        &mut self,
        question_id: QuestionId,
        correct: bool,
    ) -> Result<usize, SessionError> {
        self.ensure_answerable(question_id)?;
        let position = self.current_index;
        self.answered.insert(question_id);
        if correct {
            self.score += 1;
        }
        self.current_index += 1;
        Ok(position)
    }
}
