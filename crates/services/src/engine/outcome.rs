use std::time::Duration;

use chrono::NaiveDate;

use quiz_core::model::{
    Achievement, AnswerOption, Question, QuestionId, QuizResult, ResultBand, SessionMode, Streak,
};

/// A question as presented to the user, with its position in the session.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPrompt {
    pub question: Question,
    /// Zero-based position in the session.
    pub index: usize,
    pub total: usize,
    pub mode: SessionMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        mode: SessionMode,
        total: usize,
        first: QuestionPrompt,
    },
    /// Mistake review requested with no unreviewed mistakes.
    NothingToReview,
    /// Spaced review requested with nothing due today.
    NothingDue {
        next_due: Option<NaiveDate>,
        total_cards: usize,
    },
}

/// Per-answer feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerFeedback {
    pub question_id: QuestionId,
    pub chosen: AnswerOption,
    pub correct: AnswerOption,
    pub is_correct: bool,
    /// Time taken, speed rounds only.
    pub elapsed: Option<Duration>,
    /// Rescheduled review date, spaced review only.
    pub next_review: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Next {
        feedback: AnswerFeedback,
        next: QuestionPrompt,
        score: u32,
    },
    Finished {
        feedback: AnswerFeedback,
        report: SessionReport,
    },
}

impl AnswerOutcome {
    #[must_use]
    pub fn feedback(&self) -> &AnswerFeedback {
        match self {
            Self::Next { feedback, .. } | Self::Finished { feedback, .. } => feedback,
        }
    }
}

/// How fast a speed round was, by average seconds per question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedRating {
    Lightning,
    Fast,
    Good,
    Slow,
}

impl SpeedRating {
    #[must_use]
    pub fn from_average(average_secs: f64) -> Self {
        if average_secs < 5.0 {
            Self::Lightning
        } else if average_secs < 10.0 {
            Self::Fast
        } else if average_secs < 20.0 {
            Self::Good
        } else {
            Self::Slow
        }
    }
}

/// Summary produced when a session finalizes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionReport {
    /// Standard quiz or mock exam.
    Quiz {
        result: QuizResult,
        band: ResultBand,
        /// `false` when the result row could not be written.
        saved: bool,
        new_achievements: Vec<Achievement>,
        streak: Option<Streak>,
    },
    Speed {
        correct: u32,
        total: u32,
        total_secs: f64,
        average_secs: f64,
        rating: SpeedRating,
    },
    MistakeReview {
        corrected: u32,
        total: u32,
    },
    SpacedReview {
        remembered: u32,
        total: u32,
    },
}

/// What happened when an answer timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The question was still outstanding and the user was told time is up.
    Notified,
    /// The question was already answered or the session moved on.
    Stale,
}

/// Reply to one `QuizEvent`, mirroring its variant.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReply {
    Started(StartOutcome),
    Answered(AnswerOutcome),
    Expired(ExpiryOutcome),
}
