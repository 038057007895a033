//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QuestionId, QuizResultError, SessionMode};
use quiz_core::scheduler::SchedulerError;
use quiz_storage::repository::StorageError;

/// Errors emitted by `ReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewServiceError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the session engine.
///
/// All of these are recovered at the engine boundary and surfaced to the user;
/// none of them is fatal to the process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no active session for this answer")]
    NoActiveSession,
    #[error("question {question_id} was already answered")]
    DuplicateAnswer { question_id: QuestionId },
    #[error("question {question_id} is not the current question ({expected})")]
    OutOfOrder {
        question_id: QuestionId,
        expected: QuestionId,
    },
    #[error("not enough questions: {available} available, {required} required")]
    InsufficientQuestions { available: usize, required: usize },
    #[error("{mode} sessions need a subject")]
    SubjectRequired { mode: SessionMode },
    #[error("question {0} does not exist")]
    UnknownQuestion(QuestionId),
    #[error(transparent)]
    Result(#[from] QuizResultError),
    #[error(transparent)]
    Review(#[from] ReviewServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
