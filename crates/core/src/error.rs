use thiserror::Error;

use crate::model::{QuestionError, QuizResultError, ReviewError};
use crate::scheduler::SchedulerError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    QuizResult(#[from] QuizResultError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
