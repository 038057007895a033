use quiz_core::model::{AnswerOption, DifficultyFilter, QuestionId, SessionMode, SubjectId, UserId};
use tokio::sync::mpsc;

/// Request to open a session. `subject_id` is required for standard and mock quizzes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    pub user_id: UserId,
    pub mode: SessionMode,
    pub subject_id: Option<SubjectId>,
    pub difficulty: DifficultyFilter,
}

/// "User selected option X for question Y."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRequest {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub chosen: AnswerOption,
}

/// Everything the engine reacts to, on a single stream.
///
/// Timer expirations travel the same path as answers so a late answer and a
/// firing timer for the same user are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizEvent {
    Start(StartRequest),
    Answer(AnswerRequest),
    /// Timer `generation` ran out on `question_id`.
    Expired {
        user_id: UserId,
        question_id: QuestionId,
        generation: u64,
    },
}

impl QuizEvent {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        match self {
            Self::Start(req) => req.user_id,
            Self::Answer(req) => req.user_id,
            Self::Expired { user_id, .. } => *user_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<QuizEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<QuizEvent>;

/// Create the inbound event stream shared by transports and the timeout manager.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
