use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{MistakeId, QuestionId, UserId};
use crate::model::question::AnswerOption;

/// A wrong answer given by a user, kept until the user corrects it in review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mistake {
    pub id: MistakeId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub chosen: AnswerOption,
    pub correct: AnswerOption,
    pub answered_at: DateTime<Utc>,
    pub reviewed: bool,
}

/// Fields needed to record a new mistake; storage assigns the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewMistake {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub chosen: AnswerOption,
    pub correct: AnswerOption,
    pub answered_at: DateTime<Utc>,
}

impl NewMistake {
    #[must_use]
    pub fn assign_id(self, id: MistakeId) -> Mistake {
        Mistake {
            id,
            user_id: self.user_id,
            question_id: self.question_id,
            chosen: self.chosen,
            correct: self.correct,
            answered_at: self.answered_at,
            reviewed: false,
        }
    }
}
