mod achievement;
mod ids;
mod mistake;
mod question;
mod review;
mod session;
mod streak;

pub use ids::{MistakeId, ParseIdError, QuestionId, ReviewCardId, SubjectId, UserId};

pub use achievement::{Achievement, AwardedAchievement};
pub use mistake::{Mistake, NewMistake};
pub use question::{AnswerOption, Difficulty, DifficultyFilter, Question, QuestionError, Subject};
pub use review::{INITIAL_EASINESS, MIN_EASINESS, Quality, ReviewCard, ReviewError};
pub use session::{QuizResult, QuizResultError, ResultBand, SessionMode, percentage};
pub use streak::Streak;
