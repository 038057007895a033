use quiz_core::model::{QuestionId, SessionMode};

use super::Session;
use crate::error::SessionError;

/// Order in which modes claim an inbound answer. First match wins.
pub const ROUTE_PRIORITY: [SessionMode; 5] = [
    SessionMode::SpacedReview,
    SessionMode::Speed,
    SessionMode::MistakeReview,
    SessionMode::Standard,
    SessionMode::Mock,
];

/// Resolve which session owns an answer for `question_id`.
///
/// Walks [`ROUTE_PRIORITY`]; for each mode, the first session of that mode
/// whose question list references `question_id` claims the event. The claimed
/// session must then accept the question (not yet answered and outstanding).
///
/// # Errors
///
/// `NoActiveSession` when nothing references the question; otherwise the
/// claimed session's `DuplicateAnswer` or `OutOfOrder`.
pub fn route<'a>(
    sessions: &[&'a Session],
    question_id: QuestionId,
) -> Result<&'a Session, SessionError> {
    let owner = ROUTE_PRIORITY.iter().find_map(|mode| {
        sessions
            .iter()
            .copied()
            .find(|s| s.mode() == *mode && s.references(question_id))
    });

    let Some(session) = owner else {
        return Err(SessionError::NoActiveSession);
    };
    session.ensure_answerable(question_id)?;
    Ok(session)
}
