use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use quiz_core::model::{Achievement, QuestionId, UserId};

/// Out-of-band messages pushed to a user outside the answer/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The answer timer for the outstanding question ran out. Late answers are still accepted.
    TimeUp { question_id: QuestionId },
    AchievementUnlocked(Achievement),
    /// The session was dropped because a question it referenced no longer exists.
    SessionAborted { question_id: QuestionId },
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
}

/// Outbound messaging collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Returns `NotifyError` if delivery failed; callers log and move on.
    async fn send(&self, user_id: UserId, notification: Notification) -> Result<(), NotifyError>;
}

/// Best-effort delivery: failures are logged and swallowed.
pub(crate) async fn notify(notifier: &dyn Notifier, user_id: UserId, notification: Notification) {
    if let Err(err) = notifier.send(user_id, notification).await {
        tracing::warn!(user = %user_id, error = %err, "notification dropped");
    }
}

/// Forwards notifications into a tokio channel (the transport reads the other end).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(UserId, Notification)>,
}

impl ChannelNotifier {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(UserId, Notification)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, user_id: UserId, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send((user_id, notification))
            .map_err(|_| NotifyError::Closed)
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, user_id: UserId, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(user = %user_id, ?notification, "notify");
        Ok(())
    }
}
