use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use quiz_core::model::{Streak, UserId};
use quiz_storage::repository::{StorageError, StreakRepository};

/// Records daily practice activity after a scored session.
#[async_trait]
pub trait StreakTracker: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the streak cannot be read or saved.
    async fn record_activity(&self, user_id: UserId, today: NaiveDate)
    -> Result<Streak, StorageError>;
}

/// Streak tracking on top of a `StreakRepository`.
#[derive(Clone)]
pub struct StoredStreakTracker {
    streaks: Arc<dyn StreakRepository>,
}

impl StoredStreakTracker {
    #[must_use]
    pub fn new(streaks: Arc<dyn StreakRepository>) -> Self {
        Self { streaks }
    }
}

#[async_trait]
impl StreakTracker for StoredStreakTracker {
    async fn record_activity(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Streak, StorageError> {
        let mut streak = self.streaks.get_streak(user_id).await?;
        streak.record_activity(today);
        self.streaks.save_streak(user_id, &streak).await?;
        tracing::debug!(user = %user_id, current = streak.current, longest = streak.longest, "streak updated");
        Ok(streak)
    }
}
