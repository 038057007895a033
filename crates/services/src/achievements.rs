use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use quiz_core::model::{Achievement, UserId};
use quiz_storage::repository::{
    AchievementRepository, MistakeRepository, QuestionRepository, ResultRepository, Storage,
    StorageError, StreakRepository,
};

/// Decides which achievements a user has newly earned.
#[async_trait]
pub trait AchievementEvaluator: Send + Sync {
    /// Award everything the user qualifies for and has not been awarded yet.
    ///
    /// Returns only the achievements awarded by this call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if reading progress or recording an award fails.
    async fn evaluate(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Achievement>, StorageError>;
}

const TEST_COUNT_RULES: [(usize, Achievement); 4] = [
    (1, Achievement::FirstTest),
    (10, Achievement::TenTests),
    (50, Achievement::FiftyTests),
    (100, Achievement::HundredTests),
];

const STREAK_RULES: [(u32, Achievement); 3] = [
    (3, Achievement::Streak3),
    (7, Achievement::Streak7),
    (30, Achievement::Streak30),
];

const BAND7_PERCENTAGE: f64 = 75.0;
const MOCK_MASTER_PERCENTAGE: f64 = 70.0;
const MISTAKE_FIXER_REVIEWED: u32 = 10;

/// Catalogue rules evaluated against stored results, streaks and mistakes.
#[derive(Clone)]
pub struct RuleBasedAchievements {
    questions: Arc<dyn QuestionRepository>,
    results: Arc<dyn ResultRepository>,
    mistakes: Arc<dyn MistakeRepository>,
    streaks: Arc<dyn StreakRepository>,
    achievements: Arc<dyn AchievementRepository>,
}

impl RuleBasedAchievements {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self {
            questions: Arc::clone(&storage.questions),
            results: Arc::clone(&storage.results),
            mistakes: Arc::clone(&storage.mistakes),
            streaks: Arc::clone(&storage.streaks),
            achievements: Arc::clone(&storage.achievements),
        }
    }

    /// Every achievement the user currently qualifies for, awarded or not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a progress read fails.
    pub async fn qualifying(&self, user_id: UserId) -> Result<Vec<Achievement>, StorageError> {
        let results = self.results.list_results(user_id).await?;
        let streak = self.streaks.get_streak(user_id).await?;
        let reviewed = self.mistakes.reviewed_count(user_id).await?;
        let subjects = self.questions.list_subjects().await?;

        let mut earned = Vec::new();

        for (needed, achievement) in TEST_COUNT_RULES {
            if results.len() >= needed {
                earned.push(achievement);
            }
        }
        if results.iter().any(|r| r.percentage() >= 100.0) {
            earned.push(Achievement::PerfectScore);
        }
        if results.iter().any(|r| r.percentage() >= BAND7_PERCENTAGE) {
            earned.push(Achievement::Band7);
        }
        for (needed, achievement) in STREAK_RULES {
            if streak.current >= needed {
                earned.push(achievement);
            }
        }

        let attempted: HashSet<_> = results.iter().map(|r| r.subject_id()).collect();
        if !subjects.is_empty() && subjects.iter().all(|s| attempted.contains(&s.id)) {
            earned.push(Achievement::AllSections);
        }
        if reviewed >= MISTAKE_FIXER_REVIEWED {
            earned.push(Achievement::MistakeFixer);
        }
        if results
            .iter()
            .any(|r| r.is_mock() && r.percentage() >= MOCK_MASTER_PERCENTAGE)
        {
            earned.push(Achievement::MockMaster);
        }

        Ok(earned)
    }
}

#[async_trait]
impl AchievementEvaluator for RuleBasedAchievements {
    async fn evaluate(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Achievement>, StorageError> {
        let already: HashSet<Achievement> = self
            .achievements
            .awarded(user_id)
            .await?
            .into_iter()
            .map(|a| a.achievement)
            .collect();

        let mut fresh = Vec::new();
        for achievement in self.qualifying(user_id).await? {
            if already.contains(&achievement) {
                continue;
            }
            if self.achievements.award(user_id, achievement, now).await? {
                tracing::info!(user = %user_id, achievement = achievement.key(), "achievement unlocked");
                fresh.push(achievement);
            }
        }
        Ok(fresh)
    }
}
