use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use quiz_core::model::{
    Achievement, AwardedAchievement, DifficultyFilter, Mistake, MistakeId, NewMistake, Question,
    QuestionId, QuizResult, ReviewCard, ReviewCardId, Streak, Subject, SubjectId, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Read side of the question bank, plus the upserts used by seeding.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the subject cannot be stored.
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Candidate questions of one subject, narrowed by `filter`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn find_questions(
        &self,
        subject_id: SubjectId,
        filter: DifficultyFilter,
    ) -> Result<Vec<Question>, StorageError>;

    /// Every question across all subjects, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn all_questions(&self) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError>;
}

/// Append-only log of finished quizzes.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Persist a result and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the result cannot be stored.
    async fn append_result(&self, result: &QuizResult) -> Result<i64, StorageError>;

    /// Results for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_results(&self, user_id: UserId) -> Result<Vec<QuizResult>, StorageError>;
}

#[async_trait]
pub trait MistakeRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the mistake cannot be stored.
    async fn create_mistake(&self, mistake: NewMistake) -> Result<Mistake, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such mistake exists.
    async fn mark_reviewed(&self, id: MistakeId) -> Result<(), StorageError>;

    /// Unreviewed mistakes for a user, newest first, optionally capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn unreviewed_for_user(
        &self,
        user_id: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Mistake>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn reviewed_count(&self, user_id: UserId) -> Result<u32, StorageError>;

    /// Mark every unreviewed mistake of a user as reviewed; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn clear_for_user(&self, user_id: UserId) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait ReviewCardRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_card(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<ReviewCard>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the card does not exist.
    async fn get_card_by_id(&self, id: ReviewCardId) -> Result<ReviewCard, StorageError>;

    /// Create a fresh card for (user, question), due on `today`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the pair already has a card.
    async fn create_card(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        today: NaiveDate,
    ) -> Result<ReviewCard, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the card was never created.
    async fn save_card(&self, card: &ReviewCard) -> Result<(), StorageError>;

    /// Cards with `next_review_date <= today`, ordered by due date then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn due_for_user(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Vec<ReviewCard>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ReviewCard>, StorageError>;
}

#[async_trait]
pub trait StreakRepository: Send + Sync {
    /// Returns the stored streak, or an empty one for unknown users.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_streak(&self, user_id: UserId) -> Result<Streak, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the streak cannot be stored.
    async fn save_streak(&self, user_id: UserId, streak: &Streak) -> Result<(), StorageError>;
}

#[async_trait]
pub trait AchievementRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn awarded(&self, user_id: UserId) -> Result<Vec<AwardedAchievement>, StorageError>;

    /// Record an achievement. Returns `false` if the user already had it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn award(
        &self,
        user_id: UserId,
        achievement: Achievement,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    subjects: Arc<Mutex<BTreeMap<SubjectId, Subject>>>,
    questions: Arc<Mutex<BTreeMap<QuestionId, Question>>>,
    results: Arc<Mutex<Vec<(UserId, QuizResult)>>>,
    mistakes: Arc<Mutex<Vec<Mistake>>>,
    cards: Arc<Mutex<BTreeMap<ReviewCardId, ReviewCard>>>,
    streaks: Arc<Mutex<HashMap<UserId, Streak>>>,
    achievements: Arc<Mutex<HashMap<UserId, Vec<AwardedAchievement>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        lock(&self.subjects)?.insert(subject.id, subject.clone());
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        Ok(lock(&self.subjects)?.values().cloned().collect())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        if !lock(&self.subjects)?.contains_key(&question.subject_id()) {
            return Err(StorageError::NotFound);
        }
        lock(&self.questions)?.insert(question.id(), question.clone());
        Ok(())
    }

    async fn find_questions(
        &self,
        subject_id: SubjectId,
        filter: DifficultyFilter,
    ) -> Result<Vec<Question>, StorageError> {
        Ok(lock(&self.questions)?
            .values()
            .filter(|q| q.subject_id() == subject_id && filter.matches(q.difficulty()))
            .cloned()
            .collect())
    }

    async fn all_questions(&self) -> Result<Vec<Question>, StorageError> {
        Ok(lock(&self.questions)?.values().cloned().collect())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        lock(&self.questions)?
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(&self, result: &QuizResult) -> Result<i64, StorageError> {
        let mut guard = lock(&self.results)?;
        guard.push((result.user_id(), result.clone()));
        i64::try_from(guard.len()).map_err(|_| StorageError::Serialization("id overflow".into()))
    }

    async fn list_results(&self, user_id: UserId) -> Result<Vec<QuizResult>, StorageError> {
        Ok(lock(&self.results)?
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[async_trait]
impl MistakeRepository for InMemoryRepository {
    async fn create_mistake(&self, mistake: NewMistake) -> Result<Mistake, StorageError> {
        let mut guard = lock(&self.mistakes)?;
        let id = MistakeId::new(guard.len() as u64 + 1);
        let stored = mistake.assign_id(id);
        guard.push(stored.clone());
        Ok(stored)
    }

    async fn mark_reviewed(&self, id: MistakeId) -> Result<(), StorageError> {
        let mut guard = lock(&self.mistakes)?;
        let mistake = guard
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StorageError::NotFound)?;
        mistake.reviewed = true;
        Ok(())
    }

    async fn unreviewed_for_user(
        &self,
        user_id: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Mistake>, StorageError> {
        let guard = lock(&self.mistakes)?;
        let cap = limit.map_or(usize::MAX, |l| l as usize);
        // Ids grow with insertion order, so reverse iteration is newest first.
        Ok(guard
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id && !m.reviewed)
            .take(cap)
            .cloned()
            .collect())
    }

    async fn reviewed_count(&self, user_id: UserId) -> Result<u32, StorageError> {
        let count = lock(&self.mistakes)?
            .iter()
            .filter(|m| m.user_id == user_id && m.reviewed)
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("count overflow".into()))
    }

    async fn clear_for_user(&self, user_id: UserId) -> Result<u32, StorageError> {
        let mut changed = 0_u32;
        for m in lock(&self.mistakes)?
            .iter_mut()
            .filter(|m| m.user_id == user_id && !m.reviewed)
        {
            m.reviewed = true;
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl ReviewCardRepository for InMemoryRepository {
    async fn get_card(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<ReviewCard>, StorageError> {
        Ok(lock(&self.cards)?
            .values()
            .find(|c| c.user_id == user_id && c.question_id == question_id)
            .cloned())
    }

    async fn get_card_by_id(&self, id: ReviewCardId) -> Result<ReviewCard, StorageError> {
        lock(&self.cards)?
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn create_card(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        today: NaiveDate,
    ) -> Result<ReviewCard, StorageError> {
        let mut guard = lock(&self.cards)?;
        if guard
            .values()
            .any(|c| c.user_id == user_id && c.question_id == question_id)
        {
            return Err(StorageError::Conflict);
        }
        let id = ReviewCardId::new(guard.len() as u64 + 1);
        let card = ReviewCard::new(id, user_id, question_id, today);
        guard.insert(id, card.clone());
        Ok(card)
    }

    async fn save_card(&self, card: &ReviewCard) -> Result<(), StorageError> {
        let mut guard = lock(&self.cards)?;
        let slot = guard.get_mut(&card.id).ok_or(StorageError::NotFound)?;
        *slot = card.clone();
        Ok(())
    }

    async fn due_for_user(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Vec<ReviewCard>, StorageError> {
        let mut due: Vec<ReviewCard> = lock(&self.cards)?
            .values()
            .filter(|c| c.user_id == user_id && c.is_due(today))
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.next_review_date, c.id));
        Ok(due)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ReviewCard>, StorageError> {
        Ok(lock(&self.cards)?
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StreakRepository for InMemoryRepository {
    async fn get_streak(&self, user_id: UserId) -> Result<Streak, StorageError> {
        Ok(lock(&self.streaks)?.get(&user_id).cloned().unwrap_or_default())
    }

    async fn save_streak(&self, user_id: UserId, streak: &Streak) -> Result<(), StorageError> {
        lock(&self.streaks)?.insert(user_id, streak.clone());
        Ok(())
    }
}

#[async_trait]
impl AchievementRepository for InMemoryRepository {
    async fn awarded(&self, user_id: UserId) -> Result<Vec<AwardedAchievement>, StorageError> {
        Ok(lock(&self.achievements)?
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn award(
        &self,
        user_id: UserId,
        achievement: Achievement,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = lock(&self.achievements)?;
        let list = guard.entry(user_id).or_default();
        if list.iter().any(|a| a.achievement == achievement) {
            return Ok(false);
        }
        list.push(AwardedAchievement {
            achievement,
            awarded_at: at,
        });
        Ok(true)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub mistakes: Arc<dyn MistakeRepository>,
    pub review_cards: Arc<dyn ReviewCardRepository>,
    pub streaks: Arc<dyn StreakRepository>,
    pub achievements: Arc<dyn AchievementRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every handle to one repository value that implements all contracts.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: QuestionRepository
            + ResultRepository
            + MistakeRepository
            + ReviewCardRepository
            + StreakRepository
            + AchievementRepository
            + Clone
            + 'static,
    {
        Self {
            questions: Arc::new(repo.clone()),
            results: Arc::new(repo.clone()),
            mistakes: Arc::new(repo.clone()),
            review_cards: Arc::new(repo.clone()),
            streaks: Arc::new(repo.clone()),
            achievements: Arc::new(repo),
        }
    }
}
