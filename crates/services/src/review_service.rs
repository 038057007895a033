use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use quiz_core::model::{Quality, ReviewCard, ReviewCardId, UserId};
use quiz_core::scheduler::{AppliedReview, Scheduler};
use quiz_storage::repository::{
    MistakeRepository, ReviewCardRepository, Storage, StorageError,
};

use crate::error::ReviewServiceError;

//
// ─── DUE SET ───────────────────────────────────────────────────────────────────
//

/// Cards a user should review today, plus what is needed to explain an empty set.
#[derive(Debug, Clone, PartialEq)]
pub struct DueSet {
    /// Due cards ordered by due date, then id.
    pub due: Vec<ReviewCard>,
    /// Every card the user owns, due or not.
    pub total_cards: usize,
    /// Earliest upcoming review among cards that are not due yet.
    pub next_due: Option<NaiveDate>,
}

impl DueSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Applies SM-2 reviews to stored cards and computes due sets.
#[derive(Clone)]
pub struct ReviewService {
    scheduler: Scheduler,
    mistakes: Arc<dyn MistakeRepository>,
    cards: Arc<dyn ReviewCardRepository>,
}

impl ReviewService {
    #[must_use]
    pub fn new(storage: &Storage) -> Self {
        Self {
            scheduler: Scheduler::new(),
            mistakes: Arc::clone(&storage.mistakes),
            cards: Arc::clone(&storage.review_cards),
        }
    }

    /// Create a card, due `today`, for every unreviewed mistake whose question
    /// the user does not track yet. Returns the number of cards created.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Storage` if a repository call fails.
    pub async fn materialize_mistakes(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<usize, ReviewServiceError> {
        let mistakes = self.mistakes.unreviewed_for_user(user_id, None).await?;
        let mut seen = HashSet::new();
        let mut created = 0;

        for mistake in mistakes {
            if !seen.insert(mistake.question_id) {
                continue;
            }
            if self.cards.get_card(user_id, mistake.question_id).await?.is_some() {
                continue;
            }
            match self.cards.create_card(user_id, mistake.question_id, today).await {
                Ok(card) => {
                    tracing::debug!(
                        user = %user_id,
                        question = %mistake.question_id,
                        card = %card.id,
                        "review card created from mistake"
                    );
                    created += 1;
                }
                // Another path tracked the pair between the lookup and the insert.
                Err(StorageError::Conflict) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(created)
    }

    /// Materialize pending mistakes, then collect the cards due on `today`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Storage` if a repository call fails.
    pub async fn due_set(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<DueSet, ReviewServiceError> {
        self.materialize_mistakes(user_id, today).await?;

        let due = self.cards.due_for_user(user_id, today).await?;
        let all = self.cards.list_for_user(user_id).await?;
        let next_due = all
            .iter()
            .filter(|card| !card.is_due(today))
            .map(|card| card.next_review_date)
            .min();

        Ok(DueSet {
            due,
            total_cards: all.len(),
            next_due,
        })
    }

    /// Grade a stored card by answer correctness and persist the updated schedule.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::Storage` (including `NotFound` for an
    /// unknown card) or `ReviewServiceError::Scheduler`.
    pub async fn review_card(
        &self,
        card_id: ReviewCardId,
        correct: bool,
        today: NaiveDate,
    ) -> Result<AppliedReview, ReviewServiceError> {
        let card = self.cards.get_card_by_id(card_id).await?;
        let applied = self
            .scheduler
            .apply_review(&card, Quality::from_correct(correct), today)?;
        self.cards.save_card(&applied.card).await?;

        tracing::debug!(
            card = %card_id,
            passed = applied.passed,
            interval = applied.card.interval_days,
            next = %applied.card.next_review_date,
            "review applied"
        );
        Ok(applied)
    }
}
