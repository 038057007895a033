use chrono::NaiveDate;
use quiz_core::model::{QuestionId, ReviewCard, ReviewCardId, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_card_row, ser};
use crate::repository::{ReviewCardRepository, StorageError};

const CARD_COLUMNS: &str = "id, user_id, question_id, easiness_factor, interval_days, \
                            repetitions, next_review_date, last_reviewed_date";

#[async_trait::async_trait]
impl ReviewCardRepository for SqliteRepository {
    async fn get_card(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<ReviewCard>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM review_cards WHERE user_id = ?1 AND question_id = ?2"
        ))
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("question_id", question_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_card_row).transpose()
    }

    async fn get_card_by_id(&self, id: ReviewCardId) -> Result<ReviewCard, StorageError> {
        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM review_cards WHERE id = ?1"))
            .bind(id_i64("card_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_card_row(&row)
    }

    async fn create_card(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        today: NaiveDate,
    ) -> Result<ReviewCard, StorageError> {
        let draft = ReviewCard::new(ReviewCardId::new(0), user_id, question_id, today);
        let res = sqlx::query(
            r"
                INSERT INTO review_cards (
                    user_id, question_id, easiness_factor, interval_days,
                    repetitions, next_review_date, last_reviewed_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("question_id", question_id.value())?)
        .bind(draft.easiness_factor)
        .bind(i64::from(draft.interval_days))
        .bind(i64::from(draft.repetitions))
        .bind(draft.next_review_date)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
            other => conn(other),
        })?;

        let id = u64::try_from(res.last_insert_rowid()).map_err(ser)?;
        Ok(ReviewCard {
            id: ReviewCardId::new(id),
            ..draft
        })
    }

    async fn save_card(&self, card: &ReviewCard) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE review_cards SET
                    easiness_factor = ?2,
                    interval_days = ?3,
                    repetitions = ?4,
                    next_review_date = ?5,
                    last_reviewed_date = ?6
                WHERE id = ?1
            ",
        )
        .bind(id_i64("card_id", card.id.value())?)
        .bind(card.easiness_factor)
        .bind(i64::from(card.interval_days))
        .bind(i64::from(card.repetitions))
        .bind(card.next_review_date)
        .bind(card.last_reviewed_date)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn due_for_user(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Vec<ReviewCard>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM review_cards \
             WHERE user_id = ?1 AND next_review_date <= ?2 \
             ORDER BY next_review_date ASC, id ASC"
        ))
        .bind(id_i64("user_id", user_id.value())?)
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_card_row).collect()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<ReviewCard>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM review_cards WHERE user_id = ?1 ORDER BY id ASC"
        ))
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_card_row).collect()
    }
}
