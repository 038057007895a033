use quiz_core::model::{Mistake, MistakeId, NewMistake, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_mistake_row, ser, u32_from_i64};
use crate::repository::{MistakeRepository, StorageError};

#[async_trait::async_trait]
impl MistakeRepository for SqliteRepository {
    async fn create_mistake(&self, mistake: NewMistake) -> Result<Mistake, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO mistakes (user_id, question_id, chosen, correct, answered_at, reviewed)
                VALUES (?1, ?2, ?3, ?4, ?5, 0)
            ",
        )
        .bind(id_i64("user_id", mistake.user_id.value())?)
        .bind(id_i64("question_id", mistake.question_id.value())?)
        .bind(mistake.chosen.as_str())
        .bind(mistake.correct.as_str())
        .bind(mistake.answered_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(res.last_insert_rowid()).map_err(ser)?;
        Ok(mistake.assign_id(MistakeId::new(id)))
    }

    async fn mark_reviewed(&self, id: MistakeId) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE mistakes SET reviewed = 1 WHERE id = ?1")
            .bind(id_i64("mistake_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn unreviewed_for_user(
        &self,
        user_id: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Mistake>, StorageError> {
        // SQLite treats a negative LIMIT as unbounded.
        let lim = limit.map_or(-1, i64::from);
        let rows = sqlx::query(
            r"
                SELECT id, user_id, question_id, chosen, correct, answered_at, reviewed
                FROM mistakes
                WHERE user_id = ?1 AND reviewed = 0
                ORDER BY answered_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(lim)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_mistake_row).collect()
    }

    async fn reviewed_count(&self, user_id: UserId) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM mistakes WHERE user_id = ?1 AND reviewed = 1",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u32_from_i64("reviewed_count", row.try_get::<i64, _>("n").map_err(ser)?)
    }

    async fn clear_for_user(&self, user_id: UserId) -> Result<u32, StorageError> {
        let res = sqlx::query("UPDATE mistakes SET reviewed = 1 WHERE user_id = ?1 AND reviewed = 0")
            .bind(id_i64("user_id", user_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        u32::try_from(res.rows_affected()).map_err(ser)
    }
}
