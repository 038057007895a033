use quiz_core::model::{QuizResult, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_result_row};
use crate::repository::{ResultRepository, StorageError};

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(&self, result: &QuizResult) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_results (
                    user_id, subject_id, score, total, percentage,
                    difficulty, is_mock, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id_i64("user_id", result.user_id().value())?)
        .bind(id_i64("subject_id", result.subject_id().value())?)
        .bind(i64::from(result.score()))
        .bind(i64::from(result.total()))
        .bind(result.percentage())
        .bind(result.difficulty().as_str())
        .bind(result.is_mock())
        .bind(result.completed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn list_results(&self, user_id: UserId) -> Result<Vec<QuizResult>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT user_id, subject_id, score, total, difficulty, is_mock, completed_at
                FROM user_results
                WHERE user_id = ?1
                ORDER BY completed_at ASC, id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_result_row).collect()
    }
}
