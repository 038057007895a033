use quiz_core::model::{DifficultyFilter, Question, QuestionId, Subject, SubjectId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_question_row, ser};
use crate::repository::{QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str =
    "id, subject_id, text, option_a, option_b, option_c, option_d, correct, difficulty";

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO subjects (id, name, emoji)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                emoji = excluded.emoji
            ",
        )
        .bind(id_i64("subject_id", subject.id.value())?)
        .bind(subject.name.clone())
        .bind(subject.emoji.clone())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        let rows = sqlx::query("SELECT id, name, emoji FROM subjects ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut subjects = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let id = u64::try_from(id).map_err(ser)?;
            subjects.push(
                Subject::new(
                    SubjectId::new(id),
                    row.try_get::<String, _>("name").map_err(ser)?,
                    row.try_get::<String, _>("emoji").map_err(ser)?,
                )
                .map_err(ser)?,
            );
        }
        Ok(subjects)
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let [a, b, c, d] = question.options();
        sqlx::query(
            r"
            INSERT INTO questions (
                id, subject_id, text, option_a, option_b, option_c, option_d, correct, difficulty
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                subject_id = excluded.subject_id,
                text = excluded.text,
                option_a = excluded.option_a,
                option_b = excluded.option_b,
                option_c = excluded.option_c,
                option_d = excluded.option_d,
                correct = excluded.correct,
                difficulty = excluded.difficulty
            ",
        )
        .bind(id_i64("question_id", question.id().value())?)
        .bind(id_i64("subject_id", question.subject_id().value())?)
        .bind(question.text().to_owned())
        .bind(a.clone())
        .bind(b.clone())
        .bind(c.clone())
        .bind(d.clone())
        .bind(question.correct().as_str())
        .bind(i64::from(question.difficulty().level()))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::NotFound,
            other => conn(other),
        })?;
        Ok(())
    }

    async fn find_questions(
        &self,
        subject_id: SubjectId,
        filter: DifficultyFilter,
    ) -> Result<Vec<Question>, StorageError> {
        let subject = id_i64("subject_id", subject_id.value())?;
        let rows = match filter.difficulty() {
            None => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions WHERE subject_id = ?1 ORDER BY id"
                ))
                .bind(subject)
                .fetch_all(&self.pool)
                .await
            }
            Some(difficulty) => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions \
                     WHERE subject_id = ?1 AND difficulty = ?2 ORDER BY id"
                ))
                .bind(subject)
                .bind(i64::from(difficulty.level()))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }

    async fn all_questions(&self) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {QUESTION_COLUMNS} FROM questions ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_question_row).collect()
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"
        ))
        .bind(id_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        map_question_row(&row)
    }
}
