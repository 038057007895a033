use quiz_core::model::{
    AnswerOption, Difficulty, DifficultyFilter, Mistake, MistakeId, Question, QuestionId,
    QuizResult, ReviewCard, ReviewCardId, SubjectId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    u64_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_option(row: &SqliteRow, field: &'static str) -> Result<AnswerOption, StorageError> {
    row.try_get::<String, _>(field)
        .map_err(ser)?
        .parse()
        .map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let level = u8::try_from(row.try_get::<i64, _>("difficulty").map_err(ser)?).map_err(ser)?;

    Question::new(
        QuestionId::new(get_u64(row, "id")?),
        SubjectId::new(get_u64(row, "subject_id")?),
        row.try_get::<String, _>("text").map_err(ser)?,
        [
            row.try_get("option_a").map_err(ser)?,
            row.try_get("option_b").map_err(ser)?,
            row.try_get("option_c").map_err(ser)?,
            row.try_get("option_d").map_err(ser)?,
        ],
        get_option(row, "correct")?,
        Difficulty::from_level(level).map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_result_row(row: &SqliteRow) -> Result<QuizResult, StorageError> {
    let difficulty: DifficultyFilter = row
        .try_get::<String, _>("difficulty")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;

    QuizResult::new(
        UserId::new(get_u64(row, "user_id")?),
        SubjectId::new(get_u64(row, "subject_id")?),
        get_u32(row, "score")?,
        get_u32(row, "total")?,
        difficulty,
        row.try_get("is_mock").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_mistake_row(row: &SqliteRow) -> Result<Mistake, StorageError> {
    Ok(Mistake {
        id: MistakeId::new(get_u64(row, "id")?),
        user_id: UserId::new(get_u64(row, "user_id")?),
        question_id: QuestionId::new(get_u64(row, "question_id")?),
        chosen: get_option(row, "chosen")?,
        correct: get_option(row, "correct")?,
        answered_at: row.try_get("answered_at").map_err(ser)?,
        reviewed: row.try_get("reviewed").map_err(ser)?,
    })
}

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<ReviewCard, StorageError> {
    ReviewCard::from_persisted(
        ReviewCardId::new(get_u64(row, "id")?),
        UserId::new(get_u64(row, "user_id")?),
        QuestionId::new(get_u64(row, "question_id")?),
        row.try_get("easiness_factor").map_err(ser)?,
        get_u32(row, "interval_days")?,
        get_u32(row, "repetitions")?,
        row.try_get("next_review_date").map_err(ser)?,
        row.try_get("last_reviewed_date").map_err(ser)?,
    )
    .map_err(ser)
}
