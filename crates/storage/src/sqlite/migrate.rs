use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS subjects (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            emoji TEXT NOT NULL DEFAULT ''
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            subject_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            option_a TEXT NOT NULL,
            option_b TEXT NOT NULL,
            option_c TEXT NOT NULL,
            option_d TEXT NOT NULL,
            correct TEXT NOT NULL CHECK (correct IN ('a', 'b', 'c', 'd')),
            difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 1 AND 3),
            FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_results (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            score INTEGER NOT NULL CHECK (score >= 0),
            total INTEGER NOT NULL CHECK (total >= score),
            percentage REAL NOT NULL,
            difficulty TEXT NOT NULL,
            is_mock INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT NOT NULL,
            FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS mistakes (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            chosen TEXT NOT NULL,
            correct TEXT NOT NULL,
            answered_at TEXT NOT NULL,
            reviewed INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS review_cards (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            easiness_factor REAL NOT NULL CHECK (easiness_factor >= 1.3),
            interval_days INTEGER NOT NULL CHECK (interval_days >= 1),
            repetitions INTEGER NOT NULL CHECK (repetitions >= 0),
            next_review_date TEXT NOT NULL,
            last_reviewed_date TEXT,
            UNIQUE (user_id, question_id),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS streaks (
            user_id INTEGER PRIMARY KEY,
            current_streak INTEGER NOT NULL DEFAULT 0,
            longest_streak INTEGER NOT NULL DEFAULT 0,
            last_active TEXT,
            total_tests INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS achievements (
            user_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            awarded_at TEXT NOT NULL,
            PRIMARY KEY (user_id, key)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_subject_difficulty
            ON questions (subject_id, difficulty);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_user_results_user_completed
            ON user_results (user_id, completed_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_mistakes_user_reviewed
            ON mistakes (user_id, reviewed, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_review_cards_user_due
            ON review_cards (user_id, next_review_date);
    ",
];

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates the question bank, results, mistakes, review cards,
/// streaks and achievements tables with their indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
