use chrono::{DateTime, Utc};
use quiz_core::model::{Achievement, AwardedAchievement, Streak, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser, u32_from_i64};
use crate::repository::{AchievementRepository, StorageError, StreakRepository};

#[async_trait::async_trait]
impl StreakRepository for SqliteRepository {
    async fn get_streak(&self, user_id: UserId) -> Result<Streak, StorageError> {
        let row = sqlx::query(
            r"
                SELECT current_streak, longest_streak, last_active, total_tests
                FROM streaks
                WHERE user_id = ?1
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(Streak::default());
        };

        Ok(Streak {
            current: u32_from_i64("current_streak", row.try_get("current_streak").map_err(ser)?)?,
            longest: u32_from_i64("longest_streak", row.try_get("longest_streak").map_err(ser)?)?,
            last_active: row.try_get("last_active").map_err(ser)?,
            total_tests: u32_from_i64("total_tests", row.try_get("total_tests").map_err(ser)?)?,
        })
    }

    async fn save_streak(&self, user_id: UserId, streak: &Streak) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO streaks (user_id, current_streak, longest_streak, last_active, total_tests)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(user_id) DO UPDATE SET
                    current_streak = excluded.current_streak,
                    longest_streak = excluded.longest_streak,
                    last_active = excluded.last_active,
                    total_tests = excluded.total_tests
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(i64::from(streak.current))
        .bind(i64::from(streak.longest))
        .bind(streak.last_active)
        .bind(i64::from(streak.total_tests))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AchievementRepository for SqliteRepository {
    async fn awarded(&self, user_id: UserId) -> Result<Vec<AwardedAchievement>, StorageError> {
        let rows = sqlx::query(
            "SELECT key, awarded_at FROM achievements WHERE user_id = ?1 ORDER BY awarded_at, key",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("key").map_err(ser)?;
            out.push(AwardedAchievement {
                achievement: key.parse::<Achievement>().map_err(ser)?,
                awarded_at: row.try_get("awarded_at").map_err(ser)?,
            });
        }
        Ok(out)
    }

    async fn award(
        &self,
        user_id: UserId,
        achievement: Achievement,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO achievements (user_id, key, awarded_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, key) DO NOTHING
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(achievement.key())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.rows_affected() == 1)
    }
}
