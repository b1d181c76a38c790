use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::Database;
use crate::errors::AppResult;
use crate::models::*;
use crate::utils::time::xmltv_timestamp;

impl Database {
    /// Insert a guide entry; `false` when (start, stop, channel) already exists
    pub async fn insert_program(&self, program: &NewProgram) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO programs (start, stop, channel, title, description)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(start, stop, channel) DO NOTHING",
        )
        .bind(&program.start)
        .bind(&program.stop)
        .bind(&program.channel)
        .bind(&program.title)
        .bind(&program.description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Programs of `channel` whose slot contains `now`.
    ///
    /// Timestamps compare on their leading `YYYYMMDDHHMMSS` digits; the zone
    /// suffix is ignored.
    pub async fn programs_airing(
        &self,
        channel: &str,
        now: NaiveDateTime,
    ) -> AppResult<Vec<ProgramEntry>> {
        let now = xmltv_timestamp(now);
        let rows = sqlx::query_as::<_, ProgramEntry>(
            "SELECT id, start, stop, channel, title, description FROM programs
             WHERE channel = ?1
               AND substr(start, 1, 14) <= ?2
               AND substr(stop, 1, 14) > ?2
             ORDER BY start",
        )
        .bind(channel)
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        debug!("{} programs airing on '{}' at {}", rows.len(), channel, now);
        Ok(rows)
    }

    pub async fn list_programs_for_channel(&self, channel: &str) -> AppResult<Vec<ProgramEntry>> {
        let rows = sqlx::query_as::<_, ProgramEntry>(
            "SELECT id, start, stop, channel, title, description FROM programs
             WHERE channel = ? ORDER BY start, stop",
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_programs(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM programs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn delete_all_programs(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM programs")
            .execute(&self.pool)
            .await?;

        info!("Removed all {} programs", result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Delete programs that stopped before `now`
    pub async fn delete_elapsed_programs(&self, now: NaiveDateTime) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM programs WHERE substr(stop, 1, 14) < ?")
            .bind(xmltv_timestamp(now))
            .execute(&self.pool)
            .await?;

        info!("Removed {} elapsed programs", result.rows_affected());
        Ok(result.rows_affected())
    }
}
