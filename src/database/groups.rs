use tracing::{debug, info, warn};

use super::Database;
use crate::errors::AppResult;
use crate::models::*;

impl Database {
    /// Resolve a group by exact title, creating it when absent
    pub async fn upsert_group(&self, title: &str) -> AppResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO station_groups (title, favorite) VALUES (?, 0)
             ON CONFLICT(title) DO UPDATE SET title = excluded.title
             RETURNING id",
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        debug!("Resolved group '{}' -> {}", title, id);
        Ok(id)
    }

    pub async fn get_group(&self, id: i64) -> AppResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, favorite FROM station_groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    pub async fn get_group_by_title(&self, title: &str) -> AppResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, favorite FROM station_groups WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    pub async fn list_groups(&self) -> AppResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT id, title, favorite FROM station_groups ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    /// Distinct titles of groups that still own stations
    pub async fn list_group_titles(&self) -> AppResult<Vec<String>> {
        let titles = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT g.title FROM station_groups g
             JOIN stations s ON s.group_id = g.id
             ORDER BY g.title",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(titles)
    }

    pub async fn set_group_favorite(&self, id: i64, favorite: bool) -> AppResult<bool> {
        let result = sqlx::query("UPDATE station_groups SET favorite = ? WHERE id = ?")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a group together with its stations and their memberships
    pub async fn delete_group(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM station_groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted group ({})", id);
        } else {
            warn!("Group ({}) not found for deletion", id);
        }

        Ok(deleted)
    }
}
