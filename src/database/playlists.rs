use tracing::{debug, error, info, warn};

use super::{map_unique_violation, Database};
use crate::errors::{AppError, AppResult};
use crate::models::*;

impl Database {
    /// Resolve a playlist by exact name, creating it when absent.
    ///
    /// An existing playlist keeps its kind and favorite flag.
    pub async fn upsert_playlist(&self, name: &str, kind: PlaylistKind) -> AppResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO playlists (name, favorite, kind) VALUES (?, 0, ?)
             ON CONFLICT(name) DO UPDATE SET name = excluded.name
             RETURNING id",
        )
        .bind(name)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        debug!("Resolved playlist '{}' -> {}", name, id);
        Ok(id)
    }

    /// Create a playlist by hand; fails when the name is taken
    pub async fn create_playlist(&self, name: &str, kind: PlaylistKind) -> AppResult<Playlist> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("playlist name must not be empty"));
        }

        info!("Creating playlist '{}' ({:?})", name, kind);

        let playlist = sqlx::query_as::<_, Playlist>(
            "INSERT INTO playlists (name, favorite, kind) VALUES (?, 0, ?)
             RETURNING id, name, favorite, kind",
        )
        .bind(name)
        .bind(kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create playlist '{}': {}", name, e);
            map_unique_violation(e, "playlists.name", name)
        })?;

        Ok(playlist)
    }

    pub async fn get_playlist(&self, id: i64) -> AppResult<Option<Playlist>> {
        let playlist = sqlx::query_as::<_, Playlist>(
            "SELECT id, name, favorite, kind FROM playlists WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(playlist)
    }

    pub async fn get_playlist_by_name(&self, name: &str) -> AppResult<Option<Playlist>> {
        let playlist = sqlx::query_as::<_, Playlist>(
            "SELECT id, name, favorite, kind FROM playlists WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(playlist)
    }

    pub async fn list_playlists(&self) -> AppResult<Vec<Playlist>> {
        let playlists = sqlx::query_as::<_, Playlist>(
            "SELECT id, name, favorite, kind FROM playlists ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    pub async fn rename_playlist(&self, id: i64, name: &str) -> AppResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("playlist name must not be empty"));
        }

        let result = sqlx::query("UPDATE playlists SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "playlists.name", name))?;

        if result.rows_affected() == 0 {
            warn!("Playlist ({}) not found for rename", id);
            return Ok(false);
        }

        info!("Renamed playlist ({}) to '{}'", id, name);
        Ok(true)
    }

    pub async fn set_playlist_favorite(&self, id: i64, favorite: bool) -> AppResult<bool> {
        let result = sqlx::query("UPDATE playlists SET favorite = ? WHERE id = ?")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_playlist_kind(&self, id: i64, kind: PlaylistKind) -> AppResult<bool> {
        let result = sqlx::query("UPDATE playlists SET kind = ? WHERE id = ?")
            .bind(kind)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a playlist and, by cascade, its items
    pub async fn delete_playlist(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted playlist ({})", id);
        } else {
            warn!("Playlist ({}) not found for deletion", id);
        }

        Ok(deleted)
    }
}
