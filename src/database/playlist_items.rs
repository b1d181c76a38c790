use tracing::{debug, info, warn};

use super::{like_pattern, Database};
use crate::errors::{AppError, AppResult};
use crate::models::*;

impl Database {
    /// Add a membership unless the station is already in the playlist.
    ///
    /// Returns `true` when a row was inserted. An existing membership keeps
    /// its position untouched.
    pub async fn insert_playlist_item_if_absent(
        &self,
        playlist_id: i64,
        station_id: i64,
        position: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO playlist_items (playlist_id, station_id, position, favorite)
             VALUES (?, ?, ?, 0)
             ON CONFLICT(station_id, playlist_id) DO NOTHING",
        )
        .bind(playlist_id)
        .bind(station_id)
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a station at the end of a playlist
    pub async fn append_playlist_item(
        &self,
        playlist_id: i64,
        station_id: i64,
    ) -> AppResult<Option<PlaylistItem>> {
        let item = sqlx::query_as::<_, PlaylistItem>(
            "INSERT INTO playlist_items (playlist_id, station_id, position, favorite)
             SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0), 0
               FROM playlist_items WHERE playlist_id = ?1
             ON CONFLICT(station_id, playlist_id) DO NOTHING
             RETURNING id, playlist_id, station_id, position, favorite, external_id",
        )
        .bind(playlist_id)
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;

        match &item {
            Some(item) => info!(
                "Added station ({}) to playlist ({}) at position {}",
                station_id, playlist_id, item.position
            ),
            None => debug!(
                "Station ({}) already in playlist ({})",
                station_id, playlist_id
            ),
        }

        Ok(item)
    }

    pub async fn get_playlist_item(&self, id: i64) -> AppResult<Option<PlaylistItem>> {
        let item = sqlx::query_as::<_, PlaylistItem>(
            "SELECT id, playlist_id, station_id, position, favorite, external_id
             FROM playlist_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Items of one playlist joined with their stations, in display order
    pub async fn list_playlist_items(
        &self,
        query: &PlaylistItemQuery,
    ) -> AppResult<Vec<PlaylistEntry>> {
        let rows = sqlx::query_as::<_, PlaylistEntry>(
            r#"SELECT pi.id AS item_id, pi.playlist_id, pi.station_id, pi.position,
                      pi.favorite, pi.external_id,
                      s.name, s.epg_channel_id, g.title AS group_title, s.logo, s.url, s.state
               FROM playlist_items pi
               JOIN stations s ON s.id = pi.station_id
               JOIN station_groups g ON g.id = s.group_id
               WHERE pi.playlist_id = ?1
                 AND (?2 = '' OR s.name LIKE ?3 ESCAPE '\')
                 AND (?4 = 0 OR EXISTS (
                     SELECT 1 FROM programs p
                     WHERE p.channel = s.epg_channel_id AND s.epg_channel_id <> ''))
                 AND (?5 = 0 OR pi.favorite = 1)
               ORDER BY pi.position, pi.id"#,
        )
        .bind(query.playlist_id)
        .bind(query.name.trim())
        .bind(like_pattern(&query.name))
        .bind(query.epg_only)
        .bind(query.favorites_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn set_item_position(&self, id: i64, position: i64) -> AppResult<bool> {
        let result = sqlx::query("UPDATE playlist_items SET position = ? WHERE id = ?")
            .bind(position)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move an item one step towards the top; `false` when already first
    pub async fn move_item_up(&self, id: i64) -> AppResult<bool> {
        self.move_item(id, -1).await
    }

    /// Move an item one step towards the bottom; `false` when already last
    pub async fn move_item_down(&self, id: i64) -> AppResult<bool> {
        self.move_item(id, 1).await
    }

    async fn move_item(&self, id: i64, step: isize) -> AppResult<bool> {
        let item = self
            .get_playlist_item(id)
            .await?
            .ok_or_else(|| AppError::not_found("playlist item", id))?;

        let order: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT id, position FROM playlist_items
             WHERE playlist_id = ? ORDER BY position, id",
        )
        .bind(item.playlist_id)
        .fetch_all(&self.pool)
        .await?;

        let Some(index) = order.iter().position(|(item_id, _)| *item_id == id) else {
            return Err(AppError::not_found("playlist item", id));
        };
        let neighbour = index as isize + step;
        if neighbour < 0 || neighbour as usize >= order.len() {
            return Ok(false);
        }
        let neighbour = neighbour as usize;

        let mut tx = self.pool.begin().await?;

        let (this_id, this_pos) = order[index];
        let (other_id, other_pos) = order[neighbour];
        if this_pos != other_pos {
            for (item_id, position) in [(this_id, other_pos), (other_id, this_pos)] {
                sqlx::query("UPDATE playlist_items SET position = ? WHERE id = ?")
                    .bind(position)
                    .bind(item_id)
                    .execute(&mut *tx)
                    .await?;
            }
        } else {
            // Tied positions carry no order to swap; renumber the playlist instead
            let mut ids: Vec<i64> = order.iter().map(|(item_id, _)| *item_id).collect();
            ids.swap(index, neighbour);
            for (position, item_id) in ids.iter().enumerate() {
                sqlx::query("UPDATE playlist_items SET position = ? WHERE id = ?")
                    .bind(position as i64)
                    .bind(item_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        debug!(
            "Moved playlist item ({}) {} in playlist ({})",
            id,
            if step < 0 { "up" } else { "down" },
            item.playlist_id
        );
        Ok(true)
    }

    pub async fn set_item_favorite(&self, id: i64, favorite: bool) -> AppResult<bool> {
        let result = sqlx::query("UPDATE playlist_items SET favorite = ? WHERE id = ?")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cache the id an external metadata lookup resolved for this item
    pub async fn set_item_external_id(&self, id: i64, external_id: Option<i64>) -> AppResult<bool> {
        let result = sqlx::query("UPDATE playlist_items SET external_id = ? WHERE id = ?")
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_playlist_item(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM playlist_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if !removed {
            warn!("Playlist item ({}) not found for removal", id);
        }

        Ok(removed)
    }

    pub async fn clear_playlist(&self, playlist_id: i64) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM playlist_items WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&self.pool)
            .await?;

        info!(
            "Cleared {} items from playlist ({})",
            result.rows_affected(),
            playlist_id
        );
        Ok(result.rows_affected())
    }
}
