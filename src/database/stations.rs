use tracing::{debug, info, warn};

use super::{like_pattern, Database};
use crate::errors::AppResult;
use crate::models::*;

const STATION_COLUMNS: &str = "s.id, s.name, s.epg_channel_id, s.group_id, s.logo, s.url, s.state";

impl Database {
    /// Insert a station keyed by URL or refresh the existing one.
    ///
    /// A fresh row is `New`. A matched row becomes `Confirmed`, unless it was
    /// already created as `New` earlier in the same pass. With `overwrite`
    /// the name, group, logo and EPG channel id follow the new record; the
    /// URL never changes.
    pub async fn upsert_station(
        &self,
        station: &NewStation,
        group_id: i64,
        overwrite: bool,
    ) -> AppResult<(i64, StationState)> {
        let (id, state): (i64, StationState) = sqlx::query_as(
            "INSERT INTO stations (name, epg_channel_id, group_id, logo, url, state)
             VALUES (?1, ?2, ?3, ?4, ?5, 2)
             ON CONFLICT(url) DO UPDATE SET
                 state = CASE WHEN stations.state = 2 THEN 2 ELSE 1 END,
                 name = CASE WHEN ?6 THEN excluded.name ELSE stations.name END,
                 epg_channel_id = CASE WHEN ?6
                     THEN excluded.epg_channel_id ELSE stations.epg_channel_id END,
                 group_id = CASE WHEN ?6 THEN excluded.group_id ELSE stations.group_id END,
                 logo = CASE WHEN ?6 THEN excluded.logo ELSE stations.logo END
             RETURNING id, state",
        )
        .bind(&station.name)
        .bind(&station.epg_channel_id)
        .bind(group_id)
        .bind(&station.logo)
        .bind(&station.url)
        .bind(overwrite)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            "Upserted station '{}' ({}) -> {:?}",
            station.name, station.url, state
        );
        Ok((id, state))
    }

    pub async fn get_station(&self, id: i64) -> AppResult<Option<Station>> {
        let station = sqlx::query_as::<_, Station>(&format!(
            "SELECT {} FROM stations s WHERE s.id = ?",
            STATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    pub async fn get_station_by_url(&self, url: &str) -> AppResult<Option<Station>> {
        let station = sqlx::query_as::<_, Station>(&format!(
            "SELECT {} FROM stations s WHERE s.url = ?",
            STATION_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(station)
    }

    /// Stations joined with their group, filtered for the station browser
    pub async fn list_stations(&self, query: &StationQuery) -> AppResult<Vec<StationListing>> {
        let rows = sqlx::query_as::<_, StationListing>(&format!(
            r#"SELECT {},
                   g.title AS group_title,
                   g.favorite AS group_favorite,
                   (SELECT COUNT(*) FROM playlist_items pi
                     WHERE pi.station_id = s.id) AS usage_count
               FROM stations s
               JOIN station_groups g ON g.id = s.group_id
               WHERE (?1 = '' OR g.title LIKE ?2 ESCAPE '\')
                 AND (?3 = '' OR s.name LIKE ?4 ESCAPE '\')
                 AND (?5 IS NULL OR s.state = ?5)
                 AND (?6 = 0 OR g.favorite = 1)
               ORDER BY g.title, s.name, s.id"#,
            STATION_COLUMNS
        ))
        .bind(query.group_title.trim())
        .bind(like_pattern(&query.group_title))
        .bind(query.name.trim())
        .bind(like_pattern(&query.name))
        .bind(query.state.map(|state| state as i32))
        .bind(query.favorite_groups_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Mark every station as not yet seen; returns the number of rows touched
    pub async fn deactivate_stations(&self) -> AppResult<u64> {
        let result = sqlx::query("UPDATE stations SET state = 0")
            .execute(&self.pool)
            .await?;

        debug!("Deactivated {} stations", result.rows_affected());
        Ok(result.rows_affected())
    }

    pub async fn count_stations_by_state(&self) -> AppResult<StateCounts> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM stations GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StateCounts::default();
        for (code, count) in rows {
            match StationState::from_code(code) {
                Some(StationState::Obsolete) => counts.obsolete = count,
                Some(StationState::Confirmed) => counts.confirmed = count,
                Some(StationState::New) => counts.new = count,
                None => warn!("Ignoring {} stations with unknown state {}", count, code),
            }
        }

        Ok(counts)
    }

    /// Delete stations still obsolete after a pass (memberships cascade)
    pub async fn delete_obsolete_stations(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM stations WHERE state = 0")
            .execute(&self.pool)
            .await?;

        info!("Removed {} obsolete stations", result.rows_affected());
        Ok(result.rows_affected())
    }

    pub async fn delete_station(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM stations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if !deleted {
            warn!("Station ({}) not found for deletion", id);
        }

        Ok(deleted)
    }

    pub async fn delete_all_stations(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM stations")
            .execute(&self.pool)
            .await?;

        info!("Removed all {} stations", result.rows_affected());
        Ok(result.rows_affected())
    }
}
