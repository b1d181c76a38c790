use tracing::debug;

use super::m3u_parser::StationRecord;
use crate::database::Database;
use crate::errors::AppResult;
use crate::models::{PlaylistKind, StationState};

/// Catalog rows touched while resolving one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStation {
    pub station_id: i64,
    pub group_id: i64,
    pub playlist_id: i64,
    pub state: StationState,
    /// True when the station joined its group playlist on this record
    pub membership_added: bool,
}

/// Merges one parsed playlist entry into the catalog.
///
/// Each step is a single atomic upsert on the natural key, so a failure
/// leaves earlier steps of the same record committed and the caller simply
/// moves on to the next record.
pub struct StationResolver {
    database: Database,
    overwrite: bool,
}

impl StationResolver {
    pub fn new(database: Database, overwrite: bool) -> Self {
        Self { database, overwrite }
    }

    pub async fn resolve(&self, record: &StationRecord) -> AppResult<ResolvedStation> {
        let group_id = self.database.upsert_group(&record.group_title).await?;

        let (station_id, state) = self
            .database
            .upsert_station(&record.station, group_id, self.overwrite)
            .await?;

        let playlist_id = self
            .database
            .upsert_playlist(&record.group_title, PlaylistKind::Unset)
            .await?;

        let membership_added = self
            .database
            .insert_playlist_item_if_absent(playlist_id, station_id, record.channel_number)
            .await?;

        debug!(
            "Resolved '{}' -> station {} ({:?}), group {}, playlist {}{}",
            record.station.name,
            station_id,
            state,
            group_id,
            playlist_id,
            if membership_added { ", new membership" } else { "" }
        );

        Ok(ResolvedStation {
            station_id,
            group_id,
            playlist_id,
            state,
            membership_added,
        })
    }
}
