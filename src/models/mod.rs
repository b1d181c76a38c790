use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Logo stored for stations whose entry carries no tvg-logo
pub const BLANK_LOGO: &str = " ";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub favorite: bool,
}

/// Lifecycle of a station across import passes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum StationState {
    /// Not seen in the current (or last completed) pass
    Obsolete = 0,
    /// Already catalogued and seen again
    Confirmed = 1,
    /// First seen in the current pass
    New = 2,
}

impl StationState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Obsolete),
            1 => Some(Self::Confirmed),
            2 => Some(Self::New),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Obsolete => "obsolete",
            Self::Confirmed => "confirmed",
            Self::New => "new",
        }
    }
}

impl std::str::FromStr for StationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "obsolete" | "0" => Ok(Self::Obsolete),
            "confirmed" | "1" => Ok(Self::Confirmed),
            "new" | "2" => Ok(Self::New),
            other => Err(format!("unknown station state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub epg_channel_id: String,
    pub group_id: i64,
    pub logo: String,
    pub url: String,
    pub state: StationState,
}

/// Station fields as parsed from one playlist entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewStation {
    pub name: String,
    pub epg_channel_id: String,
    pub logo: String,
    pub url: String,
}

/// A station row joined with its group, as shown in the station browser
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StationListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub station: Station,
    pub group_title: String,
    pub group_favorite: bool,
    /// Number of playlists the station belongs to
    pub usage_count: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistKind {
    #[default]
    Unset = 0,
    Tv = 1,
    Radio = 2,
    Movie = 3,
}

impl std::str::FromStr for PlaylistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unset" | "" => Ok(Self::Unset),
            "tv" => Ok(Self::Tv),
            "radio" => Ok(Self::Radio),
            "movie" => Ok(Self::Movie),
            other => Err(format!("unknown playlist kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub favorite: bool,
    pub kind: PlaylistKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PlaylistItem {
    pub id: i64,
    pub playlist_id: i64,
    pub station_id: i64,
    pub position: i64,
    pub favorite: bool,
    /// Cached id from an external metadata service
    pub external_id: Option<i64>,
}

/// A playlist membership joined with its station, in display order
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlaylistEntry {
    pub item_id: i64,
    pub playlist_id: i64,
    pub station_id: i64,
    pub position: i64,
    pub favorite: bool,
    pub external_id: Option<i64>,
    pub name: String,
    pub epg_channel_id: String,
    pub group_title: String,
    pub logo: String,
    pub url: String,
    pub state: StationState,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ProgramEntry {
    pub id: i64,
    pub start: String,
    pub stop: String,
    pub channel: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProgram {
    pub start: String,
    pub stop: String,
    pub channel: String,
    pub title: String,
    pub description: String,
}

/// Station browser filter; blank text and `None` match everything
#[derive(Debug, Clone, Default)]
pub struct StationQuery {
    pub group_title: String,
    pub name: String,
    pub state: Option<StationState>,
    pub favorite_groups_only: bool,
}

/// Playlist content filter; blank text and `false` match everything
#[derive(Debug, Clone, Default)]
pub struct PlaylistItemQuery {
    pub playlist_id: i64,
    pub name: String,
    /// Only stations whose EPG channel id has program entries
    pub epg_only: bool,
    pub favorites_only: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateCounts {
    pub obsolete: i64,
    pub confirmed: i64,
    pub new: i64,
}

impl StateCounts {
    pub fn total(&self) -> i64 {
        self.obsolete + self.confirmed + self.new
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestionKind {
    Playlist,
    Guide,
}

impl std::fmt::Display for IngestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playlist => write!(f, "playlist"),
            Self::Guide => write!(f, "guide"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestionState {
    Idle,
    Preparing,
    Running,
    Cancelled,
    Completed,
    Error,
}

impl IngestionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Preparing | Self::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub current_step: String,
    pub total_records: Option<usize>,
    pub records_processed: usize,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionProgress {
    pub session_id: Uuid,
    pub kind: IngestionKind,
    pub state: IngestionState,
    pub progress: ProgressInfo,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    Completed,
    Cancelled,
}

/// Result of one playlist import pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub session_id: Uuid,
    pub outcome: ImportOutcome,
    /// URL lines counted while preparing
    pub total_records: usize,
    /// Records handed to the resolver, failed ones included
    pub processed: usize,
    pub created: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped_lines: usize,
    pub memberships_added: usize,
    pub state_counts: StateCounts,
}

/// Result of one guide import pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgSummary {
    pub session_id: Uuid,
    pub outcome: ImportOutcome,
    pub processed: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub purged: u64,
}
