use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingestion: IngestionConfig,
    pub epg: EpgConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Publish progress every N records
    pub progress_update_interval: usize,
    /// Refresh name, group, logo and EPG id of a station matched by URL
    pub overwrite_on_match: bool,
    /// Line prefixes recognised as playback URLs
    pub url_schemes: Vec<String>,
    /// Group assigned to records without a group-title
    pub ungrouped_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpgConfig {
    pub hour_correction: i32,
    pub hour_correction_mode: HourCorrectionMode,
    pub purge: EpgPurgeMode,
}

/// How the hour correction is applied to XMLTV timestamps
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HourCorrectionMode {
    /// Rewrite the two hour digits only; the date never changes
    #[default]
    InPlace,
    /// Shift the full date-time, carrying into day/month/year
    Carry,
}

/// Which program rows are removed before a guide import
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EpgPurgeMode {
    None,
    All,
    #[default]
    Elapsed,
}

impl std::str::FromStr for HourCorrectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in_place" | "in-place" => Ok(Self::InPlace),
            "carry" => Ok(Self::Carry),
            other => Err(format!("unknown hour correction mode '{}'", other)),
        }
    }
}

impl std::str::FromStr for EpgPurgeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            "elapsed" => Ok(Self::Elapsed),
            other => Err(format!("unknown purge mode '{}'", other)),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./m3u-catalog.db".to_string(),
            max_connections: Some(5),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            progress_update_interval: 100,
            overwrite_on_match: true,
            url_schemes: vec!["http".to_string(), "rtp".to_string()],
            ungrouped_title: "Ungrouped".to_string(),
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            hour_correction: 0,
            hour_correction_mode: HourCorrectionMode::InPlace,
            purge: EpgPurgeMode::Elapsed,
        }
    }
}

impl Config {
    /// Load the configuration, writing the defaults out when the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            Ok(default_config)
        }
    }
}
