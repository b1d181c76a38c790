use std::path::{Path, PathBuf};
use tracing::info;

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::*;

/// Serializes playlists back to extended M3U
pub struct PlaylistGenerator {
    database: Database,
}

impl PlaylistGenerator {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn generate(&self, playlist_id: i64) -> AppResult<String> {
        let playlist = self
            .database
            .get_playlist(playlist_id)
            .await?
            .ok_or_else(|| AppError::not_found("playlist", playlist_id))?;

        let entries = self
            .database
            .list_playlist_items(&PlaylistItemQuery {
                playlist_id,
                ..PlaylistItemQuery::default()
            })
            .await?;

        let content = render_m3u(&entries);
        info!(
            "Generated M3U for playlist '{}' with {} entries",
            playlist.name,
            entries.len()
        );

        Ok(content)
    }

    /// Generate a playlist and write it to `path`, creating parent directories
    pub async fn save_m3u_file(&self, playlist_id: i64, path: &Path) -> AppResult<PathBuf> {
        let content = self.generate(playlist_id).await?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(path.to_path_buf())
    }
}

/// Render playlist entries, already in display order, as M3U text
pub fn render_m3u(entries: &[PlaylistEntry]) -> String {
    let mut m3u = String::from("#EXTM3U\n");

    for entry in entries {
        let mut extinf = format!("#EXTINF:-1 tvg-name=\"{}\"", escape_attribute(&entry.name));

        if !entry.epg_channel_id.is_empty() {
            extinf.push_str(&format!(" tvg-id=\"{}\"", escape_attribute(&entry.epg_channel_id)));
        }

        extinf.push_str(&format!(" tvg-chno=\"{}\"", entry.position));
        extinf.push_str(&format!(" group-title=\"{}\"", escape_attribute(&entry.group_title)));

        if entry.logo.trim() != BLANK_LOGO.trim() {
            extinf.push_str(&format!(" tvg-logo=\"{}\"", escape_attribute(&entry.logo)));
        }

        extinf.push_str(&format!(",{}\n", entry.name));

        m3u.push_str(&extinf);
        m3u.push_str(&format!("{}\n", entry.url));
    }

    m3u
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestor::m3u_parser::ExtinfEntry;

    fn entry(name: &str, logo: &str, position: i64) -> PlaylistEntry {
        PlaylistEntry {
            item_id: 1,
            playlist_id: 1,
            station_id: 1,
            position,
            favorite: false,
            external_id: None,
            name: name.to_string(),
            epg_channel_id: String::new(),
            group_title: "G".to_string(),
            logo: logo.to_string(),
            url: "http://x/a".to_string(),
            state: StationState::New,
        }
    }

    #[test]
    fn test_blank_logo_and_empty_epg_id_are_omitted() {
        let m3u = render_m3u(&[entry("A", BLANK_LOGO, 3)]);
        assert_eq!(
            m3u,
            "#EXTM3U\n#EXTINF:-1 tvg-name=\"A\" tvg-chno=\"3\" group-title=\"G\",A\nhttp://x/a\n"
        );
    }

    #[test]
    fn test_escaped_attributes_parse_back() {
        let name = r#"Say "Hi" \ Co"#;
        let m3u = render_m3u(&[entry(name, "http://l/a.png", 0)]);
        let extinf = m3u.lines().nth(1).unwrap();

        let parsed = ExtinfEntry::parse(extinf).unwrap();
        assert_eq!(parsed.tvg_name.as_deref(), Some(name));
        assert_eq!(parsed.tvg_logo.as_deref(), Some("http://l/a.png"));
        assert_eq!(parsed.tvg_chno.as_deref(), Some("0"));
    }
}
