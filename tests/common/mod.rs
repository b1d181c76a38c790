#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use m3u_catalog::config::{DatabaseConfig, IngestionConfig};
use m3u_catalog::database::Database;
use m3u_catalog::ingestor::{
    CancellationHandle, IngestionStateManager, M3uIngestor, ProgressListener,
};
use m3u_catalog::models::*;

/// Fresh in-memory catalog with the schema applied
pub async fn test_database() -> Database {
    let database = Database::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
    })
    .await
    .expect("open in-memory catalog");
    database.migrate().await.expect("apply migrations");
    database
}

pub fn ingestion_config() -> IngestionConfig {
    IngestionConfig {
        progress_update_interval: 1,
        ..IngestionConfig::default()
    }
}

/// Run one playlist import pass over `content`
pub async fn import_m3u(database: &Database, content: &str) -> ImportSummary {
    import_m3u_with(database, IngestionStateManager::new(), ingestion_config(), content).await
}

pub async fn import_m3u_with(
    database: &Database,
    state_manager: IngestionStateManager,
    config: IngestionConfig,
    content: &str,
) -> ImportSummary {
    let ingestor = M3uIngestor::new(database.clone(), state_manager, config);
    let mut reader = Cursor::new(content.as_bytes().to_vec());
    ingestor.ingest(&mut reader).await.expect("playlist import")
}

/// One `#EXTINF` + URL pair
pub fn entry(name: &str, group: &str, url: &str) -> String {
    format!(
        "#EXTINF:-1 tvg-name=\"{}\" group-title=\"{}\",{}\n{}\n",
        name, group, name, url
    )
}

pub fn playlist_of(entries: &[String]) -> String {
    let mut content = String::from("#EXTM3U\n");
    for entry in entries {
        content.push_str(entry);
    }
    content
}

/// Cancels the running session once `after` records were reported
pub struct CancelAfter {
    pub handle: CancellationHandle,
    pub after: usize,
    pub state: IngestionState,
}

impl ProgressListener for CancelAfter {
    fn on_progress(&self, progress: &IngestionProgress) {
        if progress.state == self.state && progress.progress.records_processed >= self.after {
            self.handle.cancel();
        }
    }
}

pub fn cancelling_manager(state: IngestionState, after: usize) -> IngestionStateManager {
    let manager = IngestionStateManager::new();
    let handle = manager.cancellation_handle();
    manager.with_listener(Arc::new(CancelAfter {
        handle,
        after,
        state,
    }))
}
