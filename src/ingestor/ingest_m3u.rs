use std::io::SeekFrom;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncSeek, AsyncSeekExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::m3u_parser::{clean_line, is_url_line, LineEvent, RecordAssembler};
use super::resolver::StationResolver;
use super::state_manager::{percentage, IngestionStateManager};
use super::sweeper::LifecycleSweeper;
use crate::config::IngestionConfig;
use crate::database::Database;
use crate::errors::AppResult;
use crate::models::*;

/// Runs one playlist import pass against the catalog
pub struct M3uIngestor {
    database: Database,
    state_manager: IngestionStateManager,
    config: IngestionConfig,
}

impl M3uIngestor {
    pub fn new(
        database: Database,
        state_manager: IngestionStateManager,
        config: IngestionConfig,
    ) -> Self {
        Self {
            database,
            state_manager,
            config,
        }
    }

    /// Import an extended M3U stream.
    ///
    /// The stream is read twice: once to count URL lines for progress, then
    /// from offset 0 for the real pass. Every station upsert is durable as
    /// soon as it is issued, so a cancelled pass keeps what it wrote.
    pub async fn ingest<R>(&self, reader: &mut R) -> AppResult<ImportSummary>
    where
        R: AsyncBufRead + AsyncSeek + Unpin,
    {
        let session_id = self.state_manager.start_ingestion(IngestionKind::Playlist).await?;
        info!("Starting playlist import session {}", session_id);

        match self.run(session_id, reader).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!("Playlist import session {} failed: {}", session_id, e);
                self.state_manager.set_error(session_id, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run<R>(&self, session_id: Uuid, reader: &mut R) -> AppResult<ImportSummary>
    where
        R: AsyncBufRead + AsyncSeek + Unpin,
    {
        let total = self.count_records(reader).await?;
        reader.seek(SeekFrom::Start(0)).await?;
        debug!("Playlist holds {} URL lines", total);

        let mut summary = ImportSummary {
            session_id,
            outcome: ImportOutcome::Completed,
            total_records: total,
            processed: 0,
            created: 0,
            confirmed: 0,
            failed: 0,
            skipped_lines: 0,
            memberships_added: 0,
            state_counts: StateCounts::default(),
        };

        let sweeper = LifecycleSweeper::new(self.database.clone());

        if self.state_manager.is_cancelled() {
            info!("Playlist import cancelled before any station was touched");
            summary.outcome = ImportOutcome::Cancelled;
            summary.state_counts = sweeper.report().await?;
            self.finish(&summary).await;
            return Ok(summary);
        }

        sweeper.begin().await?;
        self.state_manager
            .update_progress(
                session_id,
                IngestionState::Running,
                self.progress_info("Importing stations", &summary),
            )
            .await;

        let resolver = StationResolver::new(self.database.clone(), self.config.overwrite_on_match);
        let mut assembler = RecordAssembler::new(
            self.config.url_schemes.clone(),
            self.config.ungrouped_title.clone(),
        );
        let interval = self.config.progress_update_interval.max(1);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let record = match assembler.push_line(&clean_line(&buf)) {
                Some(LineEvent::Record(record)) => record,
                Some(LineEvent::Skipped(reason)) => {
                    debug!("Skipping line: {}", reason);
                    summary.skipped_lines += 1;
                    continue;
                }
                None => continue,
            };

            summary.processed += 1;
            match resolver.resolve(&record).await {
                Ok(resolved) => {
                    match resolved.state {
                        StationState::New => summary.created += 1,
                        StationState::Confirmed => summary.confirmed += 1,
                        StationState::Obsolete => {}
                    }
                    if resolved.membership_added {
                        summary.memberships_added += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to import station '{}' ({}): {}",
                        record.station.name, record.station.url, e
                    );
                    summary.failed += 1;
                }
            }

            if summary.processed % interval == 0 {
                self.state_manager
                    .update_progress(
                        session_id,
                        IngestionState::Running,
                        self.progress_info(&format!("{} stations", summary.processed), &summary),
                    )
                    .await;
            }

            tokio::task::yield_now().await;

            if self.state_manager.is_cancelled() {
                info!(
                    "Playlist import cancelled after {} of {} records",
                    summary.processed, summary.total_records
                );
                summary.outcome = ImportOutcome::Cancelled;
                break;
            }
        }

        if summary.outcome == ImportOutcome::Completed {
            if let Some(LineEvent::Skipped(reason)) = assembler.finish() {
                debug!("Skipping line: {}", reason);
                summary.skipped_lines += 1;
            }
        }

        summary.state_counts = sweeper.report().await?;
        self.finish(&summary).await;

        info!(
            "Playlist import {:?}: {} processed, {} new, {} confirmed, {} failed, {} skipped, \
             {} obsolete",
            summary.outcome,
            summary.processed,
            summary.created,
            summary.confirmed,
            summary.failed,
            summary.skipped_lines,
            summary.state_counts.obsolete
        );

        Ok(summary)
    }

    /// Preparing step: count the lines that look like playback URLs
    async fn count_records<R>(&self, reader: &mut R) -> AppResult<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut count = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if is_url_line(&clean_line(&buf), &self.config.url_schemes) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn finish(&self, summary: &ImportSummary) {
        let step = match summary.outcome {
            ImportOutcome::Completed => format!("Completed - {} stations", summary.processed),
            ImportOutcome::Cancelled => format!("Cancelled - {} stations", summary.processed),
        };
        self.state_manager
            .finish(
                summary.session_id,
                summary.outcome,
                self.progress_info(&step, summary),
            )
            .await;
    }

    fn progress_info(&self, step: &str, summary: &ImportSummary) -> ProgressInfo {
        ProgressInfo {
            current_step: step.to_string(),
            total_records: Some(summary.total_records),
            records_processed: summary.processed,
            percentage: percentage(summary.processed, Some(summary.total_records)),
        }
    }
}
