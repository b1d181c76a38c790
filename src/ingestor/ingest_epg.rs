//! XMLTV guide reconciliation.
//!
//! The guide is streamed with quick-xml; every complete `<programme>` is
//! hour-corrected and inserted on its own. Rows already in the catalog are
//! left alone, so importing the same guide twice changes nothing.

use chrono::{Local, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state_manager::{percentage, IngestionStateManager};
use crate::config::{EpgConfig, EpgPurgeMode, HourCorrectionMode};
use crate::database::Database;
use crate::errors::{AppError, AppResult, SourceError};
use crate::models::*;
use crate::utils::time::apply_hour_correction;

const SOURCE_TYPE: &str = "xmltv";
const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Desc,
}

/// A `<programme>` element as read, before validation
#[derive(Debug, Default)]
struct RawProgramme {
    start: Option<String>,
    stop: Option<String>,
    channel: Option<String>,
    title: String,
    description: String,
}

impl RawProgramme {
    fn from_element(element: &BytesStart) -> Self {
        Self {
            start: attribute(element, "start"),
            stop: attribute(element, "stop"),
            channel: attribute(element, "channel"),
            ..Self::default()
        }
    }

    fn into_program(self, hours: i32, mode: HourCorrectionMode) -> Result<NewProgram, SourceError> {
        let missing = |name: &str| {
            SourceError::invalid_record(SOURCE_TYPE, format!("programme without '{}'", name))
        };
        let start = self.start.ok_or_else(|| missing("start"))?;
        let stop = self.stop.ok_or_else(|| missing("stop"))?;
        let channel = self
            .channel
            .filter(|c| !c.is_empty())
            .ok_or_else(|| missing("channel"))?;

        let start = apply_hour_correction(&start, hours, mode)
            .map_err(|e| SourceError::invalid_record(SOURCE_TYPE, e))?;
        let stop = apply_hour_correction(&stop, hours, mode)
            .map_err(|e| SourceError::invalid_record(SOURCE_TYPE, e))?;

        Ok(NewProgram {
            start,
            stop,
            channel,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

fn attribute(element: &BytesStart, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.trim().to_string()))
}

pub struct EpgIngestor {
    database: Database,
    state_manager: IngestionStateManager,
    config: EpgConfig,
}

impl EpgIngestor {
    pub fn new(
        database: Database,
        state_manager: IngestionStateManager,
        config: EpgConfig,
    ) -> Self {
        Self {
            database,
            state_manager,
            config,
        }
    }

    /// Import an XMLTV document, purging relative to the local clock
    pub async fn ingest<R: BufRead>(&self, reader: R) -> AppResult<EpgSummary> {
        self.ingest_at(reader, Local::now().naive_local()).await
    }

    /// Import an XMLTV document with an explicit "now" for elapsed purges
    pub async fn ingest_at<R: BufRead>(
        &self,
        reader: R,
        now: NaiveDateTime,
    ) -> AppResult<EpgSummary> {
        let session_id = self.state_manager.start_ingestion(IngestionKind::Guide).await?;
        info!("Starting guide import session {}", session_id);

        match self.run(session_id, reader, now).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!("Guide import session {} failed: {}", session_id, e);
                self.state_manager.set_error(session_id, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run<R: BufRead>(
        &self,
        session_id: Uuid,
        reader: R,
        now: NaiveDateTime,
    ) -> AppResult<EpgSummary> {
        let mut summary = EpgSummary {
            session_id,
            outcome: ImportOutcome::Completed,
            processed: 0,
            inserted: 0,
            duplicates: 0,
            failed: 0,
            purged: 0,
        };

        summary.purged = match self.config.purge {
            EpgPurgeMode::None => 0,
            EpgPurgeMode::All => self.database.delete_all_programs().await?,
            EpgPurgeMode::Elapsed => self.database.delete_elapsed_programs(now).await?,
        };

        self.state_manager
            .update_progress(
                session_id,
                IngestionState::Running,
                progress_info("Importing programmes", &summary),
            )
            .await;

        let mut xml = Reader::from_reader(reader);
        xml.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut current: Option<RawProgramme> = None;
        let mut field: Option<Field> = None;

        loop {
            let finished = match xml.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    match e.name().as_ref() {
                        b"programme" => current = Some(RawProgramme::from_element(e)),
                        b"title" if current.is_some() => field = Some(Field::Title),
                        b"desc" if current.is_some() => field = Some(Field::Desc),
                        _ => {}
                    }
                    None
                }
                Ok(Event::Empty(ref e)) if e.name().as_ref() == b"programme" => {
                    Some(RawProgramme::from_element(e))
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"programme" => {
                        field = None;
                        current.take()
                    }
                    b"title" | b"desc" => {
                        field = None;
                        None
                    }
                    _ => None,
                },
                Ok(Event::Text(ref e)) => {
                    if let (Some(program), Some(field)) = (current.as_mut(), field) {
                        let text = e
                            .unescape()
                            .map_err(|err| self.parse_error(&xml, &summary, err))?;
                        push_text(program, field, &text);
                    }
                    None
                }
                Ok(Event::CData(ref e)) => {
                    if let (Some(program), Some(field)) = (current.as_mut(), field) {
                        push_text(program, field, &String::from_utf8_lossy(e));
                    }
                    None
                }
                Ok(Event::Eof) => {
                    if current.is_some() {
                        return Err(self.parse_error(&xml, &summary, "unexpected end of document"));
                    }
                    break;
                }
                Err(e) => return Err(self.parse_error(&xml, &summary, e)),
                Ok(_) => None,
            };
            buf.clear();

            let Some(raw) = finished else {
                continue;
            };

            summary.processed += 1;
            self.store(raw, &mut summary).await;

            if summary.processed % PROGRESS_INTERVAL == 0 {
                self.state_manager
                    .update_progress(
                        session_id,
                        IngestionState::Running,
                        progress_info(&format!("{} programmes", summary.processed), &summary),
                    )
                    .await;
            }

            tokio::task::yield_now().await;

            if self.state_manager.is_cancelled() {
                info!("Guide import cancelled after {} programmes", summary.processed);
                summary.outcome = ImportOutcome::Cancelled;
                break;
            }
        }

        let step = match summary.outcome {
            ImportOutcome::Completed => format!("Completed - {} programmes", summary.inserted),
            ImportOutcome::Cancelled => format!("Cancelled - {} programmes", summary.inserted),
        };
        self.state_manager
            .finish(session_id, summary.outcome, progress_info(&step, &summary))
            .await;

        info!(
            "Guide import {:?}: {} processed, {} inserted, {} duplicates, {} failed, {} purged",
            summary.outcome,
            summary.processed,
            summary.inserted,
            summary.duplicates,
            summary.failed,
            summary.purged
        );

        Ok(summary)
    }

    async fn store(&self, raw: RawProgramme, summary: &mut EpgSummary) {
        let program = match raw.into_program(
            self.config.hour_correction,
            self.config.hour_correction_mode,
        ) {
            Ok(program) => program,
            Err(e) => {
                warn!("Skipping programme: {}", e);
                summary.failed += 1;
                return;
            }
        };

        match self.database.insert_program(&program).await {
            Ok(true) => summary.inserted += 1,
            Ok(false) => {
                debug!(
                    "Programme '{}' on '{}' at {} already present",
                    program.title, program.channel, program.start
                );
                summary.duplicates += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to store programme '{}' on '{}': {}",
                    program.title, program.channel, e
                );
                summary.failed += 1;
            }
        }
    }

    fn parse_error<R>(
        &self,
        xml: &Reader<R>,
        summary: &EpgSummary,
        err: impl std::fmt::Display,
    ) -> AppError {
        let position = xml.buffer_position();
        error!(
            "Malformed guide at byte {} after {} programmes were stored: {}",
            position, summary.inserted, err
        );
        SourceError::parse_error(SOURCE_TYPE, format!("at byte {}: {}", position, err)).into()
    }
}

fn push_text(program: &mut RawProgramme, field: Field, text: &str) {
    let target = match field {
        Field::Title => &mut program.title,
        Field::Desc => &mut program.description,
    };
    target.push_str(text);
}

fn progress_info(step: &str, summary: &EpgSummary) -> ProgressInfo {
    ProgressInfo {
        current_step: step.to_string(),
        total_records: None,
        records_processed: summary.processed,
        percentage: percentage(summary.processed, None),
    }
}
