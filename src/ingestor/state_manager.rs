use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::*;

pub type ProgressSender = broadcast::Sender<IngestionProgress>;
pub type ProgressReceiver = broadcast::Receiver<IngestionProgress>;

/// Synchronous observer invoked on every published progress update
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, progress: &IngestionProgress);
}

/// Cooperative cancellation flag shared with whoever may stop a pass
#[derive(Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Tracks import sessions and enforces that only one runs at a time
#[derive(Clone)]
pub struct IngestionStateManager {
    states: Arc<RwLock<HashMap<Uuid, IngestionProgress>>>,
    progress_tx: ProgressSender,
    cancellation: CancellationHandle,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl IngestionStateManager {
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(1000);
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            progress_tx,
            cancellation: CancellationHandle::default(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.progress_tx.subscribe()
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Open a new session in `Preparing`.
    ///
    /// Fails with `ImportInProgress` while another session is preparing or
    /// running. Drops finished sessions and clears any cancellation left
    /// over from an earlier session.
    pub async fn start_ingestion(&self, kind: IngestionKind) -> AppResult<Uuid> {
        let session_id = Uuid::new_v4();
        let progress = {
            let mut states = self.states.write().await;
            if let Some(active) = states.values().find(|p| p.state.is_active()) {
                warn!(
                    "Refusing to start {} import while {} session {} is {:?}",
                    kind, active.kind, active.session_id, active.state
                );
                return Err(AppError::ImportInProgress {
                    kind: active.kind.to_string(),
                });
            }

            // Finished sessions stay readable until the next one starts
            states.retain(|_, p| p.state.is_active());

            let now = Utc::now();
            let progress = IngestionProgress {
                session_id,
                kind,
                state: IngestionState::Preparing,
                progress: ProgressInfo {
                    current_step: "Preparing data".to_string(),
                    total_records: None,
                    records_processed: 0,
                    percentage: Some(0.0),
                },
                started_at: now,
                updated_at: now,
                completed_at: None,
                error: None,
            };
            states.insert(session_id, progress.clone());
            progress
        };

        self.cancellation.reset();
        debug!("Started {} session {}", kind, session_id);
        self.publish(&progress);

        Ok(session_id)
    }

    pub async fn update_progress(
        &self,
        session_id: Uuid,
        state: IngestionState,
        progress_info: ProgressInfo,
    ) {
        let updated = {
            let mut states = self.states.write().await;
            states.get_mut(&session_id).map(|progress| {
                progress.state = state;
                progress.progress = progress_info;
                progress.updated_at = Utc::now();

                if !state.is_active() && state != IngestionState::Idle {
                    progress.completed_at = Some(progress.updated_at);
                }
                progress.clone()
            })
        };

        if let Some(progress) = updated {
            self.publish(&progress);
        }
    }

    /// Close a session as `Completed` or `Cancelled`
    pub async fn finish(
        &self,
        session_id: Uuid,
        outcome: ImportOutcome,
        progress_info: ProgressInfo,
    ) {
        let state = match outcome {
            ImportOutcome::Completed => IngestionState::Completed,
            ImportOutcome::Cancelled => IngestionState::Cancelled,
        };
        self.update_progress(session_id, state, progress_info).await;
    }

    pub async fn set_error(&self, session_id: Uuid, error: String) {
        let updated = {
            let mut states = self.states.write().await;
            states.get_mut(&session_id).map(|progress| {
                progress.state = IngestionState::Error;
                progress.error = Some(error);
                progress.updated_at = Utc::now();
                progress.completed_at = Some(progress.updated_at);
                progress.clone()
            })
        };

        if let Some(progress) = updated {
            self.publish(&progress);
        }
    }

    pub async fn get_progress(&self, session_id: Uuid) -> Option<IngestionProgress> {
        let states = self.states.read().await;
        states.get(&session_id).cloned()
    }

    /// The session currently preparing or running, if any
    pub async fn active_session(&self) -> Option<IngestionProgress> {
        let states = self.states.read().await;
        states.values().find(|p| p.state.is_active()).cloned()
    }

    fn publish(&self, progress: &IngestionProgress) {
        if let Some(listener) = &self.listener {
            listener.on_progress(progress);
        }
        let _ = self.progress_tx.send(progress.clone());
    }
}

impl Default for IngestionStateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentage of `processed` against an optional total
pub(crate) fn percentage(processed: usize, total: Option<usize>) -> Option<f64> {
    match total {
        Some(0) => Some(100.0),
        Some(total) => Some((processed as f64 / total as f64 * 100.0).min(100.0)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<IngestionState>>);

    impl ProgressListener for Recorder {
        fn on_progress(&self, progress: &IngestionProgress) {
            self.0.lock().unwrap().push(progress.state);
        }
    }

    fn info(step: &str) -> ProgressInfo {
        ProgressInfo {
            current_step: step.to_string(),
            total_records: Some(2),
            records_processed: 1,
            percentage: Some(50.0),
        }
    }

    #[tokio::test]
    async fn test_second_session_is_rejected_while_active() {
        let manager = IngestionStateManager::new();
        let first = manager.start_ingestion(IngestionKind::Playlist).await.unwrap();

        let err = manager.start_ingestion(IngestionKind::Guide).await.unwrap_err();
        assert!(matches!(err, AppError::ImportInProgress { .. }));

        manager
            .finish(first, ImportOutcome::Completed, info("done"))
            .await;
        assert!(manager.start_ingestion(IngestionKind::Guide).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_flag_resets_on_new_session() {
        let manager = IngestionStateManager::new();
        let handle = manager.cancellation_handle();

        let session = manager.start_ingestion(IngestionKind::Playlist).await.unwrap();
        handle.cancel();
        assert!(manager.is_cancelled());

        manager
            .finish(session, ImportOutcome::Cancelled, info("cancelled"))
            .await;
        let progress = manager.get_progress(session).await.unwrap();
        assert_eq!(progress.state, IngestionState::Cancelled);
        assert!(progress.completed_at.is_some());

        manager.start_ingestion(IngestionKind::Playlist).await.unwrap();
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_listener_and_subscribers_see_every_update() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let manager = IngestionStateManager::new().with_listener(recorder.clone());
        let mut rx = manager.subscribe();

        let session = manager.start_ingestion(IngestionKind::Guide).await.unwrap();
        manager
            .update_progress(session, IngestionState::Running, info("running"))
            .await;
        manager.set_error(session, "boom".to_string()).await;

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                IngestionState::Preparing,
                IngestionState::Running,
                IngestionState::Error
            ]
        );
        assert_eq!(rx.recv().await.unwrap().state, IngestionState::Preparing);
        assert_eq!(rx.recv().await.unwrap().state, IngestionState::Running);
        let last = rx.recv().await.unwrap();
        assert_eq!(last.error.as_deref(), Some("boom"));
        assert!(manager.active_session().await.is_none());
    }

    #[tokio::test]
    async fn test_finished_sessions_are_pruned_on_next_start() {
        let manager = IngestionStateManager::new();

        let first = manager.start_ingestion(IngestionKind::Playlist).await.unwrap();
        manager
            .finish(first, ImportOutcome::Completed, info("done"))
            .await;
        assert!(manager.get_progress(first).await.is_some());

        let second = manager.start_ingestion(IngestionKind::Guide).await.unwrap();
        assert!(manager.get_progress(first).await.is_none());
        manager.set_error(second, "boom".to_string()).await;
        assert!(manager.get_progress(second).await.is_some());

        let third = manager.start_ingestion(IngestionKind::Playlist).await.unwrap();
        assert!(manager.get_progress(second).await.is_none());
        assert_eq!(manager.states.read().await.len(), 1);
        assert!(manager.get_progress(third).await.is_some());
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, Some(4)), Some(25.0));
        assert_eq!(percentage(0, Some(0)), Some(100.0));
        assert_eq!(percentage(3, None), None);
    }
}
