pub mod ingest_epg;
pub mod ingest_m3u;
pub mod m3u_parser;
pub mod resolver;
pub mod state_manager;
pub mod sweeper;

pub use ingest_epg::EpgIngestor;
pub use ingest_m3u::M3uIngestor;
pub use m3u_parser::{split_attributes, ExtinfEntry, StationRecord};
pub use resolver::{ResolvedStation, StationResolver};
pub use state_manager::{CancellationHandle, IngestionStateManager, ProgressListener};
pub use sweeper::LifecycleSweeper;
