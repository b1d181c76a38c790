use tracing::info;

use crate::database::Database;
use crate::errors::AppResult;
use crate::models::StateCounts;

/// Start and end of the station lifecycle sweep around an import pass
pub struct LifecycleSweeper {
    database: Database,
}

impl LifecycleSweeper {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Mark every station Obsolete before the first record is resolved
    pub async fn begin(&self) -> AppResult<u64> {
        let marked = self.database.deactivate_stations().await?;
        info!("Marked {} stations obsolete before import", marked);
        Ok(marked)
    }

    pub async fn report(&self) -> AppResult<StateCounts> {
        let counts = self.database.count_stations_by_state().await?;
        info!(
            "Station states: {} new, {} confirmed, {} obsolete",
            counts.new, counts.confirmed, counts.obsolete
        );
        Ok(counts)
    }

    /// Delete stations left Obsolete; only on explicit confirmation
    pub async fn purge(&self) -> AppResult<u64> {
        self.database.delete_obsolete_stations().await
    }
}
