use crate::assets::MigrationAssets;
use crate::config::DatabaseConfig;
use crate::errors::{AppError, AppResult, RepositoryError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

pub mod groups;
pub mod playlist_items;
pub mod playlists;
pub mod programs;
pub mod stations;

/// Handle to the persistent catalog.
///
/// Every method issues autocommitted statements; there is no transaction
/// spanning an import pass, so rows written before a failure or a
/// cancellation stay in place.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| RepositoryError::connection_failed(format!("{}: {}", config.url, e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");

        let pool_options = if in_memory {
            // An in-memory catalog lives as long as its only connection
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections.unwrap_or(5))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| RepositoryError::connection_failed(format!("{}: {}", config.url, e)))?;

        debug!("Opened catalog at {}", config.url);

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> AppResult<()> {
        self.run_embedded_migrations().await
    }

    async fn run_embedded_migrations(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _schema_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL,
                checksum BLOB NOT NULL,
                execution_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MigrationAssets::get_migrations() {
            // "001_initial_schema.sql" -> 1
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| RepositoryError::MigrationFailed {
                    version: name.clone(),
                    message: "migration file name must start with a numeric version".to_string(),
                })?;

            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _schema_migrations WHERE version = ? AND success = true",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await?;

            if existing > 0 {
                continue;
            }

            let start = std::time::Instant::now();
            let mut transaction = self.pool.begin().await?;

            match sqlx::query(&content).execute(&mut *transaction).await {
                Ok(_) => {
                    let execution_time = start.elapsed().as_millis() as i64;
                    let checksum = Self::calculate_checksum(&content);

                    sqlx::query(
                        r#"
                        INSERT INTO _schema_migrations
                            (version, description, success, checksum, execution_time)
                        VALUES (?, ?, true, ?, ?)
                        "#,
                    )
                    .bind(version)
                    .bind(&name)
                    .bind(&checksum)
                    .bind(execution_time)
                    .execute(&mut *transaction)
                    .await?;

                    transaction.commit().await?;
                    info!("Applied migration: {} ({}ms)", name, execution_time);
                }
                Err(e) => {
                    transaction.rollback().await?;
                    return Err(RepositoryError::MigrationFailed {
                        version: name,
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    fn calculate_checksum(content: &str) -> Vec<u8> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish().to_be_bytes().to_vec()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Build a case-insensitive substring pattern for `LIKE ... ESCAPE '\'`.
///
/// Filters bind both the raw value and this pattern so that an empty value
/// short-circuits to "match everything".
pub(crate) fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Turn a unique-constraint failure from a user-driven write into a
/// repository error naming the constraint.
pub(crate) fn map_unique_violation(err: sqlx::Error, constraint: &str, value: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::constraint_violation(constraint, format!("'{}' already exists", value))
                .into()
        }
        _ => err.into(),
    }
}
