//! Database layer
//!
//! The canonical store is a single-process embedded SQLite database.
//! WAL journaling with `synchronous=NORMAL` trades a small window of
//! OS-buffered writes for throughput; the busy timeout makes contended
//! writers queue for a bounded wait instead of failing immediately.

pub mod memory_store;
pub mod sqlite_store;
pub mod store;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;

pub use memory_store::MemoryEventStore;
pub use sqlite_store::SqliteEventStore;
pub use store::EventLogStore;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    if let Some(path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            }
        }
    }

    let connect_options = config
        .url
        .parse::<SqliteConnectOptions>()
        .context("Failed to parse database URL")?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await
        .context("Failed to connect to database")?;

    Ok(pool)
}
