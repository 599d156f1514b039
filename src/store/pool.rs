//! Split reader/writer `SQLite` pools in WAL mode.
//!
//! `SQLite` admits a single writer, so every write goes through a
//! one-connection writer pool and waits its turn there instead of failing
//! on a lock upgrade. Reads share a bounded pool of read-only connections:
//! `size` stay open, up to `max_overflow` more are opened under load and
//! closed once idle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::core::config::PoolConfig;
use crate::core::errors::StoreResult;
use crate::store::schema;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle time after which overflow reader connections are closed.
const OVERFLOW_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Reader and writer pools over one database file.
#[derive(Clone, Debug)]
pub struct DatabasePool {
    /// Read-only connections for `SELECT` queries.
    pub reader: SqlitePool,
    /// Single connection serializing every write.
    pub writer: SqlitePool,
    path: PathBuf,
}

impl DatabasePool {
    /// Open both pools on the database at `path` and create the schema.
    ///
    /// The writer opens first so the file exists in WAL mode before any
    /// read-only connection attaches to it.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>, config: &PoolConfig) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let base = SqliteConnectOptions::new()
            .filename(&path)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.timeout())
            .test_before_acquire(config.pre_ping)
            .connect_with(base.clone())
            .await?;

        schema::migrate(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .min_connections(config.min_connections())
            .max_connections(config.max_connections())
            .acquire_timeout(config.timeout())
            .idle_timeout(OVERFLOW_IDLE_TIMEOUT)
            .test_before_acquire(config.pre_ping)
            .connect_with(base.read_only(true))
            .await?;

        debug!(
            path = %path.display(),
            readers = config.max_connections(),
            "Opened database pools"
        );
        Ok(Self {
            reader,
            writer,
            path,
        })
    }

    /// Database file backing the pools.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader connections currently open.
    #[must_use]
    pub fn open_readers(&self) -> u32 {
        self.reader.size()
    }

    /// Close both pools, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}
