//! Persistence for chat sessions and threaded messages.
//!
//! Rows are never removed: deleting marks `deleted_at`, and reads hide marked
//! rows unless asked otherwise through [`ReadOptions`].

pub mod lifecycle;
pub mod message;
pub mod pool;
pub mod repository;
pub mod schema;
pub mod session;
pub mod tree;

use std::path::Path;

use tracing::info;

pub use lifecycle::SoftDeleteState;
pub use message::{ChatMessage, MessageRepository, NewMessage};
pub use pool::DatabasePool;
pub use repository::{
    DeleteReport, Filter, FilterValue, ReadOptions, SoftDeletable, SoftDeleteRepository,
};
pub use session::{ChatSession, SessionRepository, SessionWithMessages, DEFAULT_TITLE};
pub use tree::MessageTree;

use crate::core::config::{DatabaseConfig, PoolConfig};
use crate::core::errors::StoreResult;

/// Open database with its repositories.
#[derive(Clone)]
pub struct Store {
    pool: DatabasePool,
    /// Session operations.
    pub sessions: SessionRepository,
    /// Message operations.
    pub messages: MessageRepository,
}

impl Store {
    /// Open the configured database, creating its directory and schema if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or migration fails.
    pub async fn open(database: &DatabaseConfig, pool: PoolConfig) -> StoreResult<Self> {
        tokio::fs::create_dir_all(&database.dir).await?;
        Self::open_at(database.path(), pool).await
    }

    /// Open the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open_at(path: impl AsRef<Path>, config: PoolConfig) -> StoreResult<Self> {
        let pool = DatabasePool::open(path, &config).await?;
        info!(
            path = %pool.path().display(),
            readers = pool.open_readers(),
            "Store opened"
        );
        Ok(Self {
            sessions: SessionRepository::new(&pool),
            messages: MessageRepository::new(&pool),
            pool,
        })
    }

    /// Underlying reader and writer pools.
    #[must_use]
    pub const fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Close the pools. Later operations fail with a closed-pool error.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Store closed");
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_directory_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseConfig {
            name: "dev".to_string(),
            dir: dir.path().join("nested"),
        };

        let store = Store::open(&database, PoolConfig::default()).await.unwrap();
        assert!(database.path().exists());

        // Reopening runs the idempotent migration again.
        let reopened = Store::open(&database, PoolConfig::default()).await.unwrap();
        let session = store.sessions.create(None).await.unwrap();
        assert!(reopened
            .sessions
            .find(session.id, ReadOptions::live())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_at(dir.path().join("closed.sqlite3"), PoolConfig::default())
            .await
            .unwrap();
        store.close().await;

        let err = store.sessions.list(ReadOptions::live()).await.unwrap_err();
        assert!(matches!(err, crate::core::errors::StoreError::PoolClosed));
    }
}
