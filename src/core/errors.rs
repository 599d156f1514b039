//! Error types shared across the crate.

use thiserror::Error;

/// Startup configuration error. Fatal: the server refuses to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("missing required env var: {0}")]
    Missing(String),
    /// A variable is present but cannot be used.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Failure raised by a text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Completion error from the model provider.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// The collaborator could not produce output.
    #[error("generation failed: {0}")]
    Failed(String),
}

/// Convenience result alias for generation calls.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Persistence layer error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` storage error.
    #[error("sqlite error: {0}")]
    Database(sqlx::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// No pooled connection became available in time.
    #[error("timed out waiting for a database connection")]
    PoolTimeout,
    /// The pool was shut down.
    #[error("connection pool is closed")]
    PoolClosed,
    /// Row does not exist (or is soft-deleted and not requested).
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity table name.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
    /// Parent message missing or from another session.
    #[error("parent message {parent} does not belong to session {session}")]
    InvalidParent {
        /// Parent message id.
        parent: String,
        /// Session the new message belongs to.
        session: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            other => Self::Database(other),
        }
    }
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
