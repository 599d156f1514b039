//! Core configuration, errors, and identifiers.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{AppConfig, DatabaseConfig, LlmConfig, PoolConfig, ServerConfig};
pub use errors::{ConfigError, GenerationError, GenerationResult, StoreError, StoreResult};
pub use ids::{MessageId, SessionId};
