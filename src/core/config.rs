//! Environment-derived configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::ConfigError;

/// Environment variables accepted for the database name, in priority order.
pub const DB_NAME_VARS: [&str; 3] = ["POSTGRES_DB", "DB_NAME", "ENVIRONMENT"];

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Top-level server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    pub database: DatabaseConfig,
    /// Connection pool settings.
    pub pool: PoolConfig,
    /// HTTP settings.
    pub server: ServerConfig,
    /// Completion model settings.
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as absent.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let name = DB_NAME_VARS
            .iter()
            .find_map(|key| get(*key))
            .ok_or_else(|| ConfigError::Missing(DB_NAME_VARS.join("/")))?;

        let database = DatabaseConfig {
            name,
            dir: get("DB_DIR").map_or_else(|| DatabaseConfig::default().dir, PathBuf::from),
        };

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            size: parse_or("DB_POOL_SIZE", get("DB_POOL_SIZE"), defaults.size)?,
            max_overflow: parse_or("DB_MAX_OVERFLOW", get("DB_MAX_OVERFLOW"), defaults.max_overflow)?,
            timeout_secs: parse_or("DB_POOL_TIMEOUT", get("DB_POOL_TIMEOUT"), defaults.timeout_secs)?,
            pre_ping: defaults.pre_ping,
        };

        let server = ServerConfig {
            port: parse_or("PARLEY_PORT", get("PARLEY_PORT"), DEFAULT_PORT)?,
            allowed_origins: get("ALLOWED_CORS_ORIGINS")
                .map_or_else(|| ServerConfig::default().allowed_origins, |raw| split_origins(&raw)),
        };

        let mut llm = LlmConfig::default();
        if let Some(model) = get("PARLEY_MODEL") {
            llm.model = model;
        }
        llm.base_url = get("PARLEY_OLLAMA_URL");

        let config = Self {
            database,
            pool,
            server,
            llm,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.size == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_SIZE".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.pool.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_TIMEOUT".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.server.allowed_origins.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ALLOWED_CORS_ORIGINS".to_string(),
                reason: "at least one origin is required".to_string(),
            });
        }

        for origin in self.server.allowed_origins.iter().filter(|o| *o != "*") {
            Url::parse(origin)?;
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map_or(Ok(default), |value| {
        value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{value:?} must be an integer ({err})"),
        })
    })
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

/// Database location settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name; the file is `<dir>/<name>.sqlite3`.
    pub name: String,
    /// Directory holding the database file.
    pub dir: PathBuf,
}

impl DatabaseConfig {
    /// Full path of the `SQLite` file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.sqlite3", self.name))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "parley".to_string(),
            dir: PathBuf::from("data"),
        }
    }
}

/// Connection pool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections kept open between requests.
    pub size: usize,
    /// Extra connections allowed under load, closed once idle.
    pub max_overflow: usize,
    /// Seconds to wait for a free connection.
    pub timeout_secs: u64,
    /// Check a pooled connection is alive before handing it out.
    pub pre_ping: bool,
}

impl PoolConfig {
    /// Acquisition timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connections the reader pool keeps open.
    #[must_use]
    pub fn min_connections(&self) -> u32 {
        u32::try_from(self.size).unwrap_or(u32::MAX)
    }

    /// Upper bound on open reader connections, overflow included.
    #[must_use]
    pub fn max_connections(&self) -> u32 {
        u32::try_from(self.size.saturating_add(self.max_overflow)).unwrap_or(u32::MAX)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 20,
            max_overflow: 20,
            timeout_secs: 30,
            pre_ping: true,
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Whether every origin is allowed.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Completion model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "ministral-3:8b-instruct-2512-q8_0".to_string(),
            temperature: 0.4,
            base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_database_name_is_fatal() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_database_name_aliases_in_priority_order() {
        let config =
            AppConfig::from_lookup(lookup(&[("ENVIRONMENT", "staging"), ("DB_NAME", "chat")]))
                .unwrap();
        assert_eq!(config.database.name, "chat");

        let config = AppConfig::from_lookup(lookup(&[
            ("ENVIRONMENT", "staging"),
            ("POSTGRES_DB", "primary"),
        ]))
        .unwrap();
        assert_eq!(config.database.name, "primary");

        let config = AppConfig::from_lookup(lookup(&[("DB_NAME", ""), ("ENVIRONMENT", "dev")]))
            .unwrap();
        assert_eq!(config.database.name, "dev");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DB_NAME", "chat")])).unwrap();
        assert_eq!(config.pool.size, 20);
        assert_eq!(config.pool.max_overflow, 20);
        assert_eq!(config.pool.timeout(), Duration::from_secs(30));
        assert!(config.pool.pre_ping);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.server.allows_any_origin());
        assert_eq!(config.database.path(), PathBuf::from("data/chat.sqlite3"));
    }

    #[test]
    fn test_pool_overrides_and_invalid_integers() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DB_NAME", "chat"),
            ("DB_POOL_SIZE", "5"),
            ("DB_MAX_OVERFLOW", "0"),
            ("DB_POOL_TIMEOUT", "2"),
        ]))
        .unwrap();
        assert_eq!(config.pool.size, 5);
        assert_eq!(config.pool.max_overflow, 0);
        assert_eq!(config.pool.timeout_secs, 2);

        let err = AppConfig::from_lookup(lookup(&[("DB_NAME", "chat"), ("DB_POOL_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "DB_POOL_SIZE"));

        let err = AppConfig::from_lookup(lookup(&[("DB_NAME", "chat"), ("DB_POOL_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_cors_origins_are_split() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DB_NAME", "chat"),
            (
                "ALLOWED_CORS_ORIGINS",
                "https://a.example, https://b.example,",
            ),
        ]))
        .unwrap();
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!config.server.allows_any_origin());
    }

    #[test]
    fn test_invalid_ollama_url_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DB_NAME", "chat"),
            ("PARLEY_OLLAMA_URL", "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Url(_)));
    }

    #[test]
    fn test_invalid_origin_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DB_NAME", "chat"),
            ("ALLOWED_CORS_ORIGINS", "https://ok.example,nonsense"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Url(_)));
    }
}
