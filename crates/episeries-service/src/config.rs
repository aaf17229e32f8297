//! Server configuration.
//!
//! Read from TOML; every section is optional and falls back to defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use episeries_core::EngineOptions;

/// Query timeout bounds, in seconds.
pub const TIMEOUT_SECS_RANGE: std::ops::RangeInclusive<u64> = 1..=600;
/// Series range bounds, in days.
pub const RANGE_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=36_600;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Load from the default path, or defaults when no file exists there.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a file and reject it unless it validates.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let io = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(path, text).map_err(io)
    }

    /// Check every section and report all problems at once.
    ///
    /// # Example
    ///
    /// ```
    /// use episeries_service::Config;
    ///
    /// let mut config = Config::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.query.timeout_secs = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems: Vec<ValidationError> = self
            .server
            .validate()
            .into_iter()
            .chain(self.storage.validate())
            .chain(self.query.validate())
            .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on, e.g. `127.0.0.1:8080`.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// The bind address as a socket address.
    pub fn addr(&self) -> Result<SocketAddr, ValidationError> {
        self.bind.parse().map_err(|_| {
            ValidationError::new(
                "server.bind",
                format!("'{}' is not a socket address (host:port)", self.bind),
            )
        })
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        match self.addr() {
            Ok(addr) if addr.port() == 0 => {
                vec![ValidationError::new("server.bind", "port cannot be 0")]
            }
            Ok(_) => Vec::new(),
            Err(problem) => vec![problem],
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: episeries_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        if self.path.as_os_str().is_empty() {
            vec![ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            )]
        } else {
            Vec::new()
        }
    }
}

/// Limits applied to every series query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound for each storage call, in seconds.
    pub timeout_secs: u64,
    /// Longest series a single request may produce, in days.
    pub max_range_days: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            timeout_secs: options.query_timeout.as_secs(),
            max_range_days: options.max_range_days,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut problems = Vec::new();

        if !TIMEOUT_SECS_RANGE.contains(&self.timeout_secs) {
            problems.push(ValidationError::new(
                "query.timeout_secs",
                format!(
                    "{} is outside {}-{} seconds",
                    self.timeout_secs,
                    TIMEOUT_SECS_RANGE.start(),
                    TIMEOUT_SECS_RANGE.end()
                ),
            ));
        }
        if !RANGE_DAYS_RANGE.contains(&self.max_range_days) {
            problems.push(ValidationError::new(
                "query.max_range_days",
                format!(
                    "{} is outside {}-{} days",
                    self.max_range_days,
                    RANGE_DAYS_RANGE.start(),
                    RANGE_DAYS_RANGE.end()
                ),
            ));
        }

        problems
    }

    /// Engine limits for these settings.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            query_timeout: Duration::from_secs(self.timeout_secs),
            max_range_days: self.max_range_days,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Invalid configuration:\n{}", list(.0))]
    Validation(Vec<ValidationError>),
}

/// One invalid setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the setting, e.g. `query.timeout_secs`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn list(problems: &[ValidationError]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<config dir>/episeries/server.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("episeries")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr().unwrap().port(), 8080);
        assert_eq!(config.storage.path, episeries_store::default_db_path());
        assert_eq!(config.query.timeout_secs, 30);
        assert_eq!(config.query.max_range_days, 3660);
        assert!(config.validate().is_ok());
        assert!(default_config_path().ends_with("episeries/server.toml"));
    }

    #[test]
    fn test_save_creates_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.storage.path = PathBuf::from("/srv/episeries.db");
        config.query.timeout_secs = 5;
        config.save(&path).unwrap();

        let loaded = Config::load_validated(&path).unwrap();
        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/srv/episeries.db"));
        assert_eq!(loaded.query.timeout_secs, 5);
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load("/nonexistent/episeries/server.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[query\ntimeout_secs = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[query]\nmax_range_days = 90\n").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.query.timeout_secs, 30);
        assert_eq!(config.query.max_range_days, 90);
    }

    #[test]
    fn test_bind_validation() {
        let bind = |s: &str| ServerConfig {
            bind: s.to_string(),
        };
        assert!(bind("[::1]:8080").validate().is_empty());
        assert_eq!(bind("127.0.0.1:0").validate()[0].message, "port cannot be 0");
        for bad in ["", "127.0.0.1", "localhost:8080", "127.0.0.1:http"] {
            let problems = bind(bad).validate();
            assert_eq!(problems.len(), 1, "{bad}");
            assert_eq!(problems[0].field, "server.bind");
        }
    }

    #[test]
    fn test_query_limits() {
        let query = |timeout_secs, max_range_days| QueryConfig {
            timeout_secs,
            max_range_days,
        };
        assert!(query(1, 1).validate().is_empty());
        assert!(query(600, 36_600).validate().is_empty());

        let fields: Vec<String> = query(0, 36_601)
            .validate()
            .into_iter()
            .map(|p| p.field)
            .collect();
        assert_eq!(fields, vec!["query.timeout_secs", "query.max_range_days"]);
    }

    #[test]
    fn test_validation_reports_every_section() {
        let config = Config {
            server: ServerConfig {
                bind: "nowhere".to_string(),
            },
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            query: QueryConfig {
                timeout_secs: 3600,
                max_range_days: 10,
            },
        };

        let err = config.validate().unwrap_err();
        let ConfigError::Validation(problems) = &err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(problems.len(), 3);

        let message = err.to_string();
        for field in ["server.bind", "storage.path", "query.timeout_secs"] {
            assert!(message.contains(field), "{field}");
        }
    }

    #[test]
    fn test_engine_options() {
        let options = QueryConfig {
            timeout_secs: 7,
            max_range_days: 90,
        }
        .engine_options();
        assert_eq!(options.query_timeout, Duration::from_secs(7));
        assert_eq!(options.max_range_days, 90);
    }
}
