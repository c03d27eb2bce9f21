//! Application configuration.
//!
//! Settings are read from an `hmpi.toml` file (all sections optional) and
//! then overridden from environment variables. The result is resolved once at
//! startup and handed to the components that need it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::db::RepositoryType;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment environment. Error details are only exposed in development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Which index strategy the process runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    #[default]
    Mock,
    Remote,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "remote" | "real" => Ok(Self::Remote),
            other => Err(format!("Unknown scoring mode: {}", other)),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

/// Repository type settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type", default = "default_repo_type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: default_repo_type(),
        }
    }
}

/// Index calculator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub mode: ScoringMode,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_mock_latency_ms")]
    pub mock_latency_ms: u64,
    /// Upper bound on concurrently scored sample chunks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Metals declared for single-sample scoring.
    #[serde(default = "default_metals")]
    pub default_metals: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::default(),
            endpoint_url: None,
            timeout_ms: default_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            mock_latency_ms: default_mock_latency_ms(),
            workers: default_workers(),
            default_metals: default_metals(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_mb() -> usize {
    50
}

fn default_repo_type() -> String {
    "local".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_mock_latency_ms() -> u64 {
    1_000
}

fn default_workers() -> usize {
    4
}

pub fn default_metals() -> Vec<String> {
    [
        "arsenic", "cadmium", "chromium", "lead", "mercury", "zinc", "copper", "iron",
        "manganese", "nickel",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `hmpi.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// Falls back to defaults when no file exists.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from("hmpi.toml"),
            PathBuf::from("backend/hmpi.toml"),
            PathBuf::from("../hmpi.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                tracing::info!(path = %path.display(), "Loading configuration file");
                return Self::from_file(&path);
            }
        }

        tracing::info!("No hmpi.toml found, using default configuration");
        Ok(Self::default())
    }

    /// Default-location config with process environment overrides, validated.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::from_default_location()?.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by environment-variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        let app_env = get("APP_ENV")
            .map(|env| env.parse::<Environment>())
            .transpose()
            .map_err(ConfigError::Invalid)?;
        if let Some(env) = app_env {
            self.server.environment = env;
        }
        if let Some(repo) = get("REPOSITORY_TYPE") {
            self.repository.repo_type = repo;
        }
        match get("SCORING_MODE") {
            Some(mode) => self.scoring.mode = mode.parse().map_err(ConfigError::Invalid)?,
            // A development process scores locally unless told otherwise.
            None if app_env == Some(Environment::Development) => {
                self.scoring.mode = ScoringMode::Mock
            }
            None => {}
        }
        if let Some(url) = get("SCORING_API_URL") {
            self.scoring.endpoint_url = Some(url);
        }
        if let Some(timeout) = get("SCORING_TIMEOUT_MS") {
            self.scoring.timeout_ms = parse_var("SCORING_TIMEOUT_MS", &timeout)?;
        }
        if let Some(latency) = get("MOCK_LATENCY_MS") {
            self.scoring.mock_latency_ms = parse_var("MOCK_LATENCY_MS", &latency)?;
        }
        if get("USE_MOCK").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false) {
            self.scoring.mode = ScoringMode::Mock;
        }

        Ok(self)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.repository_type().map_err(ConfigError::Invalid)?;
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::Invalid("server.max_upload_mb must be positive".into()));
        }
        if self.scoring.workers == 0 {
            return Err(ConfigError::Invalid("scoring.workers must be positive".into()));
        }
        if self.scoring.timeout_ms == 0 || self.scoring.health_timeout_ms == 0 {
            return Err(ConfigError::Invalid("scoring timeouts must be positive".into()));
        }
        if self.scoring.mode == ScoringMode::Remote
            && self.scoring.endpoint_url.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            return Err(ConfigError::Invalid(
                "scoring.endpoint_url is required when scoring.mode = \"remote\"".into(),
            ));
        }
        Ok(())
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    pub fn is_development(&self) -> bool {
        self.server.environment == Environment::Development
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: '{}'", name, value)))
}
