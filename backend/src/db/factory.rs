//! Repository factory.
//!
//! Turns the `[repository]` section of the configuration into a shared
//! repository handle for the services.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::repositories::LocalRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::config::AppConfig;

/// Available repository backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// In-memory store; contents are lost on restart.
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Accepts `local`, `memory` and `in-memory`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "memory" | "in-memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryType::Local => f.write_str("local"),
        }
    }
}

pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn create(repo_type: RepositoryType) -> Arc<dyn FullRepository> {
        match repo_type {
            RepositoryType::Local => Arc::new(LocalRepository::new()),
        }
    }

    /// Build the repository named by `config`.
    pub fn from_config(config: &AppConfig) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = config.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;
        tracing::info!(repository = %repo_type, "Creating repository");
        Ok(Self::create(repo_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_type_aliases() {
        for name in ["local", "Memory", " in-memory "] {
            assert_eq!(RepositoryType::from_str(name).unwrap(), RepositoryType::Local);
        }
        assert!(RepositoryType::from_str("postgres").is_err());
        assert_eq!(RepositoryType::Local.to_string(), "local");
    }

    #[tokio::test]
    async fn test_created_repository_is_healthy() {
        let repo = RepositoryFactory::create(RepositoryType::Local);
        assert!(crate::db::health_check(repo.as_ref()).await.unwrap());
    }

    #[test]
    fn test_from_config_rejects_unknown_type() {
        let mut config = AppConfig::default();
        assert!(RepositoryFactory::from_config(&config).is_ok());
        config.repository.repo_type = "mongo".to_string();
        assert!(matches!(
            RepositoryFactory::from_config(&config),
            Err(RepositoryError::ConfigurationError { .. })
        ));
    }
}
