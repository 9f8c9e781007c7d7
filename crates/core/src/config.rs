use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Semaphore;

/// Scheduler tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on nodes executing at the same time, across the whole run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self { max_concurrency }
    }

    /// Load configuration from a TOML file, falling back to defaults when it is absent
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The bound must be positive and fit in a tokio semaphore
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 || self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, 5);
        assert!(config.validate().is_ok());
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_parse_and_validate() {
        let config = EngineConfig::from_toml_str("max_concurrency = 12").unwrap();
        assert_eq!(config.max_concurrency, 12);

        assert!(matches!(
            EngineConfig::from_toml_str("max_concurrency = 0"),
            Err(ConfigError::InvalidConcurrency)
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_concurrency = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_oversized_concurrency_rejected() {
        let oversized = format!("max_concurrency = {}", Semaphore::MAX_PERMITS as u64 + 1);
        assert!(matches!(
            EngineConfig::from_toml_str(&oversized),
            Err(ConfigError::InvalidConcurrency)
        ));
        assert!(matches!(
            EngineConfig::with_max_concurrency(usize::MAX).validate(),
            Err(ConfigError::InvalidConcurrency)
        ));
        assert!(EngineConfig::with_max_concurrency(Semaphore::MAX_PERMITS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency = 3").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config, EngineConfig::with_max_concurrency(3));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("weft.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
