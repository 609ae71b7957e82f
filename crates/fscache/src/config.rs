//! Registry and backend configuration, read from RON.
//!
//! ```ron
//! (
//!     auto_create: true,
//!     call_timeout_ms: Some(5000),
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default suffix remote uploads carry until they complete.
pub const DEFAULT_PARTIAL_WRITE_SUFFIX: &str = "_COPYING_";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Registry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Create missing paths on first registration.
    pub auto_create: bool,
    /// Deadline for each delegated backend call. `None` waits forever.
    pub call_timeout_ms: Option<u64>,
}

impl RegistryConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_ron(&text)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Settings for [`DistributedBackend`](crate::backends::DistributedBackend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    /// Cluster URI, reported in log records.
    pub uri: String,
    /// Children whose name ends with this are hidden from listings.
    /// Empty disables the filter.
    pub partial_write_suffix: String,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            partial_write_suffix: DEFAULT_PARTIAL_WRITE_SUFFIX.to_string(),
        }
    }
}

impl DistributedConfig {
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_ron(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_config_defaults() {
        let config = RegistryConfig::from_ron("()").unwrap();
        assert!(!config.auto_create);
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn test_registry_config_parse() {
        let config = RegistryConfig::from_ron(
            r#"(
                auto_create: true,
                call_timeout_ms: Some(250),
            )"#,
        )
        .unwrap();
        assert!(config.auto_create);
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_distributed_config_parse() {
        let config = DistributedConfig::from_ron(r#"(uri: "dfs://namenode:8020")"#).unwrap();
        assert_eq!(config.uri, "dfs://namenode:8020");
        assert_eq!(config.partial_write_suffix, "_COPYING_");

        let config = DistributedConfig::from_ron(r#"(partial_write_suffix: "")"#).unwrap();
        assert!(config.partial_write_suffix.is_empty());
    }

    #[test]
    fn test_bad_ron() {
        let err = RegistryConfig::from_ron("(auto_create: maybe)").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.ron");
        std::fs::write(&path, "(auto_create: true)").unwrap();

        let config = RegistryConfig::load(&path).await.unwrap();
        assert!(config.auto_create);

        let err = RegistryConfig::load(dir.path().join("missing.ron"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
