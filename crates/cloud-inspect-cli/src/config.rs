use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Ingestion/analysis defaults loadable from a TOML file. Anything not
/// present in the file falls back to the core crate's own constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    /// Tag keys required for tag-compliance checks when none are passed on
    /// the command line.
    #[serde(default)]
    pub default_required_tags: Vec<String>,

    /// Minimum severity printed by `audit` when `--severity` is omitted.
    #[serde(default = "default_severity")]
    pub default_min_severity: String,

    /// Compute and print a summary count only, never the raw JSON body.
    #[serde(default)]
    pub summary_only: bool,
}

fn default_severity() -> String {
    "LOW".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_required_tags: Vec::new(),
            default_min_severity: default_severity(),
            summary_only: false,
        }
    }
}

/// Errors loading or saving a [`CliConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// The file content was not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized back to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Load config from `path`. A missing file yields [`CliConfig::default`]
/// rather than an error.
pub async fn load(path: &Path) -> Result<CliConfig, ConfigError> {
    debug!(path = %path.display(), "loading cli config");

    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let config: CliConfig = toml::from_str(&contents)?;
            info!(path = %path.display(), "loaded cli config");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(CliConfig::default())
        }
        Err(e) => Err(ConfigError::Read(e)),
    }
}

/// Persist `config` to `path`, creating parent directories as needed.
pub async fn save(path: &Path, config: &CliConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string_pretty(config)?;
    tokio::fs::write(path, contents).await?;
    info!(path = %path.display(), "saved cli config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_toml() {
        let config = CliConfig {
            default_required_tags: vec!["Environment".into(), "Owner".into()],
            default_min_severity: "HIGH".into(),
            summary_only: true,
        };
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn parse_empty_file_uses_defaults() {
        let parsed: CliConfig = toml::from_str("").unwrap();
        assert_eq!(parsed, CliConfig::default());
    }

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let config = load(&path).await.unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud-inspect.toml");
        let config = CliConfig {
            default_required_tags: vec!["CostCenter".into()],
            default_min_severity: "MEDIUM".into(),
            summary_only: false,
        };
        save(&path, &config).await.unwrap();
        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
