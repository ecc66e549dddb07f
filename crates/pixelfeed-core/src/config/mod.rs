//! Configuration management for pixelfeed.
//!
//! Configuration is loaded from the platform config directory
//! (`pixelfeed/config.toml`) with defaults for every field.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target tensor geometry
    pub loader: LoaderConfig,

    /// Prefetch queue settings
    pub pipeline: PipelineConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Location enumeration
    pub processing: ProcessingConfig,

    /// Label derivation
    pub labels: LabelConfig,

    /// Transform chain
    pub transform: TransformConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.pixelfeed.pixelfeed/config.toml
    /// - Linux: ~/.config/pixelfeed/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\pixelfeed\config\config.toml
    ///
    /// Falls back to ~/.pixelfeed/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "pixelfeed", "pixelfeed")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".pixelfeed").join("config.toml")
            })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transform::FlipMode;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.loader.height, 28);
        assert_eq!(config.loader.channels, 1);
        assert!(!config.loader.center_crop);
        assert_eq!(config.pipeline.poll_timeout_ms, 500);
        assert_eq!(config.limits.max_file_size_mb, 100);
        assert!(config.labels.enabled);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[loader]"));
        assert!(toml.contains("[pipeline]"));
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [loader]
            height = 64
            center_crop = true
            "#,
        )
        .unwrap();
        assert_eq!(config.loader.height, 64);
        assert_eq!(config.loader.width, 28);
        assert!(config.loader.center_crop);
        assert_eq!(config.pipeline.buffer_size, 100);
    }

    #[test]
    fn test_transform_steps_parse_in_order() {
        let config = Config::from_toml(
            r#"
            [transform]
            seed = 7
            steps = [
                { op = "flip", mode = "horizontal" },
                { op = "random_flip" },
                { op = "channels", channels = 3 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(config.transform.seed, Some(7));
        assert_eq!(
            config.transform.steps,
            vec![
                TransformStep::Flip {
                    mode: FlipMode::Horizontal
                },
                TransformStep::RandomFlip,
                TransformStep::Channels { channels: 3 },
            ]
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\npoll_timeout_ms = 50\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline.poll_timeout_ms, 50);
    }

    #[test]
    fn test_load_from_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[loader\nheight = ").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
