//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::{Config, TransformStep};

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.loader.channels > 4 {
            return Err(ConfigError::ValidationError(
                "loader.channels must be between 0 and 4".into(),
            ));
        }
        if self.pipeline.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.buffer_size must be > 0".into(),
            ));
        }
        if self.pipeline.poll_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.poll_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if let Some(delimiter) = &self.labels.delimiter {
            if delimiter.is_empty() {
                return Err(ConfigError::ValidationError(
                    "labels.delimiter must not be empty".into(),
                ));
            }
        }
        for step in &self.transform.steps {
            if let TransformStep::Channels { channels } = step {
                if !(1..=4).contains(channels) {
                    return Err(ConfigError::ValidationError(format!(
                        "transform channels step must target 1..=4 channels, got {channels}"
                    )));
                }
            }
        }
        Ok(())
    }
}
