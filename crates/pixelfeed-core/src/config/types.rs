//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

use crate::pipeline::transform::FlipMode;

/// Target tensor geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Target height in pixels (0 keeps the source height)
    pub height: u32,

    /// Target width in pixels (0 keeps the source width)
    pub width: u32,

    /// Target channel count (0 keeps the source channels)
    pub channels: u8,

    /// Crop the longer side symmetrically before scaling
    pub center_crop: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            height: 28,
            width: 28,
            channels: 1,
            center_crop: false,
        }
    }
}

/// Prefetch queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max samples buffered between the prefetch worker and the consumer
    pub buffer_size: usize,

    /// How long `next` waits on an empty queue, in milliseconds
    pub poll_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            poll_timeout_ms: 500,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
        }
    }
}

/// Location enumeration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// File extensions accepted when walking a directory
    pub supported_formats: Vec<String>,

    /// Shuffle discovered locations with this seed
    pub shuffle_seed: Option<u64>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            supported_formats: [
                "bmp", "gif", "jpg", "jpeg", "jp2", "pbm", "pgm", "ppm", "pnm", "png", "tif",
                "tiff", "exr", "webp",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            shuffle_seed: None,
        }
    }
}

/// Label derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Attach a label index to every sample
    pub enabled: bool,

    /// Derive labels from the file name split on this delimiter instead of
    /// the parent directory name
    pub delimiter: Option<String>,

    /// Which segment of the split file name is the label
    pub position: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delimiter: None,
            position: 0,
        }
    }
}

/// One configured transform step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformStep {
    /// Deterministic flip
    Flip { mode: FlipMode },
    /// Flip chosen from the chain's random source
    RandomFlip,
    /// Channel count conversion
    Channels { channels: u8 },
}

/// Transform chain applied before geometry normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Seed for randomized steps; without it random steps are no-ops
    pub seed: Option<u64>,

    /// Ordered steps
    pub steps: Vec<TransformStep>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
