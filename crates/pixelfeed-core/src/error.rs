//! Error types for the pixelfeed loading pipeline.
//!
//! Errors are organized by stage: codec failures, geometry failures and
//! packing failures are collected into [`ImageError`], which is then wrapped
//! with the offending location ([`SampleLoadError`]) and, for batches, with
//! the item index ([`BatchLoadError`]).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for pixelfeed operations.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A single sample could not be loaded
    #[error(transparent)]
    Sample(#[from] SampleLoadError),

    /// A batch could not be assembled
    #[error(transparent)]
    Batch(#[from] BatchLoadError),

    /// The background prefetch worker failed or was misused
    #[error("Prefetch error: {0}")]
    Prefetch(#[from] PrefetchError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Neither the primary nor the fallback codec produced an image.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// No strategy accepted the input
    #[error("Could not decode image (tried: {tried})")]
    Unsupported { tried: String },

    /// A codec recognised the input but failed while parsing it
    #[error("{codec} decoder failed: {message}")]
    Codec { codec: &'static str, message: String },

    /// The decoded raster has no pixels
    #[error("Decoded image has zero area ({width}x{height})")]
    ZeroArea { width: u32, height: u32 },
}

/// Unsupported channel-count transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Cannot convert from {from} to {to} channels")]
pub struct ChannelConversionError {
    pub from: u8,
    pub to: u8,
}

/// Destination tensor does not match the source pixel count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Tensor provided to store image not equal to image: expected {expected} elements \
     ({channels}x{height}x{width}), destination has shape {actual:?}"
)]
pub struct ShapeMismatchError {
    pub expected: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub actual: Vec<usize>,
}

/// Stage-level failure while turning one image into a tensor.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    ChannelConversion(#[from] ChannelConversionError),

    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),

    /// Buffer metadata does not describe its storage
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// File exceeds size limit
    #[error("File too large ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge { size_mb: u64, max_mb: u64 },

    /// Image dimensions exceed limit
    #[error("Image too large ({width}x{height} > {max_dim})")]
    ImageTooLarge { width: u32, height: u32, max_dim: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An [`ImageError`] annotated with the location that caused it.
#[derive(Error, Debug)]
#[error("Failed to load {path}: {cause}")]
pub struct SampleLoadError {
    pub path: PathBuf,
    #[source]
    pub cause: ImageError,
}

impl SampleLoadError {
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<ImageError>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}

/// A batch item failed; the whole batch is abandoned.
#[derive(Error, Debug)]
#[error("Batch item {index} failed: {source}")]
pub struct BatchLoadError {
    pub index: usize,
    pub source: SampleLoadError,
}

impl BatchLoadError {
    /// Location of the item that aborted the batch.
    pub fn path(&self) -> &std::path::Path {
        &self.source.path
    }
}

/// Errors surfaced by the prefetch scheduler.
#[derive(Error, Debug)]
pub enum PrefetchError {
    /// `next` was called before `start`
    #[error("Prefetch scheduler has not been started")]
    NotStarted,

    /// `start` or `reset` was called after `shutdown`
    #[error("Prefetch scheduler has been shut down")]
    ShutDown,

    /// The background worker stopped on a failed sample
    #[error("Prefetch worker stopped: {0}")]
    WorkerFailed(#[source] SampleLoadError),

    /// The background worker could not be spawned
    #[error("Failed to spawn prefetch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Convenience type alias for pixelfeed results.
pub type Result<T> = std::result::Result<T, FeedError>;
