//! Resource limits checked around decoding.

use std::path::Path;

use crate::buffer::PixelBuffer;
use crate::config::LimitsConfig;
use crate::error::ImageError;

/// Validates files before and rasters after decoding.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read a whole file after checking its size against the limit.
    pub fn read_checked(&self, path: &Path) -> Result<Vec<u8>, ImageError> {
        let metadata = std::fs::metadata(path)?;
        self.check_size(metadata.len())?;
        Ok(std::fs::read(path)?)
    }

    /// Reject byte counts above `max_file_size_mb`.
    pub fn check_size(&self, len: u64) -> Result<(), ImageError> {
        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if len > max_bytes {
            return Err(ImageError::FileTooLarge {
                size_mb: len / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }
        Ok(())
    }

    /// Reject rasters wider or taller than `max_image_dimension`.
    pub fn check_dimensions(&self, image: &PixelBuffer) -> Result<(), ImageError> {
        let max_dim = self.limits.max_image_dimension;
        if image.width() > max_dim || image.height() > max_dim {
            return Err(ImageError::ImageTooLarge {
                width: image.width(),
                height: image.height(),
                max_dim,
            });
        }
        Ok(())
    }
}
