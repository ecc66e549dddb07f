//! Image decoding through a ranked list of codec strategies.
//!
//! Strategies are tried in order; the first one that both accepts the input
//! and produces a non-empty raster wins.

use image::DynamicImage;
use std::io::Cursor;

use super::fallback::RawPngDecoder;
use crate::buffer::{PixelBuffer, PixelData};
use crate::error::DecodeError;

/// One codec backend.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap check on the leading bytes. Strategies that cannot possibly
    /// parse the input are skipped without attempting a decode.
    fn can_decode(&self, bytes: &[u8]) -> bool;

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, DecodeError>;
}

/// Primary strategy backed by the `image` crate, format guessed from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl DecodeStrategy for ImageCrateDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn can_decode(&self, bytes: &[u8]) -> bool {
        image::guess_format(bytes).is_ok()
    }

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, DecodeError> {
        let codec_error = |message: String| DecodeError::Codec {
            codec: "image",
            message,
        };
        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| codec_error(format!("Cannot detect image format: {}", e)))?
            .decode()
            .map_err(|e| codec_error(e.to_string()))?;

        let (width, height) = (image.width(), image.height());
        let (channels, data) = match image {
            DynamicImage::ImageLuma8(b) => (1, PixelData::U8(b.into_raw())),
            DynamicImage::ImageLumaA8(b) => (2, PixelData::U8(b.into_raw())),
            DynamicImage::ImageRgb8(b) => (3, PixelData::U8(b.into_raw())),
            DynamicImage::ImageRgba8(b) => (4, PixelData::U8(b.into_raw())),
            DynamicImage::ImageLuma16(b) => (1, PixelData::U16(b.into_raw())),
            DynamicImage::ImageLumaA16(b) => (2, PixelData::U16(b.into_raw())),
            DynamicImage::ImageRgb16(b) => (3, PixelData::U16(b.into_raw())),
            DynamicImage::ImageRgba16(b) => (4, PixelData::U16(b.into_raw())),
            DynamicImage::ImageRgb32F(b) => (3, PixelData::F32(b.into_raw())),
            DynamicImage::ImageRgba32F(b) => (4, PixelData::F32(b.into_raw())),
            other => (4, PixelData::F32(other.to_rgba32f().into_raw())),
        };
        PixelBuffer::interleaved(width, height, channels, data)
            .map_err(|e| codec_error(e.to_string()))
    }
}

/// Ranked decoder: the `image` crate first, the raw PNG reader second.
pub struct Decoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(vec![Box::new(ImageCrateDecoder), Box::new(RawPngDecoder)])
    }
}

impl Decoder {
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Decode `bytes` with the first strategy that succeeds.
    ///
    /// A zero-area raster counts as a failure of that strategy. When every
    /// strategy fails the error names each attempt.
    pub fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, DecodeError> {
        let mut failures: Vec<(&'static str, DecodeError)> = Vec::new();

        for strategy in &self.strategies {
            if !strategy.can_decode(bytes) {
                tracing::trace!(strategy = strategy.name(), "Strategy declined input");
                continue;
            }
            match strategy.decode(bytes) {
                Ok(image) if image.is_empty() => {
                    failures.push((
                        strategy.name(),
                        DecodeError::ZeroArea {
                            width: image.width(),
                            height: image.height(),
                        },
                    ));
                }
                Ok(image) => {
                    if !failures.is_empty() {
                        tracing::debug!(
                            strategy = strategy.name(),
                            "Decoded with fallback strategy"
                        );
                    }
                    return Ok(image);
                }
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "Strategy failed");
                    failures.push((strategy.name(), e));
                }
            }
        }

        if failures.len() == 1 {
            if let Some((_, error)) = failures.pop() {
                return Err(error);
            }
        }
        if failures.iter().all(|(_, e)| matches!(e, DecodeError::ZeroArea { .. })) {
            if let Some((_, error)) = failures.pop() {
                return Err(error);
            }
        }
        let tried = if failures.is_empty() {
            self.strategy_names().join(", ")
        } else {
            failures
                .iter()
                .map(|(name, e)| format!("{name}: {e}"))
                .collect::<Vec<_>>()
                .join("; ")
        };
        Err(DecodeError::Unsupported { tried })
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
