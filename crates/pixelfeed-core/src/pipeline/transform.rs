//! User-configurable transform steps applied before geometry normalization.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::context::ThreadCache;
use super::geometry;
use crate::buffer::PixelBuffer;
use crate::config::{TransformConfig, TransformStep};
use crate::error::ImageError;

/// Odd 64-bit constant used to spread per-thread seeds apart.
const SEED_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// Axis selection for [`FlipTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    None,
    /// Upside down (rows reversed)
    Vertical,
    /// Mirror image (columns reversed)
    Horizontal,
    Both,
}

impl FlipMode {
    const ALL: [FlipMode; 4] = [
        FlipMode::None,
        FlipMode::Vertical,
        FlipMode::Horizontal,
        FlipMode::Both,
    ];

    fn axes(self) -> (bool, bool) {
        match self {
            Self::None => (false, false),
            Self::Vertical => (true, false),
            Self::Horizontal => (false, true),
            Self::Both => (true, true),
        }
    }
}

/// One step of a [`TransformChain`].
///
/// `rng` is `Some` only when the chain was built with a seed; randomized
/// steps must behave as the identity without it.
pub trait ImageTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(
        &self,
        image: PixelBuffer,
        rng: Option<&mut StdRng>,
    ) -> Result<PixelBuffer, ImageError>;
}

/// Deterministic flip.
#[derive(Debug, Clone, Copy)]
pub struct FlipTransform {
    pub mode: FlipMode,
}

impl ImageTransform for FlipTransform {
    fn name(&self) -> &'static str {
        "flip"
    }

    fn transform(
        &self,
        image: PixelBuffer,
        _rng: Option<&mut StdRng>,
    ) -> Result<PixelBuffer, ImageError> {
        flip(image, self.mode)
    }
}

/// Flip with a mode drawn uniformly from the chain's random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomFlip;

impl ImageTransform for RandomFlip {
    fn name(&self) -> &'static str {
        "random_flip"
    }

    fn transform(
        &self,
        image: PixelBuffer,
        rng: Option<&mut StdRng>,
    ) -> Result<PixelBuffer, ImageError> {
        match rng {
            Some(rng) => flip(image, FlipMode::ALL[rng.gen_range(0..FlipMode::ALL.len())]),
            None => Ok(image),
        }
    }
}

/// Channel count conversion as a chain step.
#[derive(Debug, Clone, Copy)]
pub struct ChannelTransform {
    pub channels: u8,
}

impl ImageTransform for ChannelTransform {
    fn name(&self) -> &'static str {
        "channels"
    }

    fn transform(
        &self,
        image: PixelBuffer,
        _rng: Option<&mut StdRng>,
    ) -> Result<PixelBuffer, ImageError> {
        geometry::convert_channels(image, self.channels)
    }
}

/// `(width, height, channels)` seen around a wrapped step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    pub before: (u32, u32, u8),
    pub after: (u32, u32, u8),
}

/// Wraps a step and records the dimensions it was given and produced.
pub struct InspectTransform {
    inner: Box<dyn ImageTransform>,
    last: Mutex<Option<Inspection>>,
}

impl InspectTransform {
    pub fn new(inner: impl ImageTransform + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            last: Mutex::new(None),
        }
    }

    /// Dimensions recorded by the most recent successful call.
    pub fn last(&self) -> Option<Inspection> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImageTransform for InspectTransform {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn transform(
        &self,
        image: PixelBuffer,
        rng: Option<&mut StdRng>,
    ) -> Result<PixelBuffer, ImageError> {
        let before = dims(&image);
        let out = self.inner.transform(image, rng)?;
        let inspection = Inspection {
            before,
            after: dims(&out),
        };
        tracing::debug!(
            step = self.inner.name(),
            before = ?inspection.before,
            after = ?inspection.after,
            "Transform step inspected"
        );
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(inspection);
        Ok(out)
    }
}

/// Ordered list of transform steps.
///
/// With a seed, every thread that runs the chain gets its own `StdRng`,
/// seeded from the chain seed and the thread's ordinal.
pub struct TransformChain {
    steps: Vec<Box<dyn ImageTransform>>,
    seed: Option<u64>,
    rngs: ThreadCache<StdRng>,
}

impl TransformChain {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            steps: Vec::new(),
            seed,
            rngs: ThreadCache::new(),
        }
    }

    /// Build the chain described by the `[transform]` config section.
    pub fn from_config(config: &TransformConfig) -> Self {
        config
            .steps
            .iter()
            .fold(Self::new(config.seed), |chain, step| match *step {
                TransformStep::Flip { mode } => chain.with_step(FlipTransform { mode }),
                TransformStep::RandomFlip => chain.with_step(RandomFlip),
                TransformStep::Channels { channels } => {
                    chain.with_step(ChannelTransform { channels })
                }
            })
    }

    /// Append a step.
    pub fn with_step(mut self, step: impl ImageTransform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of threads holding a random source for this chain.
    pub fn rng_count(&self) -> usize {
        self.rngs.len()
    }

    /// Drop the calling thread's random source.
    pub fn release_thread(&self) {
        self.rngs.release();
    }

    /// Run every step in order.
    pub fn apply(&self, image: PixelBuffer) -> Result<PixelBuffer, ImageError> {
        if self.steps.is_empty() {
            return Ok(image);
        }
        match self.seed {
            Some(seed) => self.rngs.with(
                |ordinal| {
                    StdRng::seed_from_u64(seed.wrapping_add((ordinal as u64).wrapping_mul(SEED_SPREAD)))
                },
                |rng| self.run(image, Some(rng)),
            ),
            None => self.run(image, None),
        }
    }

    fn run(
        &self,
        mut image: PixelBuffer,
        mut rng: Option<&mut StdRng>,
    ) -> Result<PixelBuffer, ImageError> {
        for step in &self.steps {
            image = step.transform(image, rng.as_deref_mut())?;
        }
        Ok(image)
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("seed", &self.seed)
            .finish()
    }
}

fn dims(image: &PixelBuffer) -> (u32, u32, u8) {
    (image.width(), image.height(), image.channels())
}

fn flip(image: PixelBuffer, mode: FlipMode) -> Result<PixelBuffer, ImageError> {
    let (rows, cols) = mode.axes();
    if !rows && !cols {
        return Ok(image);
    }
    let (w, h) = (image.width() as usize, image.height() as usize);
    PixelBuffer::from_fn(
        image.width(),
        image.height(),
        image.channels(),
        image.element_type(),
        |y, x, k| {
            let sy = if rows { h - 1 - y } else { y };
            let sx = if cols { w - 1 - x } else { x };
            image.sample(sy, sx, k)
        },
    )
}
