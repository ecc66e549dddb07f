//! PixelFeed Core - image-to-tensor loading for training pipelines.
//!
//! PixelFeed turns a list of image files into fixed-shape, channel-major
//! `f32` tensors, either one sample at a time through a background prefetch
//! worker or as whole batches assembled on the calling thread.
//!
//! # Architecture
//!
//! ```text
//! Location → Read → Decode → Transforms → Channels → Crop → Scale → Pack → Sample
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use pixelfeed_core::{Config, PixelFeed};
//!
//! #[tokio::main]
//! async fn main() -> pixelfeed_core::Result<()> {
//!     let feed = PixelFeed::new(Config::load()?);
//!     let split = feed.discover("./train".as_ref());
//!
//!     let mut prefetch = feed.prefetch(&split)?;
//!     while prefetch.has_next() {
//!         if let Some(sample) = prefetch.next().await? {
//!             println!("{} -> {:?}", sample.path.display(), sample.label);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod buffer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod tensor;

use std::path::Path;
use std::sync::Arc;

use pipeline::labels::generator_from_config;

// Re-exports for convenient access
pub use buffer::{ElementType, Layout, PixelBuffer, PixelData};
pub use config::Config;
pub use error::{
    BatchLoadError, ChannelConversionError, ConfigError, DecodeError, FeedError, ImageError,
    PrefetchError, Result, SampleLoadError, ShapeMismatchError,
};
pub use pipeline::{
    Batch, BatchBuilder, LabelSet, LocationSource, LocationSplit, PrefetchScheduler,
    RecordPipeline, Sample,
};
pub use tensor::{PackPath, PackReport, Placement, TensorPacker, TensorViewMut};

// Samples and batches expose ndarray types directly.
pub use ndarray;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point wiring a [`Config`] into discovery, labels and loaders.
pub struct PixelFeed {
    config: Config,
}

impl PixelFeed {
    pub fn new(config: Config) -> Self {
        tracing::debug!("Initializing PixelFeed v{}", VERSION);
        Self { config }
    }

    /// Create a PixelFeed instance from the default config file.
    pub fn with_defaults() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self::new(config))
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enumerate supported files under `root`.
    pub fn discover(&self, root: &Path) -> LocationSplit {
        LocationSplit::discover(root, &self.config.processing)
    }

    /// Record pipeline for `split`, with a label set built from the split
    /// when labels are enabled.
    pub fn pipeline(&self, split: &LocationSplit) -> RecordPipeline {
        let loader = RecordPipeline::new(&self.config);
        if !self.config.labels.enabled {
            return loader;
        }
        let generator = generator_from_config(&self.config.labels);
        let labels = LabelSet::from_locations(
            split.locations().iter().map(|p| p.as_path()),
            generator.as_ref(),
            split.root(),
        );
        loader.with_labels(labels, generator)
    }

    /// Start a prefetch worker over `split`.
    pub fn prefetch(&self, split: &LocationSplit) -> Result<PrefetchScheduler> {
        let mut scheduler =
            PrefetchScheduler::new(Arc::new(self.pipeline(split)), &self.config.pipeline);
        scheduler.start(split.source())?;
        Ok(scheduler)
    }

    /// Batch builder over `split`'s label set.
    pub fn batch_builder(&self, split: &LocationSplit) -> BatchBuilder {
        BatchBuilder::new(Arc::new(self.pipeline(split))).with_labels(self.config.labels.enabled)
    }
}
