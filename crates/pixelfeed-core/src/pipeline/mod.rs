//! Image loading pipeline components.
//!
//! This module contains all the stages between a file location and a tensor:
//! - **discovery**: Find image files and build the location split
//! - **source**: Pull iterator over locations
//! - **labels**: Label derivation and the sorted label set
//! - **validate**: File size and raster dimension limits
//! - **decode**: Ranked codec strategies (`image` crate, raw PNG fallback)
//! - **transform**: User-configured transform chain
//! - **geometry**: Channel conversion, center crop, scaling
//! - **record**: Orchestrates the stages for one sample
//! - **batch**: Synchronous batch assembly
//! - **prefetch**: Background worker feeding a single consumer over a
//!   bounded queue

pub mod batch;
pub mod context;
pub mod decode;
pub mod discovery;
pub mod fallback;
pub mod geometry;
pub mod labels;
pub mod prefetch;
pub mod record;
pub mod source;
pub mod transform;
pub mod validate;

// Re-exports for convenient access
pub use batch::{one_hot, Batch, BatchBuilder};
pub use context::ThreadCache;
pub use decode::{DecodeStrategy, Decoder, ImageCrateDecoder};
pub use discovery::{FileDiscovery, LocationSplit};
pub use fallback::RawPngDecoder;
pub use geometry::GeometryOps;
pub use labels::{FileNamePatternLabel, LabelGenerator, LabelSet, ParentDirLabel};
pub use prefetch::{PrefetchScheduler, SchedulerState};
pub use record::{RecordPipeline, Sample};
pub use source::LocationSource;
pub use transform::{
    ChannelTransform, FlipMode, FlipTransform, ImageTransform, InspectTransform, RandomFlip,
    TransformChain,
};
pub use validate::Validator;
