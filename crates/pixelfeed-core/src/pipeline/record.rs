//! The "load one sample" operation.
//!
//! Read → decode → transform chain → geometry → pack, followed by label
//! lookup. Every stage failure is reported with the location that caused it.

use ndarray::{Array2, Array4, Axis};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::decode::Decoder;
use super::geometry::GeometryOps;
use super::labels::{LabelGenerator, LabelSet};
use super::transform::TransformChain;
use super::validate::Validator;
use crate::buffer::PixelBuffer;
use crate::config::Config;
use crate::error::{ImageError, SampleLoadError, ShapeMismatchError};
use crate::tensor::{PackReport, Placement, TensorPacker, TensorViewMut};

/// One loaded image and its label.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Location the image was read from
    pub path: PathBuf,
    /// Index into the pipeline's [`LabelSet`]; `None` when labels are off
    /// or the derived label is unknown
    pub label: Option<usize>,
    /// `[1, C, H, W]`, channel-major
    pub tensor: Array4<f32>,
    pub placement: Placement,
}

impl Sample {
    /// `(channels, height, width)` of the packed image.
    pub fn dims(&self) -> (usize, usize, usize) {
        let shape = self.tensor.shape();
        (shape[1], shape[2], shape[3])
    }
}

struct Labels {
    set: LabelSet,
    generator: Box<dyn LabelGenerator>,
}

/// Orchestrates decoding, transforms, geometry and packing for one image.
pub struct RecordPipeline {
    decoder: Decoder,
    transforms: TransformChain,
    geometry: GeometryOps,
    packer: TensorPacker,
    validator: Validator,
    labels: Option<Labels>,
}

impl RecordPipeline {
    /// Build the stages described by `config`. Labels are attached
    /// separately with [`RecordPipeline::with_labels`].
    pub fn new(config: &Config) -> Self {
        Self {
            decoder: Decoder::default(),
            transforms: TransformChain::from_config(&config.transform),
            geometry: GeometryOps::new(&config.loader),
            packer: TensorPacker,
            validator: Validator::new(config.limits.clone()),
            labels: None,
        }
    }

    pub fn with_labels(mut self, set: LabelSet, generator: Box<dyn LabelGenerator>) -> Self {
        self.labels = Some(Labels { set, generator });
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformChain) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn geometry(&self) -> &GeometryOps {
        &self.geometry
    }

    pub fn transforms(&self) -> &TransformChain {
        &self.transforms
    }

    /// Free per-thread stage state held for the calling thread.
    pub fn release_thread(&self) {
        self.transforms.release_thread();
    }

    pub fn labels(&self) -> Option<&LabelSet> {
        self.labels.as_ref().map(|l| &l.set)
    }

    /// Label index for `location`. Unknown labels yield `None`, never an
    /// error.
    pub fn label_index(&self, location: &Path) -> Option<usize> {
        let labels = self.labels.as_ref()?;
        let label = labels.generator.label_for(location)?;
        let index = labels.set.index_of(&label);
        if index.is_none() {
            tracing::trace!(
                path = %location.display(),
                label = %label,
                "Label not in label set"
            );
        }
        index
    }

    /// Read and normalize `location` without packing it.
    pub fn normalize(&self, location: &Path) -> Result<PixelBuffer, SampleLoadError> {
        let bytes = self
            .validator
            .read_checked(location)
            .map_err(|e| SampleLoadError::new(location, e))?;
        self.normalize_bytes(&bytes, location)
    }

    /// Decode and normalize in-memory bytes; `location` is used for error
    /// reporting only.
    pub fn normalize_bytes(
        &self,
        bytes: &[u8],
        location: &Path,
    ) -> Result<PixelBuffer, SampleLoadError> {
        let fail = |e: ImageError| SampleLoadError::new(location, e);
        self.validator.check_size(bytes.len() as u64).map_err(fail)?;

        let started = Instant::now();
        let image = self.decoder.decode(bytes).map_err(|e| fail(e.into()))?;
        self.validator.check_dimensions(&image).map_err(fail)?;
        tracing::trace!(
            path = %location.display(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "decode"
        );

        let started = Instant::now();
        let image = self.transforms.apply(image).map_err(fail)?;
        let image = self.geometry.apply(image).map_err(fail)?;
        tracing::trace!(
            path = %location.display(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "transform"
        );
        Ok(image)
    }

    /// Load `location` into a freshly allocated `[1, C, H, W]` tensor.
    pub fn load_sample(&self, location: &Path) -> Result<Sample, SampleLoadError> {
        let image = self.normalize(location)?;
        self.finish(image, location)
    }

    /// Same as [`RecordPipeline::load_sample`] for bytes already in memory.
    pub fn load_bytes(&self, bytes: &[u8], location: &Path) -> Result<Sample, SampleLoadError> {
        let image = self.normalize_bytes(bytes, location)?;
        self.finish(image, location)
    }

    /// Load `location` as a single `[1, C * H * W]` row, channel-major.
    pub fn load_row_vector(&self, location: &Path) -> Result<Array2<f32>, SampleLoadError> {
        let image = self.normalize(location)?;
        let (c, h, w) = (
            image.channels() as usize,
            image.height() as usize,
            image.width() as usize,
        );
        let mut row = Array2::<f32>::zeros((1, c * h * w));
        let planes = row
            .view_mut()
            .into_shape_with_order((c, h, w))
            .map_err(|_| {
                SampleLoadError::new(
                    location,
                    ShapeMismatchError {
                        expected: c * h * w,
                        channels: c,
                        height: h,
                        width: w,
                        actual: vec![1, c * h * w],
                    },
                )
            })?;
        self.pack(image, TensorViewMut::F32(planes), location)?;
        tracing::debug!(path = %location.display(), len = c * h * w, "Loaded row vector");
        Ok(row)
    }

    /// Load `location` straight into a caller-supplied `[C, H, W]` view.
    pub fn load_into(
        &self,
        location: &Path,
        dst: TensorViewMut<'_>,
    ) -> Result<PackReport, SampleLoadError> {
        let image = self.normalize(location)?;
        self.pack(image, dst, location)
    }

    /// Pack an already normalized image into `dst`.
    pub fn pack(
        &self,
        image: PixelBuffer,
        dst: TensorViewMut<'_>,
        location: &Path,
    ) -> Result<PackReport, SampleLoadError> {
        let started = Instant::now();
        let report = self
            .packer
            .pack(image, dst)
            .map_err(|e| SampleLoadError::new(location, e))?;
        tracing::trace!(
            path = %location.display(),
            elapsed_us = started.elapsed().as_micros() as u64,
            path_kind = ?report.path,
            "pack"
        );
        Ok(report)
    }

    fn finish(&self, image: PixelBuffer, location: &Path) -> Result<Sample, SampleLoadError> {
        let dims = (
            1,
            image.channels() as usize,
            image.height() as usize,
            image.width() as usize,
        );
        let mut tensor = Array4::<f32>::zeros(dims);
        let report = self.pack(
            image,
            TensorViewMut::F32(tensor.index_axis_mut(Axis(0), 0)),
            location,
        )?;
        let label = self.label_index(location);
        tracing::debug!(
            path = %location.display(),
            shape = ?tensor.shape(),
            ?label,
            "Loaded sample"
        );
        Ok(Sample {
            path: location.to_path_buf(),
            label,
            tensor,
            placement: report.placement,
        })
    }
}

impl std::fmt::Debug for RecordPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPipeline")
            .field("decoder", &self.decoder)
            .field("transforms", &self.transforms)
            .field("geometry", &self.geometry)
            .field("labels", &self.labels().map(LabelSet::len))
            .finish()
    }
}
