//! Synchronous batch assembly into one pre-allocated `[N, C, H, W]` tensor.

use ndarray::{Array2, Array4, ArrayViewMut4, Axis, Slice};
use std::path::PathBuf;
use std::sync::Arc;

use super::record::RecordPipeline;
use crate::error::{BatchLoadError, SampleLoadError, ShapeMismatchError};
use crate::tensor::TensorViewMut;

/// Features and optional one-hot labels for a list of locations.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[N, C, H, W]`
    pub features: Array4<f32>,
    /// `[N, num_labels]`, present when labels were requested and the
    /// pipeline has a label set
    pub labels: Option<Array2<f32>>,
    pub label_indices: Vec<Option<usize>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.features.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Packs every sample of a batch directly into its slice of the batch
/// tensor on the calling thread.
pub struct BatchBuilder {
    pipeline: Arc<RecordPipeline>,
    append_labels: bool,
}

impl BatchBuilder {
    pub fn new(pipeline: Arc<RecordPipeline>) -> Self {
        Self {
            pipeline,
            append_labels: true,
        }
    }

    pub fn with_labels(mut self, append_labels: bool) -> Self {
        self.append_labels = append_labels;
        self
    }

    /// Load `locations` in order. The first failing item aborts the batch.
    pub fn build(&self, locations: &[PathBuf]) -> Result<Batch, BatchLoadError> {
        let (features, label_indices) = match self.pipeline.geometry().fixed_shape() {
            Some((c, h, w)) => {
                let mut features = Array4::<f32>::zeros((locations.len(), c, h, w));
                let indices = self.build_into(locations, features.view_mut())?;
                (features, indices)
            }
            None => self.build_open_shape(locations)?,
        };

        let labels = match (self.append_labels, self.pipeline.labels()) {
            (true, Some(set)) => Some(one_hot(&label_indices, set.len())),
            _ => None,
        };
        tracing::debug!(
            items = locations.len(),
            shape = ?features.shape(),
            labelled = labels.is_some(),
            "Batch built"
        );
        Ok(Batch {
            features,
            labels,
            label_indices,
        })
    }

    /// Pack `locations` into the leading slices of `features`, returning the
    /// label index of each item.
    pub fn build_into(
        &self,
        locations: &[PathBuf],
        mut features: ArrayViewMut4<'_, f32>,
    ) -> Result<Vec<Option<usize>>, BatchLoadError> {
        let rows = features.len_of(Axis(0));
        if let Some(location) = locations.get(rows) {
            let shape = features.shape();
            let (c, h, w) = (shape[1], shape[2], shape[3]);
            return Err(BatchLoadError {
                index: rows,
                source: SampleLoadError::new(
                    location,
                    ShapeMismatchError {
                        expected: c * h * w,
                        channels: c,
                        height: h,
                        width: w,
                        actual: Vec::new(),
                    },
                ),
            });
        }

        let mut indices = Vec::with_capacity(locations.len());
        for (index, location) in locations.iter().enumerate() {
            let slot = features.index_axis_mut(Axis(0), index);
            self.pipeline
                .load_into(location, TensorViewMut::F32(slot))
                .map_err(|source| BatchLoadError { index, source })?;
            indices.push(self.pipeline.label_index(location));
        }
        Ok(indices)
    }

    /// Shape comes from the first normalized sample when the loader config
    /// leaves a dimension open.
    fn build_open_shape(
        &self,
        locations: &[PathBuf],
    ) -> Result<(Array4<f32>, Vec<Option<usize>>), BatchLoadError> {
        let Some((first, rest)) = locations.split_first() else {
            return Ok((Array4::zeros((0, 0, 0, 0)), Vec::new()));
        };
        let image = self
            .pipeline
            .normalize(first)
            .map_err(|source| BatchLoadError { index: 0, source })?;
        let dims = (
            locations.len(),
            image.channels() as usize,
            image.height() as usize,
            image.width() as usize,
        );
        let mut features = Array4::<f32>::zeros(dims);
        self.pipeline
            .pack(
                image,
                TensorViewMut::F32(features.index_axis_mut(Axis(0), 0)),
                first,
            )
            .map_err(|source| BatchLoadError { index: 0, source })?;

        let mut indices = vec![self.pipeline.label_index(first)];
        let tail = features.slice_axis_mut(Axis(0), Slice::from(1usize..));
        let rest_indices = self.build_into(rest, tail).map_err(|e| BatchLoadError {
            index: e.index + 1,
            source: e.source,
        })?;
        indices.extend(rest_indices);
        Ok((features, indices))
    }
}

/// `[N, num_labels]` matrix with a single 1 per row at the label index.
///
/// Rows whose label is unknown stay all zero.
pub fn one_hot(indices: &[Option<usize>], num_labels: usize) -> Array2<f32> {
    let mut matrix = Array2::<f32>::zeros((indices.len(), num_labels));
    for (row, index) in indices.iter().enumerate() {
        match index {
            Some(col) if *col < num_labels => matrix[[row, *col]] = 1.0,
            _ => tracing::warn!(row, "Sample has no known label; one-hot row left empty"),
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ImageError;
    use crate::pipeline::labels::{LabelSet, ParentDirLabel};
    use image::{GrayImage, Luma};
    use std::path::Path;

    fn write_gray(path: &Path, w: u32, h: u32, value: u8) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_pixel(w, h, Luma([value])).save(path).unwrap();
    }

    fn pipeline(h: u32, w: u32) -> RecordPipeline {
        let mut config = Config::default();
        config.loader.height = h;
        config.loader.width = w;
        RecordPipeline::new(&config)
    }

    #[test]
    fn test_one_hot_rows() {
        let m = one_hot(&[Some(1), Some(0), None], 2);
        assert_eq!(m.row(0).to_vec(), vec![0.0, 1.0]);
        assert_eq!(m.row(1).to_vec(), vec![1.0, 0.0]);
        assert_eq!(m.row(2).sum(), 0.0);
    }

    #[test]
    fn test_build_packs_each_slice() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("cat/a.png");
        let b = dir.path().join("dog/b.png");
        write_gray(&a, 4, 4, 10);
        write_gray(&b, 8, 4, 20);

        let set = LabelSet::new(["cat".to_string(), "dog".to_string()]);
        let builder = BatchBuilder::new(Arc::new(
            pipeline(4, 4).with_labels(set, Box::new(ParentDirLabel)),
        ));
        let batch = builder.build(&[b.clone(), a.clone()]).unwrap();

        assert_eq!(batch.features.shape(), &[2, 1, 4, 4]);
        assert!(batch.features.index_axis(Axis(0), 0).iter().all(|&v| v == 20.0));
        assert!(batch.features.index_axis(Axis(0), 1).iter().all(|&v| v == 10.0));
        assert_eq!(batch.label_indices, vec![Some(1), Some(0)]);
        let labels = batch.labels.unwrap();
        for (row, expected) in [1usize, 0].into_iter().enumerate() {
            assert_eq!(labels.row(row).sum(), 1.0);
            assert_eq!(labels[[row, expected]], 1.0);
        }
    }

    #[test]
    fn test_failing_item_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let bad = dir.path().join("bad.png");
        write_gray(&good, 2, 2, 1);
        std::fs::write(&bad, b"garbage").unwrap();

        let err = BatchBuilder::new(Arc::new(pipeline(2, 2)))
            .build(&[good, bad.clone()])
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.path(), bad.as_path());
        assert!(matches!(err.source.cause, ImageError::Decode(_)));
    }

    #[test]
    fn test_open_shape_taken_from_first_sample() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        let c = dir.path().join("c.png");
        write_gray(&a, 3, 2, 5);
        write_gray(&b, 3, 2, 6);
        write_gray(&c, 4, 4, 7);

        let builder = BatchBuilder::new(Arc::new(pipeline(0, 0))).with_labels(false);
        let batch = builder.build(&[a.clone(), b]).unwrap();
        assert_eq!(batch.features.shape(), &[2, 1, 2, 3]);
        assert!(batch.labels.is_none());

        let err = builder.build(&[a, c]).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.source.cause, ImageError::ShapeMismatch(_)));
    }

    #[test]
    fn test_build_into_caller_view() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        write_gray(&a, 2, 2, 9);

        let mut features = Array4::<f32>::zeros((3, 1, 2, 2));
        let builder = BatchBuilder::new(Arc::new(pipeline(2, 2)));
        builder.build_into(&[a.clone()], features.view_mut()).unwrap();
        assert_eq!(features.index_axis(Axis(0), 0).sum(), 36.0);
        assert_eq!(features.index_axis(Axis(0), 1).sum(), 0.0);

        let err = builder
            .build_into(
                &[a.clone(), a.clone()],
                features.slice_axis_mut(Axis(0), Slice::from(0usize..1)),
            )
            .unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_empty_batch() {
        let batch = BatchBuilder::new(Arc::new(pipeline(2, 2))).build(&[]).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.features.shape(), &[0, 1, 2, 2]);
    }
}
