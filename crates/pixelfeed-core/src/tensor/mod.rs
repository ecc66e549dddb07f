//! Channel-major tensor destinations and the packer that fills them.
//!
//! Destinations are `ndarray` views of shape `[C, H, W]`. Their strides are
//! whatever the caller's allocation dictates, which is how a single sample is
//! written straight into one slice of a pre-allocated `[N, C, H, W]` batch.

mod pack;

pub use pack::{PackPath, PackReport, TensorPacker};

use ndarray::{ArrayViewMut2, ArrayViewMut3};

/// Where a packed tensor lives once the packer hands it over.
///
/// Device placement layers may use this marker; the loader only ever writes
/// host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Host,
}

/// Type-erased tensor write target used by the generic packing path.
///
/// Elements are addressed by their offset in `(channel, row, col)` order,
/// so any sink with the right element count can be filled. Each sink maps
/// the offset onto its own shape in logical row-major order.
pub trait TensorSink {
    /// Total number of addressable elements.
    fn element_count(&self) -> usize;

    /// Logical shape, for error reporting.
    fn shape(&self) -> Vec<usize>;

    fn put(&mut self, offset: usize, value: f64);
}

macro_rules! impl_sink_for_views {
    ($($t:ty),*) => {$(
        impl TensorSink for ArrayViewMut3<'_, $t> {
            fn element_count(&self) -> usize {
                self.len()
            }

            fn shape(&self) -> Vec<usize> {
                self.shape().to_vec()
            }

            fn put(&mut self, offset: usize, value: f64) {
                let (_, rows, cols) = self.dim();
                let plane = rows * cols;
                self[[offset / plane, (offset % plane) / cols, offset % cols]] = value as $t;
            }
        }

        impl TensorSink for ArrayViewMut2<'_, $t> {
            fn element_count(&self) -> usize {
                self.len()
            }

            fn shape(&self) -> Vec<usize> {
                self.shape().to_vec()
            }

            fn put(&mut self, offset: usize, value: f64) {
                let cols = self.ncols();
                self[[offset / cols, offset % cols]] = value as $t;
            }
        }
    )*};
}

impl_sink_for_views!(f32, f64);

/// A destination region for one image, `[C, H, W]` in channel-major order.
pub enum TensorViewMut<'a> {
    /// 32-bit float destination (fast path)
    F32(ArrayViewMut3<'a, f32>),
    /// 64-bit float destination (fast path)
    F64(ArrayViewMut3<'a, f64>),
    /// Any other destination, written element by element
    Sink(&'a mut dyn TensorSink),
}

impl TensorViewMut<'_> {
    pub fn element_count(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Sink(s) => s.element_count(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::F32(v) => v.shape().to_vec(),
            Self::F64(v) => v.shape().to_vec(),
            Self::Sink(s) => s.shape(),
        }
    }
}

impl<'a> From<ArrayViewMut3<'a, f32>> for TensorViewMut<'a> {
    fn from(view: ArrayViewMut3<'a, f32>) -> Self {
        Self::F32(view)
    }
}

impl<'a> From<ArrayViewMut3<'a, f64>> for TensorViewMut<'a> {
    fn from(view: ArrayViewMut3<'a, f64>) -> Self {
        Self::F64(view)
    }
}
