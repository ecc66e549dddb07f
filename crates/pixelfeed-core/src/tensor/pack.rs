//! Pixel buffer to channel-major tensor conversion.

use ndarray::ArrayViewMut3;

use crate::buffer::{Layout, PixelBuffer, PixelData};
use crate::error::ShapeMismatchError;

use super::{Placement, TensorSink, TensorViewMut};

/// Which conversion routine filled the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackPath {
    /// Typed nested loop for a known (source, destination) pair
    Fast,
    /// Per-element `f64` accessor
    Generic,
}

/// Outcome of a successful [`TensorPacker::pack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackReport {
    pub path: PackPath,
    pub elements: usize,
    pub placement: Placement,
}

/// Converts interleaved pixel buffers into `[C, H, W]` tensors.
///
/// The source is consumed: once its samples have been transposed into the
/// destination it has no further use.
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorPacker;

impl TensorPacker {
    /// Pack `src` into `dst` in `(channel, row, col)` order.
    ///
    /// Fails when `dst` does not hold exactly `height * width * channels`
    /// elements. An ndarray destination with a different shape but the same
    /// element count is reinterpreted as `[C, H, W]` when its memory is
    /// contiguous.
    pub fn pack(
        &self,
        src: PixelBuffer,
        dst: TensorViewMut<'_>,
    ) -> Result<PackReport, ShapeMismatchError> {
        let (c, h, w) = (
            src.channels() as usize,
            src.height() as usize,
            src.width() as usize,
        );
        let expected = c * h * w;
        let mismatch = |actual: Vec<usize>| ShapeMismatchError {
            expected,
            channels: c,
            height: h,
            width: w,
            actual,
        };
        if dst.element_count() != expected {
            return Err(mismatch(dst.shape()));
        }

        let layout = src.layout();
        let path = match dst {
            TensorViewMut::F32(view) => {
                let mut view = conform(view, (c, h, w)).map_err(mismatch)?;
                match src.data() {
                    PixelData::U8(s) => fill(&mut view, s, layout, |v| v as f32),
                    PixelData::U16(s) => fill(&mut view, s, layout, |v| v as f32),
                    PixelData::I32(s) => fill(&mut view, s, layout, |v| v as f32),
                    PixelData::F32(s) => fill(&mut view, s, layout, |v| v),
                }
                PackPath::Fast
            }
            TensorViewMut::F64(view) => {
                let mut view = conform(view, (c, h, w)).map_err(mismatch)?;
                match src.data() {
                    PixelData::U8(s) => fill(&mut view, s, layout, f64::from),
                    PixelData::U16(s) => fill(&mut view, s, layout, f64::from),
                    PixelData::I32(s) => fill(&mut view, s, layout, f64::from),
                    PixelData::F32(s) => fill(&mut view, s, layout, f64::from),
                }
                PackPath::Fast
            }
            TensorViewMut::Sink(sink) => {
                fill_generic(sink, &src);
                PackPath::Generic
            }
        };

        tracing::trace!("Packed {}x{}x{} via {:?}", c, h, w, path);
        Ok(PackReport {
            path,
            elements: expected,
            placement: Placement::Host,
        })
    }
}

/// Make sure the view is addressable as `[C, H, W]`.
fn conform<T>(
    view: ArrayViewMut3<'_, T>,
    shape: (usize, usize, usize),
) -> Result<ArrayViewMut3<'_, T>, Vec<usize>> {
    if view.dim() == shape {
        return Ok(view);
    }
    let actual = view.shape().to_vec();
    view.into_shape_with_order(shape).map_err(|_| actual)
}

#[inline]
fn fill<S: Copy, D>(
    dst: &mut ArrayViewMut3<'_, D>,
    src: &[S],
    layout: Layout,
    cast: impl Fn(S) -> D,
) {
    let (channels, rows, cols) = dst.dim();
    for k in 0..channels {
        for i in 0..rows {
            let row = i * layout.row_stride + k * layout.channel_stride;
            for j in 0..cols {
                dst[[k, i, j]] = cast(src[row + j * layout.pixel_stride]);
            }
        }
    }
}

fn fill_generic(dst: &mut dyn TensorSink, src: &PixelBuffer) {
    let (channels, rows, cols) = (
        src.channels() as usize,
        src.height() as usize,
        src.width() as usize,
    );
    let mut offset = 0;
    for k in 0..channels {
        for i in 0..rows {
            for j in 0..cols {
                dst.put(offset, src.sample(i, j, k));
                offset += 1;
            }
        }
    }
}
