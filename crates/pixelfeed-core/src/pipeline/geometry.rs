//! Geometry normalization: channel conversion, center crop, scaling.
//!
//! The three steps always run in that order. Cropping before scaling keeps
//! the aspect ratio of the scaled content, so the order is part of the
//! output contract.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};

use crate::buffer::{ElementType, PixelBuffer, PixelData};
use crate::config::LoaderConfig;
use crate::error::{ChannelConversionError, ImageError};

/// BT.601 luma weights for RGB to grey.
const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Resampling filter used by [`scale`].
const SCALE_FILTER: FilterType = FilterType::Triangle;

/// Normalizes decoded buffers to the configured tensor geometry.
#[derive(Debug, Clone)]
pub struct GeometryOps {
    channels: u8,
    center_crop: bool,
    height: u32,
    width: u32,
}

impl GeometryOps {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            channels: config.channels,
            center_crop: config.center_crop,
            height: config.height,
            width: config.width,
        }
    }

    /// Apply channel conversion, then center crop (if enabled), then scaling.
    pub fn apply(&self, image: PixelBuffer) -> Result<PixelBuffer, ImageError> {
        let image = convert_channels(image, self.channels)?;
        let image = if self.center_crop {
            center_crop(image)?
        } else {
            image
        };
        scale(image, self.height, self.width)
    }

    /// Output `(channels, height, width)` when fully determined by config.
    pub fn fixed_shape(&self) -> Option<(usize, usize, usize)> {
        if self.channels == 0 || self.height == 0 || self.width == 0 {
            return None;
        }
        Some((
            self.channels as usize,
            self.height as usize,
            self.width as usize,
        ))
    }
}

/// Convert to `target` channels. `0` or the current count is a no-op.
///
/// Legal transitions are 1→3, 1→4, 3→1, 3→4, 4→1 and 4→3.
pub fn convert_channels(image: PixelBuffer, target: u8) -> Result<PixelBuffer, ImageError> {
    let source = image.channels();
    if target == 0 || target == source {
        return Ok(image);
    }
    let ty = image.element_type();
    let opaque = ty.opaque();
    let luma = |image: &PixelBuffer, y: usize, x: usize| {
        LUMA_WEIGHTS
            .iter()
            .enumerate()
            .map(|(k, w)| w * image.sample(y, x, k))
            .sum::<f64>()
    };

    let (w, h) = (image.width(), image.height());
    let converted = match (source, target) {
        (1, 3) => PixelBuffer::from_fn(w, h, 3, ty, |y, x, _| image.sample(y, x, 0))?,
        (1, 4) => PixelBuffer::from_fn(w, h, 4, ty, |y, x, k| {
            if k == 3 {
                opaque
            } else {
                image.sample(y, x, 0)
            }
        })?,
        (3, 1) | (4, 1) => PixelBuffer::from_fn(w, h, 1, ty, |y, x, _| luma(&image, y, x))?,
        (3, 4) => PixelBuffer::from_fn(w, h, 4, ty, |y, x, k| {
            if k == 3 {
                opaque
            } else {
                image.sample(y, x, k)
            }
        })?,
        (4, 3) => PixelBuffer::from_fn(w, h, 3, ty, |y, x, k| image.sample(y, x, k))?,
        (from, to) => return Err(ChannelConversionError { from, to }.into()),
    };
    Ok(converted)
}

/// Crop the longer side symmetrically.
///
/// With `diff = |W - H| / 2` the crop starts at `diff` along the longer axis
/// and keeps `length - 2 * diff` pixels. Square images are returned as is.
pub fn center_crop(image: PixelBuffer) -> Result<PixelBuffer, ImageError> {
    let (w, h) = (image.width(), image.height());
    if w == h {
        return Ok(image);
    }
    let diff = w.abs_diff(h) / 2;
    if w > h {
        image.crop(diff, 0, w - 2 * diff, h)
    } else {
        image.crop(0, diff, w, h - 2 * diff)
    }
}

/// Resample to exactly `height x width`.
///
/// Identity when either target is zero or the size already matches.
/// U8 and U16 resample natively. I32 and F32 are mapped onto `[0, 1]`
/// from their observed range, resampled as `f32` and mapped back, since the
/// resampler clamps float samples to the unit range.
pub fn scale(image: PixelBuffer, height: u32, width: u32) -> Result<PixelBuffer, ImageError> {
    if height == 0 || width == 0 || (image.height() == height && image.width() == width) {
        return Ok(image);
    }
    let image = image.into_interleaved();
    let (w, h, channels, _, data) = image.into_parts();
    let target = Target {
        width: w,
        height: h,
        channels,
        new_width: width,
        new_height: height,
    };
    let resized = match data {
        PixelData::U8(v) => PixelData::U8(resize_u8(v, &target)?),
        PixelData::U16(v) => PixelData::U16(resize_u16(v, &target)?),
        PixelData::I32(v) => PixelData::from_f64(
            ElementType::I32,
            resize_ranged(v.into_iter().map(f64::from).collect(), &target)?,
        ),
        PixelData::F32(v) => PixelData::from_f64(
            ElementType::F32,
            resize_ranged(v.into_iter().map(f64::from).collect(), &target)?,
        ),
    };
    PixelBuffer::interleaved(width, height, channels, resized)
}

struct Target {
    width: u32,
    height: u32,
    channels: u8,
    new_width: u32,
    new_height: u32,
}

macro_rules! resize_native {
    ($($name:ident: $t:ty),*) => {$(
        fn $name(samples: Vec<$t>, target: &Target) -> Result<Vec<$t>, ImageError> {
            match target.channels {
                1 => resize_as::<Luma<$t>>(samples, target),
                2 => resize_as::<LumaA<$t>>(samples, target),
                3 => resize_as::<Rgb<$t>>(samples, target),
                4 => resize_as::<Rgba<$t>>(samples, target),
                n => Err(ImageError::InvalidBuffer(format!(
                    "cannot resample {n}-channel image"
                ))),
            }
        }
    )*};
}

resize_native!(resize_u8: u8, resize_u16: u16, resize_unit: f32);

/// Resample samples of any range through a unit-range `f32` working buffer.
fn resize_ranged(samples: Vec<f64>, target: &Target) -> Result<Vec<f64>, ImageError> {
    let (lo, hi) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = hi - lo;
    if !span.is_finite() {
        return Err(ImageError::InvalidBuffer(
            "cannot resample non-finite samples".into(),
        ));
    }
    let unit = samples
        .iter()
        .map(|&v| if span > 0.0 { ((v - lo) / span) as f32 } else { 0.0 })
        .collect();
    let resized = resize_unit(unit, target)?;
    Ok(resized
        .into_iter()
        .map(|v| lo + f64::from(v) * span)
        .collect())
}

fn resize_as<P>(samples: Vec<P::Subpixel>, target: &Target) -> Result<Vec<P::Subpixel>, ImageError>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let source = ImageBuffer::<P, Vec<P::Subpixel>>::from_raw(target.width, target.height, samples)
        .ok_or_else(|| ImageError::InvalidBuffer("sample count does not match size".into()))?;
    Ok(
        imageops::resize(&source, target.new_width, target.new_height, SCALE_FILTER)
            .into_raw(),
    )
}
