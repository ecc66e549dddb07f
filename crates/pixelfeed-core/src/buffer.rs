//! Decoded pixel storage.
//!
//! A [`PixelBuffer`] is what every stage between the decoder and the tensor
//! packer hands to the next one. Samples are stored with their native element
//! type; addressing goes through an explicit [`Layout`] so that interleaved
//! and planar rasters share one representation.

use crate::error::ImageError;

/// Element type of a single channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    U16,
    I32,
    F32,
}

impl ElementType {
    /// Byte size of one sample.
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }

    /// Value used for a fully opaque alpha channel.
    pub fn opaque(self) -> f64 {
        match self {
            Self::U8 => u8::MAX as f64,
            Self::U16 => u16::MAX as f64,
            Self::I32 => i32::MAX as f64,
            Self::F32 => 1.0,
        }
    }
}

/// Owned sample storage, one variant per supported element type.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl PixelData {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::U8(_) => ElementType::U8,
            Self::U16(_) => ElementType::U16,
            Self::I32(_) => ElementType::I32,
            Self::F32(_) => ElementType::F32,
        }
    }

    /// Number of stored samples (not bytes).
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one sample widened to `f64`. Lossless for every variant.
    #[inline]
    pub fn get_f64(&self, index: usize) -> f64 {
        match self {
            Self::U8(v) => v[index] as f64,
            Self::U16(v) => v[index] as f64,
            Self::I32(v) => v[index] as f64,
            Self::F32(v) => v[index] as f64,
        }
    }

    /// Build storage of the given type from computed values.
    ///
    /// Integer targets round to nearest and saturate at the type bounds.
    pub fn from_f64(ty: ElementType, values: impl IntoIterator<Item = f64>) -> Self {
        let values = values.into_iter();
        match ty {
            ElementType::U8 => Self::U8(values.map(|v| v.round() as u8).collect()),
            ElementType::U16 => Self::U16(values.map(|v| v.round() as u16).collect()),
            ElementType::I32 => Self::I32(values.map(|v| v.round() as i32).collect()),
            ElementType::F32 => Self::F32(values.map(|v| v as f32).collect()),
        }
    }

    /// Zero-filled storage of `len` samples.
    pub fn zeros(ty: ElementType, len: usize) -> Self {
        match ty {
            ElementType::U8 => Self::U8(vec![0; len]),
            ElementType::U16 => Self::U16(vec![0; len]),
            ElementType::I32 => Self::I32(vec![0; len]),
            ElementType::F32 => Self::F32(vec![0.0; len]),
        }
    }
}

/// Strides in samples between neighbouring channels, pixels and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub channel_stride: usize,
    pub pixel_stride: usize,
    pub row_stride: usize,
}

impl Layout {
    /// Tightly packed, row-major, channel-interleaved layout.
    pub const fn interleaved(width: u32, channels: u8) -> Self {
        Self {
            channel_stride: 1,
            pixel_stride: channels as usize,
            row_stride: width as usize * channels as usize,
        }
    }

    #[inline]
    pub fn offset(&self, row: usize, col: usize, channel: usize) -> usize {
        row * self.row_stride + col * self.pixel_stride + channel * self.channel_stride
    }
}

/// An in-memory decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    layout: Layout,
    data: PixelData,
}

impl PixelBuffer {
    /// Wrap storage with an explicit layout, checking that every addressed
    /// sample lies inside `data`.
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        layout: Layout,
        data: PixelData,
    ) -> Result<Self, ImageError> {
        if !(1..=4).contains(&channels) {
            return Err(ImageError::InvalidBuffer(format!(
                "channel count {channels} outside 1..=4"
            )));
        }
        if height as usize * layout.row_stride > data.len() {
            return Err(ImageError::InvalidBuffer(format!(
                "{} samples cannot hold {} rows of stride {}",
                data.len(),
                height,
                layout.row_stride
            )));
        }
        if width > 0 && height > 0 {
            let last = layout.offset(
                height as usize - 1,
                width as usize - 1,
                channels as usize - 1,
            );
            if last >= data.len() {
                return Err(ImageError::InvalidBuffer(format!(
                    "last sample at offset {last} lies past {} stored samples",
                    data.len()
                )));
            }
        }
        Ok(Self {
            width,
            height,
            channels,
            layout,
            data,
        })
    }

    /// Wrap tightly packed, channel-interleaved storage.
    pub fn interleaved(
        width: u32,
        height: u32,
        channels: u8,
        data: PixelData,
    ) -> Result<Self, ImageError> {
        Self::new(
            width,
            height,
            channels,
            Layout::interleaved(width, channels),
            data,
        )
    }

    /// Build a buffer by evaluating `f(row, col, channel)` for every sample.
    pub fn from_fn(
        width: u32,
        height: u32,
        channels: u8,
        ty: ElementType,
        mut f: impl FnMut(usize, usize, usize) -> f64,
    ) -> Result<Self, ImageError> {
        let mut values = Vec::with_capacity(width as usize * height as usize * channels as usize);
        for row in 0..height as usize {
            for col in 0..width as usize {
                for channel in 0..channels as usize {
                    values.push(f(row, col, channel));
                }
            }
        }
        Self::interleaved(width, height, channels, PixelData::from_f64(ty, values))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    /// Number of logical samples, `height * width * channels`.
    pub fn sample_count(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Type-erased accessor used by the generic paths.
    #[inline]
    pub fn sample(&self, row: usize, col: usize, channel: usize) -> f64 {
        self.data.get_f64(self.layout.offset(row, col, channel))
    }

    pub fn is_interleaved(&self) -> bool {
        self.layout == Layout::interleaved(self.width, self.channels)
    }

    /// Return the buffer with tightly packed interleaved storage, copying only
    /// when the current layout differs.
    pub fn into_interleaved(self) -> Self {
        if self.is_interleaved() && self.data.len() == self.sample_count() {
            return self;
        }
        let (width, height) = (self.width, self.height);
        let data = self.region_data(0, 0, width, height);
        Self {
            layout: Layout::interleaved(width, self.channels),
            data,
            ..self
        }
    }

    /// Copy the `width x height` window whose top-left corner is `(x, y)`
    /// into a new interleaved buffer.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, ImageError> {
        if x + width > self.width || y + height > self.height {
            return Err(ImageError::InvalidBuffer(format!(
                "crop {width}x{height}+{x}+{y} exceeds {}x{} image",
                self.width, self.height
            )));
        }
        let data = self.region_data(x, y, width, height);
        Self::interleaved(width, height, self.channels, data)
    }

    fn region_data(&self, x: u32, y: u32, width: u32, height: u32) -> PixelData {
        let window = Window {
            x: x as usize,
            y: y as usize,
            width: width as usize,
            height: height as usize,
            channels: self.channels as usize,
        };
        let layout = self.layout;
        match &self.data {
            PixelData::U8(v) => PixelData::U8(gather(v, layout, window)),
            PixelData::U16(v) => PixelData::U16(gather(v, layout, window)),
            PixelData::I32(v) => PixelData::I32(gather(v, layout, window)),
            PixelData::F32(v) => PixelData::F32(gather(v, layout, window)),
        }
    }

    /// Decompose into dimensions and storage.
    pub fn into_parts(self) -> (u32, u32, u8, Layout, PixelData) {
        (self.width, self.height, self.channels, self.layout, self.data)
    }
}

struct Window {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    channels: usize,
}

fn gather<T: Copy>(src: &[T], layout: Layout, window: Window) -> Vec<T> {
    let mut out = Vec::with_capacity(window.width * window.height * window.channels);
    for row in window.y..window.y + window.height {
        for col in window.x..window.x + window.width {
            for channel in 0..window.channels {
                out.push(src[layout.offset(row, col, channel)]);
            }
        }
    }
    out
}
