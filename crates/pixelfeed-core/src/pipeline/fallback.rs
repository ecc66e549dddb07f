//! Raw PNG decoding for rasters the primary codec rejects.
//!
//! Samples are read without any codec-side transformation. Sub-byte grey
//! levels are widened through explicit depth tables, palette indices are
//! resolved to RGBA, and the result is staged as one 32-bit word per pixel
//! with channel 0 in the most significant byte. Unpacking a word through its
//! native byte representation reverses the channels on little-endian hosts,
//! so a fixed permutation restores channel order.

use std::io::Cursor;

use png::{BitDepth, ColorType, Transformations};

use super::decode::DecodeStrategy;
use crate::buffer::{PixelBuffer, PixelData};
use crate::error::DecodeError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const EXPAND_1: [u8; 2] = [0, 255];
const EXPAND_2: [u8; 4] = [0, 85, 170, 255];
const EXPAND_4: [u8; 16] = [
    0, 17, 34, 51, 68, 85, 102, 119, 136, 153, 170, 187, 204, 221, 238, 255,
];

/// Position of channel `k` inside `u32::to_ne_bytes` of a staged word.
const WORD_ORDER: [usize; 4] = if cfg!(target_endian = "little") {
    [3, 2, 1, 0]
} else {
    [0, 1, 2, 3]
};

/// Fallback strategy reading PNG samples directly with the `png` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPngDecoder;

impl DecodeStrategy for RawPngDecoder {
    fn name(&self) -> &'static str {
        "png"
    }

    fn can_decode(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&PNG_SIGNATURE)
    }

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, DecodeError> {
        let mut decoder = png::Decoder::new(Cursor::new(bytes));
        decoder.set_transformations(Transformations::IDENTITY);
        let mut reader = decoder.read_info().map_err(codec_error)?;
        let mut raw = vec![0u8; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut raw).map_err(codec_error)?;
        let info = reader.info();

        let raster = Raster {
            width: frame.width as usize,
            height: frame.height as usize,
            line_size: frame.line_size,
            bits: bit_count(frame.bit_depth),
            data: &raw[..frame.buffer_size()],
        };

        let buffer = match (frame.color_type, frame.bit_depth) {
            (ColorType::Indexed, _) => {
                let palette = info.palette.as_deref().ok_or_else(|| DecodeError::Codec {
                    codec: "png",
                    message: "indexed image without a palette".into(),
                })?;
                let words = raster.palette_words(palette, info.trns.as_deref())?;
                unpack_words(&words, frame.width, frame.height, 4)
            }
            (color, BitDepth::Sixteen) => {
                let data = raster
                    .data
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                PixelBuffer::interleaved(
                    frame.width,
                    frame.height,
                    channel_count(color),
                    PixelData::U16(data),
                )
                .map_err(|e| DecodeError::Codec {
                    codec: "png",
                    message: e.to_string(),
                })
            }
            (color, _) => {
                let channels = channel_count(color);
                let words = raster.sample_words(channels as usize);
                unpack_words(&words, frame.width, frame.height, channels)
            }
        }?;

        tracing::trace!(
            width = frame.width,
            height = frame.height,
            channels = buffer.channels(),
            "Raw PNG decoded"
        );
        Ok(buffer)
    }
}

/// Packed, untransformed PNG rows.
struct Raster<'a> {
    width: usize,
    height: usize,
    line_size: usize,
    bits: u8,
    data: &'a [u8],
}

impl Raster<'_> {
    /// Sample `index` of row `row`, as stored (not widened).
    fn raw_sample(&self, row: usize, index: usize) -> u8 {
        let line = &self.data[row * self.line_size..];
        match self.bits {
            8 => line[index],
            bits => {
                let bit = index * bits as usize;
                let shift = 8 - bits - (bit % 8) as u8;
                (line[bit / 8] >> shift) & ((1u8 << bits) - 1)
            }
        }
    }

    /// Widened sample; sub-byte depths go through the expansion tables.
    fn sample(&self, row: usize, index: usize) -> u8 {
        let raw = self.raw_sample(row, index);
        match self.bits {
            1 => EXPAND_1[raw as usize],
            2 => EXPAND_2[raw as usize],
            4 => EXPAND_4[raw as usize],
            _ => raw,
        }
    }

    fn sample_words(&self, channels: usize) -> Vec<u32> {
        let mut words = Vec::with_capacity(self.width * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                let word = (0..channels).fold(0u32, |word, k| {
                    word | (self.sample(row, col * channels + k) as u32) << (24 - 8 * k)
                });
                words.push(word);
            }
        }
        words
    }

    fn palette_words(
        &self,
        palette: &[u8],
        trns: Option<&[u8]>,
    ) -> Result<Vec<u32>, DecodeError> {
        let entries = palette.len() / 3;
        let mut words = Vec::with_capacity(self.width * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                let index = self.raw_sample(row, col) as usize;
                if index >= entries {
                    return Err(DecodeError::Codec {
                        codec: "png",
                        message: format!("palette index {index} outside {entries} entries"),
                    });
                }
                let rgb = &palette[index * 3..index * 3 + 3];
                let alpha = trns.and_then(|t| t.get(index)).copied().unwrap_or(u8::MAX);
                words.push(u32::from_be_bytes([rgb[0], rgb[1], rgb[2], alpha]));
            }
        }
        Ok(words)
    }
}

/// Split staged words into interleaved `channels`-wide samples.
fn unpack_words(
    words: &[u32],
    width: u32,
    height: u32,
    channels: u8,
) -> Result<PixelBuffer, DecodeError> {
    let mut data = Vec::with_capacity(words.len() * channels as usize);
    for word in words {
        let bytes = word.to_ne_bytes();
        data.extend(WORD_ORDER[..channels as usize].iter().map(|&i| bytes[i]));
    }
    PixelBuffer::interleaved(width, height, channels, PixelData::U8(data)).map_err(|e| {
        DecodeError::Codec {
            codec: "png",
            message: e.to_string(),
        }
    })
}

fn channel_count(color: ColorType) -> u8 {
    match color {
        ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba | ColorType::Indexed => 4,
    }
}

fn bit_count(depth: BitDepth) -> u8 {
    match depth {
        BitDepth::One => 1,
        BitDepth::Two => 2,
        BitDepth::Four => 4,
        BitDepth::Eight => 8,
        BitDepth::Sixteen => 16,
    }
}

fn codec_error(e: png::DecodingError) -> DecodeError {
    DecodeError::Codec {
        codec: "png",
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(
        width: u32,
        height: u32,
        color: ColorType,
        depth: BitDepth,
        palette: Option<(Vec<u8>, Vec<u8>)>,
        data: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(color);
            encoder.set_depth(depth);
            if let Some((plte, trns)) = palette {
                encoder.set_palette(plte);
                if !trns.is_empty() {
                    encoder.set_trns(trns);
                }
            }
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(data).unwrap();
            writer.finish().unwrap();
        }
        out
    }

    #[test]
    fn test_one_bit_gray_expands_to_full_range() {
        // 0b1010_0000: pixels 1, 0, 1
        let bytes = encode(3, 1, ColorType::Grayscale, BitDepth::One, None, &[0b1010_0000]);
        let image = RawPngDecoder.decode(&bytes).unwrap();
        assert_eq!(image.channels(), 1);
        assert_eq!(image.data(), &PixelData::U8(vec![255, 0, 255]));
    }

    #[test]
    fn test_two_and_four_bit_tables() {
        let bytes = encode(4, 1, ColorType::Grayscale, BitDepth::Two, None, &[0b00_01_10_11]);
        let image = RawPngDecoder.decode(&bytes).unwrap();
        assert_eq!(image.data(), &PixelData::U8(vec![0, 85, 170, 255]));

        let bytes = encode(2, 1, ColorType::Grayscale, BitDepth::Four, None, &[0x3F]);
        let image = RawPngDecoder.decode(&bytes).unwrap();
        assert_eq!(image.data(), &PixelData::U8(vec![51, 255]));
    }

    #[test]
    fn test_palette_becomes_rgba_in_channel_order() {
        let palette = vec![10, 20, 30, 40, 50, 60];
        let trns = vec![128];
        // 4-bit indices 1, 0, 1 over two bytes
        let bytes = encode(
            3,
            1,
            ColorType::Indexed,
            BitDepth::Four,
            Some((palette, trns)),
            &[0x10, 0x10],
        );
        let image = RawPngDecoder.decode(&bytes).unwrap();
        assert_eq!(image.channels(), 4);
        assert_eq!(
            image.data(),
            &PixelData::U8(vec![40, 50, 60, 255, 10, 20, 30, 128, 40, 50, 60, 255])
        );
    }

    #[test]
    fn test_rgb_channel_order_preserved() {
        let bytes = encode(1, 1, ColorType::Rgb, BitDepth::Eight, None, &[1, 2, 3]);
        let image = RawPngDecoder.decode(&bytes).unwrap();
        assert_eq!(image.data(), &PixelData::U8(vec![1, 2, 3]));
    }

    #[test]
    fn test_sixteen_bit_reads_big_endian() {
        let bytes = encode(
            1,
            1,
            ColorType::GrayscaleAlpha,
            BitDepth::Sixteen,
            None,
            &[0x01, 0x02, 0xFF, 0xFF],
        );
        let image = RawPngDecoder.decode(&bytes).unwrap();
        assert_eq!(image.data(), &PixelData::U16(vec![0x0102, 0xFFFF]));
    }

    #[test]
    fn test_rejects_non_png() {
        assert!(!RawPngDecoder.can_decode(b"GIF89a"));
        assert!(RawPngDecoder.decode(b"GIF89a").is_err());
    }
}
