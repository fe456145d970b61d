//! Sample interpretation for plane buffers.
//!
//! Plane buffers are plain bytes. Whenever a layer needs actual intensities
//! (statistics, autoscaling, palette expansion) it goes through these helpers
//! so byte order and sample width are handled in one place.

use crate::io::{read_u16, read_u32, read_u64};

use super::core::PixelType;
use super::reader::SampleRange;

/// Plane samples in their native type.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneSamples {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl PlaneSamples {
    /// Decode a byte buffer into typed samples.
    ///
    /// Trailing bytes that do not form a whole sample are ignored.
    pub fn from_bytes(bytes: &[u8], pixel_type: PixelType, little_endian: bool) -> Self {
        let bpp = pixel_type.bytes_per_pixel();
        let chunks = bytes.chunks_exact(bpp);
        match pixel_type {
            PixelType::Uint8 => PlaneSamples::U8(bytes.to_vec()),
            PixelType::Int8 => PlaneSamples::I8(bytes.iter().map(|b| *b as i8).collect()),
            PixelType::Uint16 => PlaneSamples::U16(chunks.map(|c| read_u16(c, little_endian)).collect()),
            PixelType::Int16 => {
                PlaneSamples::I16(chunks.map(|c| read_u16(c, little_endian) as i16).collect())
            }
            PixelType::Uint32 => PlaneSamples::U32(chunks.map(|c| read_u32(c, little_endian)).collect()),
            PixelType::Int32 => {
                PlaneSamples::I32(chunks.map(|c| read_u32(c, little_endian) as i32).collect())
            }
            PixelType::Float => PlaneSamples::F32(
                chunks
                    .map(|c| f32::from_bits(read_u32(c, little_endian)))
                    .collect(),
            ),
            PixelType::Double => PlaneSamples::F64(
                chunks
                    .map(|c| f64::from_bits(read_u64(c, little_endian)))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PlaneSamples::I8(v) => v.len(),
            PlaneSamples::U8(v) => v.len(),
            PlaneSamples::I16(v) => v.len(),
            PlaneSamples::U16(v) => v.len(),
            PlaneSamples::I32(v) => v.len(),
            PlaneSamples::U32(v) => v.len(),
            PlaneSamples::F32(v) => v.len(),
            PlaneSamples::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All samples widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            PlaneSamples::I8(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::U8(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::I16(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::U16(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::I32(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::U32(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::F32(v) => v.iter().map(|s| *s as f64).collect(),
            PlaneSamples::F64(v) => v.clone(),
        }
    }
}

/// Read sample `index` of a buffer as `f64`.
pub fn sample_at(bytes: &[u8], index: usize, pixel_type: PixelType, little_endian: bool) -> f64 {
    let bpp = pixel_type.bytes_per_pixel();
    let s = &bytes[index * bpp..(index + 1) * bpp];
    match pixel_type {
        PixelType::Uint8 => s[0] as f64,
        PixelType::Int8 => s[0] as i8 as f64,
        PixelType::Uint16 => read_u16(s, little_endian) as f64,
        PixelType::Int16 => read_u16(s, little_endian) as i16 as f64,
        PixelType::Uint32 => read_u32(s, little_endian) as f64,
        PixelType::Int32 => read_u32(s, little_endian) as i32 as f64,
        PixelType::Float => f32::from_bits(read_u32(s, little_endian)) as f64,
        PixelType::Double => f64::from_bits(read_u64(s, little_endian)),
    }
}

/// Write an unsigned sample of `bytes_per_sample` width into `out`.
pub fn put_unsigned(out: &mut [u8], value: u64, bytes_per_sample: usize, little_endian: bool) {
    for i in 0..bytes_per_sample {
        let shift = if little_endian {
            8 * i
        } else {
            8 * (bytes_per_sample - 1 - i)
        };
        out[i] = (value >> shift) as u8;
    }
}

/// Copy one sample channel out of a plane buffer.
///
/// `channels` is the number of samples per pixel in `plane`; the result holds
/// `pixels` samples of `bpp` bytes each, in raster order.
pub fn extract_channel(
    plane: &[u8],
    pixels: usize,
    channels: usize,
    channel: usize,
    bpp: usize,
    interleaved: bool,
    out: &mut [u8],
) {
    if interleaved {
        for p in 0..pixels {
            let src = (p * channels + channel) * bpp;
            out[p * bpp..(p + 1) * bpp].copy_from_slice(&plane[src..src + bpp]);
        }
    } else {
        let start = channel * pixels * bpp;
        out[..pixels * bpp].copy_from_slice(&plane[start..start + pixels * bpp]);
    }
}

/// Range of every sample channel of a plane buffer.
///
/// `samples` is the number of samples per pixel; the buffer holds whole
/// pixels only. Returns one range per sample, or nothing for an empty buffer.
pub fn sample_ranges(
    bytes: &[u8],
    pixel_type: PixelType,
    little_endian: bool,
    samples: usize,
    interleaved: bool,
) -> Vec<SampleRange> {
    let samples = samples.max(1);
    let pixels = bytes.len() / (pixel_type.bytes_per_pixel() * samples);
    (0..samples)
        .filter_map(|sample| {
            SampleRange::of((0..pixels).map(|pixel| {
                let index = if interleaved {
                    pixel * samples + sample
                } else {
                    sample * pixels + pixel
                };
                sample_at(bytes, index, pixel_type, little_endian)
            }))
        })
        .collect()
}
