//! Per-series core metadata shared by every reader and decorator.
//!
//! `CoreMetadata` is the dimensional description of one series: raster size,
//! Z/C/T sizes, pixel type, dimension order and sample layout. Readers fill it
//! in during `set_source`; decorators derive their own copy from the inner
//! reader's and adjust only what they change.

use std::fmt;

use serde::Serialize;

use super::dimensions::DimensionOrder;

// =============================================================================
// Pixel Types
// =============================================================================

/// Sample type of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float,
    Double,
}

impl PixelType {
    /// Number of bytes used by one sample.
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelType::Int8 | PixelType::Uint8 => 1,
            PixelType::Int16 | PixelType::Uint16 => 2,
            PixelType::Int32 | PixelType::Uint32 | PixelType::Float => 4,
            PixelType::Double => 8,
        }
    }

    pub const fn is_signed(&self) -> bool {
        matches!(
            self,
            PixelType::Int8 | PixelType::Int16 | PixelType::Int32 | PixelType::Float | PixelType::Double
        )
    }

    pub const fn is_floating_point(&self) -> bool {
        matches!(self, PixelType::Float | PixelType::Double)
    }

    /// Significant bits of one sample.
    pub const fn bits(&self) -> u32 {
        (self.bytes_per_pixel() * 8) as u32
    }

    /// Pick the pixel type for a sample size and signedness.
    ///
    /// Returns `None` for sample sizes no pixel type uses.
    pub fn from_bytes(bytes: usize, signed: bool, floating_point: bool) -> Option<Self> {
        match (bytes, signed, floating_point) {
            (1, false, false) => Some(PixelType::Uint8),
            (1, true, false) => Some(PixelType::Int8),
            (2, false, false) => Some(PixelType::Uint16),
            (2, true, false) => Some(PixelType::Int16),
            (4, false, false) => Some(PixelType::Uint32),
            (4, true, false) => Some(PixelType::Int32),
            (4, _, true) => Some(PixelType::Float),
            (8, _, true) => Some(PixelType::Double),
            _ => None,
        }
    }

    /// Human-readable name, as used in metadata reports.
    pub const fn name(&self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::Uint8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::Uint16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::Uint32 => "uint32",
            PixelType::Float => "float",
            PixelType::Double => "double",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Lookup Tables
// =============================================================================

/// Palette attached to an indexed series.
///
/// Each inner vector is one channel ramp (red, green, blue); all ramps have
/// the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTable {
    Bits8(Vec<Vec<u8>>),
    Bits16(Vec<Vec<u16>>),
}

impl LookupTable {
    /// Number of channel ramps (at most 3).
    pub fn channel_count(&self) -> usize {
        match self {
            LookupTable::Bits8(ramps) => ramps.len(),
            LookupTable::Bits16(ramps) => ramps.len(),
        }
    }

    /// Number of entries per ramp.
    pub fn len(&self) -> usize {
        match self {
            LookupTable::Bits8(ramps) => ramps.first().map_or(0, Vec::len),
            LookupTable::Bits16(ramps) => ramps.first().map_or(0, Vec::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel type of the expanded samples.
    pub fn output_pixel_type(&self) -> PixelType {
        match self {
            LookupTable::Bits8(_) => PixelType::Uint8,
            LookupTable::Bits16(_) => PixelType::Uint16,
        }
    }
}

// =============================================================================
// Regions
// =============================================================================

/// A rectangle inside a plane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole plane of a series.
    pub const fn full(core: &CoreMetadata) -> Self {
        Self::new(0, 0, core.size_x, core.size_y)
    }

    /// Number of pixels covered.
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the region covers the whole plane of `core`.
    pub fn is_full(&self, core: &CoreMetadata) -> bool {
        *self == Self::full(core)
    }
}

// =============================================================================
// Core Metadata
// =============================================================================

/// Dimensional description of one series.
///
/// `size_c` counts every channel, including the samples interleaved in one
/// RGB plane; `rgb_channel_count` is the number of samples stored per pixel
/// in a single plane. The number of planes is therefore
/// `size_z * effective_size_c() * size_t`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreMetadata {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub image_count: usize,
    pub pixel_type: PixelType,
    pub bits_per_pixel: u32,
    pub dimension_order: DimensionOrder,
    pub rgb_channel_count: usize,
    pub interleaved: bool,
    pub little_endian: bool,
    pub indexed: bool,
    pub false_color: bool,
    pub metadata_complete: bool,
}

impl Default for CoreMetadata {
    fn default() -> Self {
        Self {
            size_x: 0,
            size_y: 0,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            image_count: 1,
            pixel_type: PixelType::Uint8,
            bits_per_pixel: 8,
            dimension_order: DimensionOrder::XYZCT,
            rgb_channel_count: 1,
            interleaved: false,
            little_endian: true,
            indexed: false,
            false_color: false,
            metadata_complete: false,
        }
    }
}

impl CoreMetadata {
    /// Whether one plane holds more than one sample per pixel.
    pub fn is_rgb(&self) -> bool {
        self.rgb_channel_count > 1
    }

    /// Number of channel planes along the C axis.
    pub fn effective_size_c(&self) -> usize {
        (self.size_c / self.rgb_channel_count.max(1)).max(1)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel_type.bytes_per_pixel()
    }

    /// Size in bytes of a plane region.
    pub fn plane_size(&self, region: &Region) -> usize {
        region.area() * self.bytes_per_pixel() * self.rgb_channel_count
    }

    /// Size in bytes of a full plane.
    pub fn full_plane_size(&self) -> usize {
        self.plane_size(&Region::full(self))
    }

    /// Dimension sizes as used by the raster index.
    pub fn zct_sizes(&self) -> (usize, usize, usize) {
        (self.size_z, self.effective_size_c(), self.size_t)
    }
}
