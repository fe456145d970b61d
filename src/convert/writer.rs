//! Output writers.
//!
//! A writer receives planes (or tiles of planes) in increasing index order and
//! stores them in one output file. What a writer can do is declared up front
//! through [`WriterCapabilities`]; the driver reads it once and adapts the
//! conversion to it instead of probing the writer's type.
//!
//! # Writers
//!
//! - [`RawWriter`]: plane-sequential binary file plus a JSON header next to it.
//!   Takes stacks, tiles and big images.
//! - [`PngWriter`]: one plane per file, 8/16-bit gray or RGB(A). Indexed
//!   planes are expanded through their lookup table.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use serde::Serialize;
use tracing::debug;

use crate::error::{ConvertError, IoError};
use crate::format::{CoreMetadata, LookupTable, PixelType, Region};
use crate::io::check_suffix;

/// Suffixes handled by [`RawWriter`].
pub const RAW_SUFFIXES: &[&str] = &["raw", "bin"];

/// Suffixes handled by [`PngWriter`].
pub const PNG_SUFFIXES: &[&str] = &["png"];

// =============================================================================
// Capabilities and layout
// =============================================================================

/// What a writer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriterCapabilities {
    /// More than one plane per output file.
    pub stacks: bool,
    /// Planes saved piecewise with [`FormatWriter::save_tile`].
    pub tiles: bool,
    /// Outputs beyond 4 GiB.
    pub big_images: bool,
    /// 16-bit unsigned samples.
    pub sixteen_bit: bool,
}

/// Deflate effort for writers that compress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Fast,
    Default,
    Best,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Compression::None),
            "fast" => Ok(Compression::Fast),
            "default" | "deflate" | "zlib" => Ok(Compression::Default),
            "best" => Ok(Compression::Best),
            other => Err(format!(
                "unknown compression '{}' (expected none, fast, default or best)",
                other
            )),
        }
    }
}

/// Sample layout of the planes written to one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    /// Samples per pixel.
    pub samples: usize,
    pub interleaved: bool,
    pub little_endian: bool,
}

impl PlaneLayout {
    /// Layout of a region read from a series.
    pub fn of_region(core: &CoreMetadata, region: &Region) -> Self {
        Self {
            width: region.width,
            height: region.height,
            pixel_type: core.pixel_type,
            samples: core.rgb_channel_count,
            interleaved: core.interleaved,
            little_endian: core.little_endian,
        }
    }

    pub fn plane_size(&self) -> usize {
        self.width as usize * self.height as usize * self.samples * self.pixel_type.bytes_per_pixel()
    }

    /// Size of a sub-region in bytes.
    pub fn region_size(&self, region: &Region) -> usize {
        region.area() * self.samples * self.pixel_type.bytes_per_pixel()
    }
}

// =============================================================================
// FormatWriter Trait
// =============================================================================

/// Sink for converted planes.
pub trait FormatWriter {
    fn format_name(&self) -> &'static str;

    fn capabilities(&self) -> WriterCapabilities;

    /// Start a new output file. Any open file is finished first.
    fn open(&mut self, path: &Path, layout: PlaneLayout) -> Result<(), ConvertError>;

    /// Palette for indexed planes written from now on.
    fn set_lookup_table(&mut self, table: Option<LookupTable>);

    fn set_compression(&mut self, compression: Compression);

    /// Store plane `index` of the open file.
    fn save_plane(&mut self, index: usize, bytes: &[u8]) -> Result<(), ConvertError>;

    /// Store one tile of plane `index`; `region` is relative to the plane.
    fn save_tile(&mut self, index: usize, region: Region, bytes: &[u8]) -> Result<(), ConvertError> {
        let _ = (index, region, bytes);
        Err(ConvertError::Writer {
            message: format!("{} does not support tiled writes", self.format_name()),
        })
    }

    /// Finish the open file, if any.
    fn close(&mut self) -> Result<(), ConvertError>;
}

/// Pick a writer from the output file suffix.
pub fn writer_for_path(path: &str) -> Result<Box<dyn FormatWriter>, ConvertError> {
    if check_suffix(path, RAW_SUFFIXES) {
        Ok(Box::new(RawWriter::new()))
    } else if check_suffix(path, PNG_SUFFIXES) {
        Ok(Box::new(PngWriter::new()))
    } else {
        Err(ConvertError::Config(format!(
            "no writer for output '{}' (expected .raw, .bin or .png)",
            path
        )))
    }
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> ConvertError {
    IoError::Write {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .into()
}

fn not_open() -> ConvertError {
    ConvertError::Writer {
        message: "no output file is open".to_string(),
    }
}

fn check_length(expected: usize, actual: usize) -> Result<(), ConvertError> {
    if actual < expected {
        return Err(ConvertError::Writer {
            message: format!("buffer holds {} bytes, {} required", actual, expected),
        });
    }
    Ok(())
}

// =============================================================================
// Raw Writer
// =============================================================================

/// Header stored next to a raw output file as `<file>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RawHeader {
    pub width: u32,
    pub height: u32,
    pub planes: usize,
    pub pixel_type: PixelType,
    pub samples: usize,
    pub interleaved: bool,
    pub little_endian: bool,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_table: Option<Vec<Vec<u16>>>,
}

struct RawOutput {
    path: PathBuf,
    file: File,
    layout: PlaneLayout,
    planes: usize,
}

/// Writer of headerless plane-sequential binary files.
///
/// Plane `i` starts at byte `i * plane_size`. Compression is ignored.
#[derive(Default)]
pub struct RawWriter {
    output: Option<RawOutput>,
    table: Option<LookupTable>,
}

impl RawWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the header written for `path`.
    pub fn header_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    fn write_at(output: &mut RawOutput, offset: u64, bytes: &[u8]) -> Result<(), ConvertError> {
        output
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| output.file.write_all(bytes))
            .map_err(|e| write_error(&output.path, e))
    }
}

impl FormatWriter for RawWriter {
    fn format_name(&self) -> &'static str {
        "Raw"
    }

    fn capabilities(&self) -> WriterCapabilities {
        WriterCapabilities {
            stacks: true,
            tiles: true,
            big_images: true,
            sixteen_bit: true,
        }
    }

    fn open(&mut self, path: &Path, layout: PlaneLayout) -> Result<(), ConvertError> {
        self.close()?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| write_error(path, e))?;
        debug!("Opened raw output {}", path.display());
        self.output = Some(RawOutput {
            path: path.to_path_buf(),
            file,
            layout,
            planes: 0,
        });
        Ok(())
    }

    fn set_lookup_table(&mut self, table: Option<LookupTable>) {
        self.table = table;
    }

    fn set_compression(&mut self, _compression: Compression) {}

    fn save_plane(&mut self, index: usize, bytes: &[u8]) -> Result<(), ConvertError> {
        let output = self.output.as_mut().ok_or_else(not_open)?;
        let size = output.layout.plane_size();
        check_length(size, bytes.len())?;
        Self::write_at(output, (index * size) as u64, &bytes[..size])?;
        output.planes = output.planes.max(index + 1);
        Ok(())
    }

    fn save_tile(&mut self, index: usize, region: Region, bytes: &[u8]) -> Result<(), ConvertError> {
        let output = self.output.as_mut().ok_or_else(not_open)?;
        let layout = output.layout;
        check_length(layout.region_size(&region), bytes.len())?;

        let bpp = layout.pixel_type.bytes_per_pixel();
        let (blocks, pixel) = if layout.interleaved {
            (1, bpp * layout.samples)
        } else {
            (layout.samples, bpp)
        };
        let width = layout.width as usize;
        let plane_start = index * layout.plane_size();
        let block_size = width * layout.height as usize * pixel;
        let row = region.width as usize * pixel;

        for block in 0..blocks {
            for y in 0..region.height as usize {
                let offset = plane_start
                    + block * block_size
                    + ((region.y as usize + y) * width + region.x as usize) * pixel;
                let src = (block * region.height as usize + y) * row;
                Self::write_at(output, offset as u64, &bytes[src..src + row])?;
            }
        }
        output.planes = output.planes.max(index + 1);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConvertError> {
        let Some(mut output) = self.output.take() else {
            return Ok(());
        };
        output.file.flush().map_err(|e| write_error(&output.path, e))?;

        let lookup_table = self.table.as_ref().map(|table| match table {
            LookupTable::Bits8(ramps) => ramps
                .iter()
                .map(|ramp| ramp.iter().map(|v| u16::from(*v)).collect())
                .collect(),
            LookupTable::Bits16(ramps) => ramps.clone(),
        });
        let header = RawHeader {
            width: output.layout.width,
            height: output.layout.height,
            planes: output.planes,
            pixel_type: output.layout.pixel_type,
            samples: output.layout.samples,
            interleaved: output.layout.interleaved,
            little_endian: output.layout.little_endian,
            indexed: lookup_table.is_some(),
            lookup_table,
        };
        let json = serde_json::to_vec_pretty(&header).map_err(|e| ConvertError::Writer {
            message: e.to_string(),
        })?;
        let header_path = Self::header_path(&output.path);
        fs::write(&header_path, json).map_err(|e| write_error(&header_path, e))?;
        Ok(())
    }
}

// =============================================================================
// PNG Writer
// =============================================================================

/// Writer of single-plane PNG files.
#[derive(Default)]
pub struct PngWriter {
    output: Option<(PathBuf, PlaneLayout)>,
    table: Option<LookupTable>,
    compression: Compression,
}

impl PngWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one plane into PNG bytes.
    pub fn encode(
        &self,
        layout: &PlaneLayout,
        bytes: &[u8],
    ) -> Result<Bytes, ConvertError> {
        let (pixels, color) = self.to_png_samples(layout, bytes)?;

        let compression = match self.compression {
            Compression::None | Compression::Fast => CompressionType::Fast,
            Compression::Default => CompressionType::Default,
            Compression::Best => CompressionType::Best,
        };
        let mut output = Vec::new();
        let encoder = PngEncoder::new_with_quality(&mut output, compression, FilterType::Adaptive);
        encoder
            .write_image(&pixels, layout.width, layout.height, color)
            .map_err(|e| ConvertError::Writer {
                message: e.to_string(),
            })?;
        Ok(Bytes::from(output))
    }

    /// Interleaved samples in native byte order plus their color type.
    fn to_png_samples(
        &self,
        layout: &PlaneLayout,
        bytes: &[u8],
    ) -> Result<(Vec<u8>, ExtendedColorType), ConvertError> {
        let pixels = layout.width as usize * layout.height as usize;
        check_length(layout.plane_size(), bytes.len())?;

        if layout.samples == 1 {
            if let Some(table) = &self.table {
                return Ok(expand_indexed(table, layout, bytes, pixels));
            }
        }

        let wide = match layout.pixel_type {
            PixelType::Uint8 => false,
            PixelType::Uint16 => true,
            other => {
                return Err(ConvertError::Writer {
                    message: format!("PNG cannot store {} samples", other),
                })
            }
        };
        let color = match (layout.samples, wide) {
            (1, false) => ExtendedColorType::L8,
            (2, false) => ExtendedColorType::La8,
            (3, false) => ExtendedColorType::Rgb8,
            (4, false) => ExtendedColorType::Rgba8,
            (1, true) => ExtendedColorType::L16,
            (2, true) => ExtendedColorType::La16,
            (3, true) => ExtendedColorType::Rgb16,
            (4, true) => ExtendedColorType::Rgba16,
            (n, _) => {
                return Err(ConvertError::Writer {
                    message: format!("PNG cannot store {} samples per pixel", n),
                })
            }
        };

        let bpp = layout.pixel_type.bytes_per_pixel();
        let samples = layout.samples;
        let mut out = vec![0u8; pixels * samples * bpp];
        for p in 0..pixels {
            for s in 0..samples {
                let src = if layout.interleaved {
                    (p * samples + s) * bpp
                } else {
                    (s * pixels + p) * bpp
                };
                let dst = (p * samples + s) * bpp;
                if wide {
                    let pair = [bytes[src], bytes[src + 1]];
                    let value = if layout.little_endian {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    };
                    out[dst..dst + 2].copy_from_slice(&value.to_ne_bytes());
                } else {
                    out[dst] = bytes[src];
                }
            }
        }
        Ok((out, color))
    }
}

/// Replace palette indices by RGB values.
fn expand_indexed(
    table: &LookupTable,
    layout: &PlaneLayout,
    bytes: &[u8],
    pixels: usize,
) -> (Vec<u8>, ExtendedColorType) {
    let index_at = |p: usize| -> usize {
        match layout.pixel_type.bytes_per_pixel() {
            1 => bytes[p] as usize,
            _ => {
                let pair = [bytes[p * 2], bytes[p * 2 + 1]];
                if layout.little_endian {
                    u16::from_le_bytes(pair) as usize
                } else {
                    u16::from_be_bytes(pair) as usize
                }
            }
        }
    };
    let last = table.len().saturating_sub(1);

    match table {
        LookupTable::Bits8(ramps) => {
            let mut out = Vec::with_capacity(pixels * 3);
            for p in 0..pixels {
                let i = index_at(p).min(last);
                for ramp in 0..3 {
                    out.push(ramps.get(ramp).map_or(0, |r| r[i]));
                }
            }
            (out, ExtendedColorType::Rgb8)
        }
        LookupTable::Bits16(ramps) => {
            let mut out = Vec::with_capacity(pixels * 6);
            for p in 0..pixels {
                let i = index_at(p).min(last);
                for ramp in 0..3 {
                    let value = ramps.get(ramp).map_or(0, |r| r[i]);
                    out.extend_from_slice(&value.to_ne_bytes());
                }
            }
            (out, ExtendedColorType::Rgb16)
        }
    }
}

impl FormatWriter for PngWriter {
    fn format_name(&self) -> &'static str {
        "PNG"
    }

    fn capabilities(&self) -> WriterCapabilities {
        WriterCapabilities {
            stacks: false,
            tiles: false,
            big_images: false,
            sixteen_bit: true,
        }
    }

    fn open(&mut self, path: &Path, layout: PlaneLayout) -> Result<(), ConvertError> {
        self.close()?;
        self.output = Some((path.to_path_buf(), layout));
        Ok(())
    }

    fn set_lookup_table(&mut self, table: Option<LookupTable>) {
        self.table = table;
    }

    fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    fn save_plane(&mut self, index: usize, bytes: &[u8]) -> Result<(), ConvertError> {
        let (path, layout) = self.output.clone().ok_or_else(not_open)?;
        if index > 0 {
            return Err(ConvertError::Writer {
                message: format!("PNG holds one plane per file, got plane {}", index),
            });
        }
        let encoded = self.encode(&layout, bytes)?;
        fs::write(&path, &encoded).map_err(|e| write_error(&path, e))?;
        debug!("Wrote {} ({} bytes)", path.display(), encoded.len());
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConvertError> {
        self.output = None;
        Ok(())
    }
}
