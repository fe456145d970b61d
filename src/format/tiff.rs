//! Minimal single-plane TIFF support.
//!
//! [`TiffPlane`] is the embedded decoder used by companion-file readers whose
//! pixel payloads are ordinary TIFF files: it reports the pixel layout from the
//! header and decodes the plane on first access. [`TiffReader`] wraps it as a
//! standalone single-file reader so numbered TIFF series can be stitched.
//!
//! Decoding goes through the `image` crate, except for palette-color images:
//! those are read with the `tiff` decoder so the color indices and the
//! `ColorMap` survive as a [`LookupTable`]. Samples are always returned in
//! little-endian order, chunky (interleaved) for multi-sample images.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{FormatError, ReaderError};
use crate::io::{absolute, check_suffix};
use crate::meta::{populate_pixels, MetadataStore};

use super::core::{CoreMetadata, LookupTable, PixelType, Region};
use super::detect::is_tiff_header;
use super::dimensions::DimensionOrder;
use super::reader::{core_at, FormatReader, GroupingPolicy};

/// Suffixes of TIFF files.
pub const TIFF_SUFFIXES: &[&str] = &["tif", "tiff"];

// =============================================================================
// TiffPlane
// =============================================================================

/// Header information and lazily decoded samples of a one-plane TIFF file.
#[derive(Debug)]
pub struct TiffPlane {
    path: PathBuf,
    width: u32,
    height: u32,
    pixel_type: PixelType,
    samples_per_pixel: usize,
    /// Color map of a palette-color image.
    lookup_table: Option<LookupTable>,
    /// Decoded little-endian samples; dropped by `release`.
    decoded: Option<Vec<u8>>,
}

impl TiffPlane {
    /// Read the header of a TIFF file.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        if let Some(plane) = Self::open_palette(path)? {
            return Ok(plane);
        }

        let decoder = Self::image_reader(path)?
            .into_decoder()
            .map_err(|e| decode_error(path, e))?;

        let (width, height) = decoder.dimensions();
        let (pixel_type, samples_per_pixel) = layout_of(decoder.color_type());

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            pixel_type,
            samples_per_pixel,
            lookup_table: None,
            decoded: None,
        })
    }

    /// Header of a palette-color image, or `None` for any other photometric
    /// interpretation.
    fn open_palette(path: &Path) -> Result<Option<Self>, ReaderError> {
        let mut decoder = Self::tiff_decoder(path)?;
        let bits = match decoder.colortype().map_err(|e| tiff_error(path, e))? {
            tiff::ColorType::Palette(bits) => bits,
            _ => return Ok(None),
        };
        let pixel_type = match bits {
            8 => PixelType::Uint8,
            16 => PixelType::Uint16,
            other => {
                return Err(FormatError::Decode {
                    path: path.display().to_string(),
                    message: format!("unsupported palette depth of {} bits", other),
                }
                .into())
            }
        };

        let (width, height) = decoder.dimensions().map_err(|e| tiff_error(path, e))?;
        let color_map = decoder
            .find_tag(Tag::ColorMap)
            .map_err(|e| tiff_error(path, e))?
            .ok_or_else(|| FormatError::InvalidHeader {
                path: path.display().to_string(),
                message: "palette image without a ColorMap".to_string(),
            })?
            .into_u32_vec()
            .map_err(|e| tiff_error(path, e))?;
        let table = color_map_table(&color_map, bits).ok_or_else(|| FormatError::InvalidHeader {
            path: path.display().to_string(),
            message: format!(
                "ColorMap holds {} entries, {}-bit indices need {}",
                color_map.len(),
                bits,
                3usize << bits
            ),
        })?;
        debug!("{} is indexed with {} color map entries", path.display(), table.len());

        Ok(Some(Self {
            path: path.to_path_buf(),
            width,
            height,
            pixel_type,
            samples_per_pixel: 1,
            lookup_table: Some(table),
            decoded: None,
        }))
    }

    fn tiff_decoder(path: &Path) -> Result<TiffDecoder<BufReader<File>>, ReaderError> {
        let file = File::open(path).map_err(|e| crate::error::IoError::from_std(path, e))?;
        TiffDecoder::new(BufReader::new(file)).map_err(|e| tiff_error(path, e))
    }

    fn image_reader(path: &Path) -> Result<ImageReader<BufReader<File>>, ReaderError> {
        let file = File::open(path).map_err(|e| crate::error::IoError::from_std(path, e))?;
        Ok(ImageReader::with_format(
            BufReader::new(file),
            ImageFormat::Tiff,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn samples_per_pixel(&self) -> usize {
        self.samples_per_pixel
    }

    /// Core metadata of the single plane.
    pub fn core(&self) -> CoreMetadata {
        CoreMetadata {
            size_x: self.width,
            size_y: self.height,
            size_z: 1,
            size_c: self.samples_per_pixel,
            size_t: 1,
            image_count: 1,
            pixel_type: self.pixel_type,
            bits_per_pixel: self.pixel_type.bits(),
            dimension_order: DimensionOrder::XYCZT,
            rgb_channel_count: self.samples_per_pixel,
            interleaved: true,
            little_endian: true,
            indexed: self.is_indexed(),
            false_color: false,
            metadata_complete: true,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.lookup_table.is_some()
    }

    pub fn lookup_table(&self) -> Option<LookupTable> {
        self.lookup_table.clone()
    }

    /// Copy a region of the plane into `buf`.
    pub fn read_region(&mut self, region: Region, buf: &mut [u8]) -> Result<(), ReaderError> {
        let pixel_bytes = self.pixel_type.bytes_per_pixel() * self.samples_per_pixel;
        let row_bytes = self.width as usize * pixel_bytes;
        let out_row = region.width as usize * pixel_bytes;

        let data = self.decoded()?;
        for row in 0..region.height as usize {
            let src = (region.y as usize + row) * row_bytes + region.x as usize * pixel_bytes;
            let dst = row * out_row;
            buf[dst..dst + out_row].copy_from_slice(&data[src..src + out_row]);
        }
        Ok(())
    }

    fn decoded(&mut self) -> Result<&[u8], ReaderError> {
        if self.decoded.is_none() {
            debug!("Decoding TIFF plane {}", self.path.display());
            let bytes = if self.is_indexed() {
                self.decode_indices()?
            } else {
                let image = Self::image_reader(&self.path)?
                    .decode()
                    .map_err(|e| decode_error(&self.path, e))?;
                image_to_le_bytes(image)
            };
            let expected = self.width as usize
                * self.height as usize
                * self.samples_per_pixel
                * self.pixel_type.bytes_per_pixel();
            if bytes.len() < expected {
                return Err(FormatError::Decode {
                    path: self.path.display().to_string(),
                    message: format!("expected {} bytes, decoded {}", expected, bytes.len()),
                }
                .into());
            }
            self.decoded = Some(bytes);
        }
        Ok(self.decoded.as_deref().unwrap_or_default())
    }

    /// Raw color indices of a palette image.
    fn decode_indices(&self) -> Result<Vec<u8>, ReaderError> {
        let mut decoder = Self::tiff_decoder(&self.path)?;
        match decoder.read_image().map_err(|e| tiff_error(&self.path, e))? {
            DecodingResult::U8(indices) => Ok(indices),
            DecodingResult::U16(indices) => Ok(u16_le_bytes(&indices)),
            _ => Err(FormatError::Decode {
                path: self.path.display().to_string(),
                message: "palette indices are neither 8 nor 16 bits".to_string(),
            }
            .into()),
        }
    }

    /// Drop decoded samples.
    pub fn release(&mut self) {
        self.decoded = None;
    }
}

fn decode_error(path: &Path, err: image::ImageError) -> ReaderError {
    FormatError::Decode {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .into()
}

fn tiff_error(path: &Path, err: tiff::TiffError) -> ReaderError {
    FormatError::Decode {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .into()
}

/// Split a `ColorMap` into red, green and blue ramps of `2^bits` entries.
/// 8-bit tables keep the high byte of each 16-bit entry.
fn color_map_table(color_map: &[u32], bits: u8) -> Option<LookupTable> {
    let entries = 1usize << bits;
    if color_map.len() < 3 * entries {
        return None;
    }
    let ramps = color_map.chunks_exact(entries).take(3);
    Some(if bits <= 8 {
        LookupTable::Bits8(
            ramps
                .map(|ramp| ramp.iter().map(|v| (v >> 8) as u8).collect())
                .collect(),
        )
    } else {
        LookupTable::Bits16(
            ramps
                .map(|ramp| ramp.iter().map(|v| *v as u16).collect())
                .collect(),
        )
    })
}

/// Pixel type and samples per pixel of a decoded color type.
fn layout_of(color: ColorType) -> (PixelType, usize) {
    match color {
        ColorType::L8 => (PixelType::Uint8, 1),
        ColorType::La8 => (PixelType::Uint8, 2),
        ColorType::Rgb8 => (PixelType::Uint8, 3),
        ColorType::Rgba8 => (PixelType::Uint8, 4),
        ColorType::L16 => (PixelType::Uint16, 1),
        ColorType::La16 => (PixelType::Uint16, 2),
        ColorType::Rgb16 => (PixelType::Uint16, 3),
        ColorType::Rgba16 => (PixelType::Uint16, 4),
        ColorType::Rgb32F => (PixelType::Float, 3),
        ColorType::Rgba32F => (PixelType::Float, 4),
        _ => (PixelType::Uint8, 3),
    }
}

/// Flatten a decoded image into little-endian sample bytes.
fn image_to_le_bytes(image: DynamicImage) -> Vec<u8> {
    match image {
        DynamicImage::ImageLuma8(img) => img.into_raw(),
        DynamicImage::ImageLumaA8(img) => img.into_raw(),
        DynamicImage::ImageRgb8(img) => img.into_raw(),
        DynamicImage::ImageRgba8(img) => img.into_raw(),
        DynamicImage::ImageLuma16(img) => u16_le_bytes(img.as_raw()),
        DynamicImage::ImageLumaA16(img) => u16_le_bytes(img.as_raw()),
        DynamicImage::ImageRgb16(img) => u16_le_bytes(img.as_raw()),
        DynamicImage::ImageRgba16(img) => u16_le_bytes(img.as_raw()),
        DynamicImage::ImageRgb32F(img) => f32_le_bytes(img.as_raw()),
        DynamicImage::ImageRgba32F(img) => f32_le_bytes(img.as_raw()),
        other => other.to_rgb8().into_raw(),
    }
}

fn u16_le_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn f32_le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

// =============================================================================
// TiffReader
// =============================================================================

/// Reader for a single TIFF file holding one plane.
#[derive(Debug, Default)]
pub struct TiffReader {
    current: Option<PathBuf>,
    plane: Option<TiffPlane>,
    cores: Vec<CoreMetadata>,
    metadata: BTreeMap<String, String>,
}

impl TiffReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormatReader for TiffReader {
    fn format_name(&self) -> &'static str {
        "Tagged Image File Format"
    }

    fn is_this_type(&self, path: &Path, allow_open: bool) -> bool {
        let name = path.display().to_string();
        if !check_suffix(&name, TIFF_SUFFIXES) {
            return false;
        }
        if !allow_open {
            return true;
        }

        let mut header = [0u8; 8];
        match File::open(path).and_then(|mut f| f.read_exact(&mut header)) {
            Ok(()) => is_tiff_header(&header),
            Err(_) => false,
        }
    }

    fn grouping_policy(&self, _path: &Path) -> GroupingPolicy {
        GroupingPolicy::Never
    }

    fn set_source(
        &mut self,
        path: &Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        let path = absolute(path);
        if self.current.as_deref() == Some(path.as_path()) {
            return Ok(());
        }
        self.close(false);

        let plane = TiffPlane::open(&path)?;
        self.cores = vec![plane.core()];
        self.metadata
            .insert("BitsPerSample".to_string(), plane.pixel_type().bits().to_string());
        self.metadata.insert(
            "SamplesPerPixel".to_string(),
            plane.samples_per_pixel().to_string(),
        );
        self.plane = Some(plane);
        self.current = Some(path);

        populate_pixels(store, self)?;
        Ok(())
    }

    fn source(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn series_count(&self) -> usize {
        self.cores.len()
    }

    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        core_at(&self.cores, series)
    }

    fn read_plane(
        &mut self,
        _series: usize,
        _plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        match self.plane.as_mut() {
            Some(plane) => plane.read_region(region, buf),
            None => Err(crate::error::UsageError::NotInitialized.into()),
        }
    }

    fn lookup_table(&mut self, _series: usize) -> Result<Option<LookupTable>, ReaderError> {
        Ok(self.plane.as_ref().and_then(TiffPlane::lookup_table))
    }

    fn used_files(&self, no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError> {
        match &self.current {
            Some(_) if no_pixels => Ok(Vec::new()),
            Some(path) => Ok(vec![path.clone()]),
            None => Err(crate::error::UsageError::NotInitialized.into()),
        }
    }

    fn global_metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn close(&mut self, file_only: bool) {
        if let Some(plane) = self.plane.as_mut() {
            plane.release();
        }
        if !file_only {
            self.plane = None;
            self.current = None;
            self.cores.clear();
            self.metadata.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MemoryMetadataStore;
    use image::{GrayImage, Luma};

    fn write_gray_tiff(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([(y * width + x) as u8]));
        let path = dir.join(name);
        img.save_with_format(&path, ImageFormat::Tiff).unwrap();
        path
    }

    /// Little-endian, uncompressed, 8-bit palette TIFF. Index `i` maps to
    /// red `i`, green `255 - i` and blue 128.
    fn palette_tiff_bytes(width: u16, height: u16) -> Vec<u8> {
        const ENTRIES: u16 = 10;
        let map_offset = 8 + 2 + 12 * ENTRIES as u32 + 4;
        let pixel_offset = map_offset + 3 * 256 * 2;
        let pixel_count = width as u32 * height as u32;

        let mut out = Vec::new();
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&ENTRIES.to_le_bytes());
        let entries: [(u16, u16, u32, u32); 10] = [
            (256, 3, 1, width as u32),
            (257, 3, 1, height as u32),
            (258, 3, 1, 8),
            (259, 3, 1, 1),
            (262, 3, 1, 3),
            (273, 4, 1, pixel_offset),
            (277, 3, 1, 1),
            (278, 3, 1, height as u32),
            (279, 4, 1, pixel_count),
            (320, 3, 3 * 256, map_offset),
        ];
        for (tag, kind, count, value) in entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&0u32.to_le_bytes());

        for i in 0..256u16 {
            out.extend_from_slice(&(i << 8).to_le_bytes());
        }
        for i in 0..256u16 {
            out.extend_from_slice(&((255 - i) << 8).to_le_bytes());
        }
        for _ in 0..256 {
            out.extend_from_slice(&0x8000u16.to_le_bytes());
        }
        out.extend((0..pixel_count).map(|i| i as u8));
        out
    }

    #[test]
    fn test_tiff_plane_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray_tiff(dir.path(), "a.tif", 6, 4);

        let plane = TiffPlane::open(&path).unwrap();
        assert_eq!(plane.width(), 6);
        assert_eq!(plane.height(), 4);
        assert_eq!(plane.pixel_type(), PixelType::Uint8);
        assert_eq!(plane.samples_per_pixel(), 1);
    }

    #[test]
    fn test_tiff_plane_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray_tiff(dir.path(), "a.tif", 6, 4);

        let mut plane = TiffPlane::open(&path).unwrap();
        let mut buf = vec![0u8; 4];
        plane.read_region(Region::new(2, 1, 2, 2), &mut buf).unwrap();
        assert_eq!(buf, vec![8, 9, 14, 15]);
    }

    #[test]
    fn test_palette_plane_keeps_indices_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.tif");
        std::fs::write(&path, palette_tiff_bytes(4, 2)).unwrap();

        let mut plane = TiffPlane::open(&path).unwrap();
        assert!(plane.is_indexed());
        assert!(plane.core().indexed);
        assert_eq!(plane.pixel_type(), PixelType::Uint8);
        assert_eq!(plane.samples_per_pixel(), 1);

        let Some(LookupTable::Bits8(ramps)) = plane.lookup_table() else {
            panic!("expected an 8-bit lookup table");
        };
        assert_eq!(ramps.len(), 3);
        assert_eq!(ramps[0][7], 7);
        assert_eq!(ramps[1][7], 248);
        assert_eq!(ramps[2][7], 128);

        let mut buf = vec![0u8; 8];
        plane.read_region(Region::new(0, 0, 4, 2), &mut buf).unwrap();
        assert_eq!(buf, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_color_map_table_depths() {
        let short = vec![0u32; 3 * 256 - 1];
        assert!(color_map_table(&short, 8).is_none());

        let map: Vec<u32> = (0..3 * 4).map(|v| v * 1000).collect();
        let Some(LookupTable::Bits8(ramps)) = color_map_table(&map, 2) else {
            panic!("expected an 8-bit table for 2-bit indices");
        };
        assert_eq!(ramps[2], vec![31, 35, 39, 42]);

        let wide: Vec<u32> = (0..3 * 65536).map(|v| v % 65536).collect();
        let Some(LookupTable::Bits16(ramps)) = color_map_table(&wide, 16) else {
            panic!("expected a 16-bit table for 16-bit indices");
        };
        assert_eq!(ramps.len(), 3);
        assert_eq!(ramps[1][65535], 65535);
    }

    #[test]
    fn test_reader_detection_by_name_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray_tiff(dir.path(), "a.tif", 2, 2);
        let fake = dir.path().join("fake.tif");
        std::fs::write(&fake, b"not a tiff at all").unwrap();

        let reader = TiffReader::new();
        assert!(reader.is_this_type(&path, false));
        assert!(reader.is_this_type(&path, true));
        assert!(reader.is_this_type(&fake, false));
        assert!(!reader.is_this_type(&fake, true));
        assert!(!reader.is_this_type(Path::new("a.png"), false));
    }

    #[test]
    fn test_reader_open_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray_tiff(dir.path(), "a.tif", 3, 2);
        let mut store = MemoryMetadataStore::new();

        let mut reader = TiffReader::new();
        reader.set_source(&path, &mut store).unwrap();
        assert_eq!(reader.series_count(), 1);
        assert_eq!(reader.core(0).unwrap().image_count, 1);
        assert_eq!(reader.open_full_plane(0, 0).unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(reader.used_files(false).unwrap().len(), 1);
        assert!(reader.used_files(true).unwrap().is_empty());
        assert_eq!(store.image(0).unwrap().pixels.as_ref().unwrap().size_x, 3);

        reader.close(false);
        assert!(!reader.is_initialized());
        assert!(reader.open_full_plane(0, 0).is_err());
    }
}
