//! Test utilities for integration tests.
//!
//! This module synthesises datasets on disk: PerkinElmer companion-file
//! experiments with raw or palette TIFF pixel files, and numbered TIFF
//! series.

use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

/// Bytes in front of the pixels of a raw PerkinElmer record.
pub const RAW_HEADER: usize = 6;

// =============================================================================
// PerkinElmer Datasets
// =============================================================================

/// Description of a synthetic PerkinElmer experiment.
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub frames: usize,
    pub slices: usize,
    /// Number of raw pixel files written.
    pub files: usize,
}

impl Default for ExperimentLayout {
    fn default() -> Self {
        Self {
            width: 4,
            height: 3,
            channels: 1,
            frames: 1,
            slices: 5,
            files: 5,
        }
    }
}

/// The `.htm` describing file of an experiment.
pub fn experiment_htm(layout: &ExperimentLayout) -> String {
    format!(
        "<HTML><p>Image Width</p>{}<p>Image Length</p>{}\
         <p>Experiment details:</p>{} Wavelengths {} Frames {} Slices\
         <p>Start Time:</p>10:00:00 (03/14/2008)<p>Finish Time:</p>10:00:20 (03/14/2008)\
         <p>Camera Data 1: Exposure 250, Filter (520/40 nm) Excitation 488/10nm\
         <p>Lens</p>40x</HTML>",
        layout.width, layout.height, layout.channels, layout.frames, layout.slices
    )
}

/// Value stored in every pixel of raw file `n` (1-based).
pub fn raw_value(n: usize) -> u16 {
    n as u16 * 100
}

/// Write an experiment named `exp` into `dir`.
///
/// Pixel files are `exp_1.<hex n>` for `n` in `1..=layout.files`, each holding
/// one uint16 plane filled with [`raw_value`]. Returns the path of the
/// `.htm` file.
pub fn write_experiment(dir: &Path, layout: &ExperimentLayout) -> PathBuf {
    let htm = dir.join("exp.htm");
    fs::write(&htm, experiment_htm(layout)).unwrap();
    fs::write(
        dir.join("exp.tim"),
        format!(
            "{} 0 0 {} 0 um 0.25 0.25 {} {}",
            layout.channels, layout.slices, layout.width, layout.height
        ),
    )
    .unwrap();
    fs::write(dir.join("exp.csv"), "exported,from,acquisition,software\n").unwrap();

    let pixels = layout.width as usize * layout.height as usize;
    for n in 1..=layout.files {
        let mut bytes = vec![0u8; RAW_HEADER];
        for _ in 0..pixels {
            bytes.extend_from_slice(&raw_value(n).to_le_bytes());
        }
        fs::write(dir.join(format!("exp_1.{:x}", n)), bytes).unwrap();
    }
    htm
}

/// Write an experiment named `exp` whose pixel files are 4x2 palette TIFFs
/// `exp_001.tif`, `exp_002.tif`, ... built by [`palette_tiff_bytes`].
pub fn write_palette_experiment(dir: &Path, files: usize) -> PathBuf {
    let layout = ExperimentLayout {
        width: 4,
        height: 2,
        slices: files,
        files,
        ..Default::default()
    };
    let htm = dir.join("exp.htm");
    fs::write(&htm, experiment_htm(&layout)).unwrap();
    for n in 1..=files {
        fs::write(dir.join(format!("exp_{:03}.tif", n)), palette_tiff_bytes(4, 2)).unwrap();
    }
    htm
}

// =============================================================================
// TIFF Files
// =============================================================================

/// An uncompressed little-endian 8-bit palette TIFF.
///
/// Pixel `i` (row-major) holds index `i`; index `i` maps to red `i`, green
/// `255 - i` and blue 128.
pub fn palette_tiff_bytes(width: u16, height: u16) -> Vec<u8> {
    let entries: u16 = 10;
    let map_offset = 8 + 2 + 12 * entries as u32 + 4;
    let pixel_offset = map_offset + 3 * 256 * 2;
    let pixel_count = width as u32 * height as u32;

    let mut out = b"II".to_vec();
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    // (tag, type, count, value or offset), in ascending tag order.
    let ifd = [
        (256u16, 3u16, 1u32, width as u32),
        (257, 3, 1, height as u32),
        (258, 3, 1, 8),
        (259, 3, 1, 1),
        (262, 3, 1, 3),
        (273, 4, 1, pixel_offset),
        (277, 3, 1, 1),
        (278, 3, 1, height as u32),
        (279, 4, 1, pixel_count),
        (320, 3, 768, map_offset),
    ];
    for (tag, kind, count, value) in ifd {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes());

    let red = (0..256u16).map(|i| i << 8);
    let green = (0..256u16).map(|i| (255 - i) << 8);
    let blue = (0..256u16).map(|_| 0x8000);
    for entry in red.chain(green).chain(blue) {
        out.extend_from_slice(&entry.to_le_bytes());
    }
    out.extend((0..pixel_count).map(|i| i as u8));
    out
}

/// Write a gray 8-bit TIFF whose pixels are all `value`.
pub fn write_gray_tiff(path: &Path, width: u32, height: u32, value: u8) {
    let img = GrayImage::from_pixel(width, height, Luma([value]));
    img.save_with_format(path, ImageFormat::Tiff).unwrap();
}

/// Write an RGB TIFF with pixel `(x, y)` set to `(x, y, x + y)`.
pub fn write_rgb_tiff(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([x as u8, y as u8, (x + y) as u8])
    });
    img.save_with_format(path, ImageFormat::Tiff).unwrap();
}

/// Write `count` numbered gray TIFFs `<prefix><n>.tif`, `n` from 1.
///
/// File `n` is filled with `n * 10`.
pub fn write_numbered_tiffs(dir: &Path, prefix: &str, count: usize, width: u32, height: u32) {
    for n in 1..=count {
        let path = dir.join(format!("{}{}.tif", prefix, n));
        write_gray_tiff(&path, width, height, (n * 10) as u8);
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Decode little-endian uint16 samples.
pub fn u16_samples(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// File names of `paths`, in order.
pub fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}
