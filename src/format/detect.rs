//! Format detection for microscopy datasets.
//!
//! Detection walks a fixed candidate list and asks each reader whether it
//! accepts the file. Currently supports:
//!
//! - **PerkinElmer Ultraview**: companion-file datasets described by an `.htm`
//!   file, with TIFF or hexadecimal-numbered raw pixel files
//! - **TIFF**: single-plane TIFF files
//!
//! There is no guessing beyond the list: a file no candidate accepts is an
//! unsupported format.

use std::path::Path;

use crate::error::FormatError;

use super::perkin_elmer::PerkinElmerReader;
use super::reader::FormatReader;
use super::tiff::TiffReader;

// =============================================================================
// DatasetFormat
// =============================================================================

/// Detected dataset format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// PerkinElmer Ultraview companion-file dataset
    PerkinElmer,

    /// Single-plane TIFF file
    Tiff,
}

impl DatasetFormat {
    /// Candidates in the order they are tried.
    pub const CANDIDATES: [DatasetFormat; 2] = [DatasetFormat::PerkinElmer, DatasetFormat::Tiff];

    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            DatasetFormat::PerkinElmer => "PerkinElmer",
            DatasetFormat::Tiff => "Tagged Image File Format",
        }
    }

    /// Ask a fresh reader of this format whether it accepts `path`.
    fn accepts(&self, path: &Path, allow_open: bool) -> bool {
        match self {
            DatasetFormat::PerkinElmer => PerkinElmerReader::new().is_this_type(path, allow_open),
            DatasetFormat::Tiff => TiffReader::new().is_this_type(path, allow_open),
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// TIFF header size in bytes.
const TIFF_HEADER_SIZE: usize = 8;

/// Marker string that must appear in PerkinElmer `.cfg` files.
pub const ULTRAVIEW_MARKER: &[u8] = b"Ultraview";

/// Detect the format of a dataset file.
///
/// # Returns
/// * `Ok(DatasetFormat)` - The first candidate that accepts the file
/// * `Err(FormatError::UnsupportedFormat)` - No candidate accepts it
pub fn detect_format(path: &Path) -> Result<DatasetFormat, FormatError> {
    DatasetFormat::CANDIDATES
        .into_iter()
        .find(|format| format.accepts(path, true))
        .ok_or_else(|| FormatError::UnsupportedFormat {
            reason: format!("no reader accepts {}", path.display()),
        })
}

/// Check if bytes contain a marker string.
pub fn contains_marker(data: &[u8], marker: &[u8]) -> bool {
    if marker.is_empty() {
        return true;
    }
    data.windows(marker.len()).any(|window| window == marker)
}

/// Check if bytes represent a valid TIFF or BigTIFF header.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let version = match &bytes[0..2] {
        b"II" => u16::from_le_bytes([bytes[2], bytes[3]]),
        b"MM" => u16::from_be_bytes([bytes[2], bytes[3]]),
        _ => return false,
    };
    version == 42 || version == 43
}

// =============================================================================
// Tests
// =============================================================================
