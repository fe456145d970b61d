use thiserror::Error;

/// I/O errors that can occur when reading dataset files.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File or directory does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// Underlying filesystem failure (permissions, device errors, ...)
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Failed to write an output file
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// Requested range exceeds file bounds
    #[error("Range out of bounds in {path}: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        path: String,
        offset: u64,
        requested: u64,
        size: u64,
    },
}

impl IoError {
    /// Build an error from a `std::io::Error`, keeping the path for context.
    pub fn from_std(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        let path = path.as_ref().display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::Read {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Structural problems with a dataset that was recognized by name.
///
/// These are never retried: the whole dataset is rejected.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// No reader in the candidate list accepted the file
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// A required companion file was not found next to the entry file
    #[error("Missing companion file: {0}")]
    MissingCompanion(String),

    /// No pixel data files belong to the dataset
    #[error("No pixel data files found for {0}")]
    NoPixelFiles(String),

    /// A header or fixed-layout field could not be interpreted
    #[error("Invalid header in {path}: {message}")]
    InvalidHeader { path: String, message: String },

    /// Payload decoding failed
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    /// The requested grouping mode is not possible for this format
    #[error("Unsupported grouping: {0}")]
    UnsupportedGrouping(String),

    /// File pattern could not be expanded into a consistent file set
    #[error("Invalid file pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Contract violations by the caller of a reader.
///
/// These indicate a bug on the calling side and are never swallowed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    /// A data accessor was called before `set_source` (or after `close`)
    #[error("Reader has no source; call set_source first")]
    NotInitialized,

    /// Series index outside `[0, series_count)`
    #[error("Series {series} out of range (series count is {count})")]
    SeriesOutOfRange { series: usize, count: usize },

    /// Plane index outside `[0, image_count)`
    #[error("Plane {plane} out of range (plane count is {count})")]
    PlaneOutOfRange { plane: usize, count: usize },

    /// Z/C/T coordinate outside the series dimensions
    #[error("Coordinate ({z}, {c}, {t}) out of range for sizes ({size_z}, {size_c}, {size_t})")]
    CoordinateOutOfRange {
        z: usize,
        c: usize,
        t: usize,
        size_z: usize,
        size_c: usize,
        size_t: usize,
    },

    /// Sub-region does not fit inside the image
    #[error("Region {w}x{h} at ({x}, {y}) exceeds image size {width}x{height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        width: u32,
        height: u32,
    },

    /// Caller-supplied buffer is too small for the requested region
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },
}

/// Errors returned by every reader operation.
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Errors raised by the conversion driver.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// Reading the source dataset failed
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Writing output failed
    #[error("Writer error: {message}")]
    Writer { message: String },

    /// Output exists and the overwrite policy forbids replacing it
    #[error("Output file {0} already exists")]
    OutputExists(String),

    /// Invalid driver configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The host requested cancellation between planes
    #[error("Conversion cancelled after {planes_written} plane(s)")]
    Cancelled { planes_written: usize },
}

impl From<IoError> for ConvertError {
    fn from(err: IoError) -> Self {
        ConvertError::Reader(ReaderError::Io(err))
    }
}

impl From<UsageError> for ConvertError {
    fn from(err: UsageError) -> Self {
        ConvertError::Reader(ReaderError::Usage(err))
    }
}
