use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a dataset file.
///
/// Readers decode planes by asking for exactly the bytes they need instead of
/// loading whole files. Reads are synchronous and block the calling thread.
pub trait RangeReader {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    /// Partial reads are never returned.
    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging).
    fn identifier(&self) -> &str;
}

// =============================================================================
// Local File Reader
// =============================================================================

/// Range reader over a local file.
///
/// Holds one open file handle; dropping the reader releases it.
#[derive(Debug)]
pub struct FileRangeReader {
    file: File,
    path: PathBuf,
    identifier: String,
    size: u64,
}

impl FileRangeReader {
    /// Open a file for range reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IoError::from_std(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| IoError::from_std(path, e))?
            .len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            identifier: path.display().to_string(),
            size,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeReader for FileRangeReader {
    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(IoError::RangeOutOfBounds {
                path: self.identifier.clone(),
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| IoError::from_std(&self.path, e))?;

        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| IoError::from_std(&self.path, e))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Byte Order
// =============================================================================

macro_rules! ordered_reader {
    ($name:ident, $ty:ty) => {
        /// Decode the leading bytes of `bytes` in the given byte order.
        ///
        /// Panics when `bytes` is shorter than the integer.
        #[inline]
        pub fn $name(bytes: &[u8], little_endian: bool) -> $ty {
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
            if little_endian {
                <$ty>::from_le_bytes(raw)
            } else {
                <$ty>::from_be_bytes(raw)
            }
        }
    };
}

ordered_reader!(read_u16, u16);
ordered_reader!(read_u32, u32);
ordered_reader!(read_u64, u64);
