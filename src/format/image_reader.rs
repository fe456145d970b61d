//! Dispatching reader: detects the format of a file and forwards every call
//! to the matching concrete reader.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{FormatError, ReaderError, UsageError};
use crate::io::absolute;
use crate::meta::MetadataStore;

use super::core::{CoreMetadata, LookupTable, Region};
use super::detect::{detect_format, DatasetFormat};
use super::perkin_elmer::PerkinElmerReader;
use super::reader::{FormatReader, GroupingPolicy, SampleRange};
use super::tiff::TiffReader;

/// Format-specific readers.
///
/// An enum rather than a boxed trait object: the candidate list is closed and
/// the concrete reader stays visible to callers that want it.
#[derive(Debug)]
pub enum AnyReader {
    PerkinElmer(PerkinElmerReader),
    Tiff(TiffReader),
}

impl AnyReader {
    /// A fresh, uninitialized reader for a format.
    pub fn new(format: DatasetFormat) -> Self {
        match format {
            DatasetFormat::PerkinElmer => AnyReader::PerkinElmer(PerkinElmerReader::new()),
            DatasetFormat::Tiff => AnyReader::Tiff(TiffReader::new()),
        }
    }

    pub fn format(&self) -> DatasetFormat {
        match self {
            AnyReader::PerkinElmer(_) => DatasetFormat::PerkinElmer,
            AnyReader::Tiff(_) => DatasetFormat::Tiff,
        }
    }

    fn as_reader(&self) -> &dyn FormatReader {
        match self {
            AnyReader::PerkinElmer(r) => r,
            AnyReader::Tiff(r) => r,
        }
    }

    fn as_reader_mut(&mut self) -> &mut dyn FormatReader {
        match self {
            AnyReader::PerkinElmer(r) => r,
            AnyReader::Tiff(r) => r,
        }
    }
}

/// Reader that picks the concrete format on `set_source`.
///
/// With file grouping disabled, formats whose files are only meaningful as
/// a group are rejected.
#[derive(Debug)]
pub struct ImageReader {
    inner: Option<AnyReader>,
    group_files: bool,
    empty_metadata: BTreeMap<String, String>,
}

impl Default for ImageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader {
    pub fn new() -> Self {
        Self {
            inner: None,
            group_files: true,
            empty_metadata: BTreeMap::new(),
        }
    }

    /// Set whether multi-file datasets may be assembled from siblings.
    pub fn with_grouping(mut self, group_files: bool) -> Self {
        self.group_files = group_files;
        self
    }

    pub fn group_files(&self) -> bool {
        self.group_files
    }

    /// Format of the open dataset.
    pub fn format(&self) -> Option<DatasetFormat> {
        self.inner.as_ref().map(AnyReader::format)
    }

    /// The concrete reader of the open dataset.
    pub fn inner(&self) -> Option<&AnyReader> {
        self.inner.as_ref()
    }

    fn reader(&self) -> Result<&dyn FormatReader, ReaderError> {
        self.inner
            .as_ref()
            .map(AnyReader::as_reader)
            .ok_or_else(|| UsageError::NotInitialized.into())
    }

    fn reader_mut(&mut self) -> Result<&mut dyn FormatReader, ReaderError> {
        self.inner
            .as_mut()
            .map(AnyReader::as_reader_mut)
            .ok_or_else(|| UsageError::NotInitialized.into())
    }
}

impl FormatReader for ImageReader {
    fn format_name(&self) -> &'static str {
        match &self.inner {
            Some(inner) => inner.format().name(),
            None => "Image",
        }
    }

    fn is_this_type(&self, path: &Path, allow_open: bool) -> bool {
        DatasetFormat::CANDIDATES
            .into_iter()
            .any(|format| AnyReader::new(format).as_reader().is_this_type(path, allow_open))
    }

    fn grouping_policy(&self, path: &Path) -> GroupingPolicy {
        match detect_format(path) {
            Ok(format) => AnyReader::new(format).as_reader().grouping_policy(path),
            Err(_) => GroupingPolicy::Never,
        }
    }

    fn set_source(
        &mut self,
        path: &Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        if let Some(inner) = self.inner.as_ref() {
            let reader = inner.as_reader();
            let wanted = absolute(path);
            let already_open = reader.source() == Some(wanted.as_path())
                || reader
                    .used_files(false)
                    .map(|files| files.contains(&wanted))
                    .unwrap_or(false);
            if already_open {
                return Ok(());
            }
        }
        self.close(false);

        let format = detect_format(path)?;
        debug!("Detected {} for {}", format.name(), path.display());

        let mut inner = AnyReader::new(format);
        if !self.group_files && inner.as_reader().grouping_policy(path) == GroupingPolicy::Must {
            return Err(FormatError::UnsupportedGrouping(format!(
                "{} files must be grouped, but grouping is disabled",
                format.name()
            ))
            .into());
        }

        inner.as_reader_mut().set_source(path, store)?;
        self.inner = Some(inner);
        Ok(())
    }

    fn source(&self) -> Option<&Path> {
        self.inner.as_ref().and_then(|r| r.as_reader().source())
    }

    fn series_count(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |r| r.as_reader().series_count())
    }

    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        self.reader()?.core(series)
    }

    fn read_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        self.reader_mut()?.read_plane(series, plane, region, buf)
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        self.reader_mut()?.lookup_table(series)
    }

    fn used_files(&self, no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError> {
        self.reader()?.used_files(no_pixels)
    }

    fn global_metadata(&self) -> &BTreeMap<String, String> {
        match &self.inner {
            Some(inner) => inner.as_reader().global_metadata(),
            None => &self.empty_metadata,
        }
    }

    fn close(&mut self, file_only: bool) {
        if file_only {
            if let Some(inner) = self.inner.as_mut() {
                inner.as_reader_mut().close(true);
            }
        } else if let Some(mut inner) = self.inner.take() {
            inner.as_reader_mut().close(false);
        }
    }

    fn optimal_tile_size(&self, series: usize) -> Result<(u32, u32), ReaderError> {
        self.reader()?.optimal_tile_size(series)
    }

    fn plane_min_max(&self, series: usize, plane: usize) -> Option<Vec<SampleRange>> {
        self.inner
            .as_ref()
            .and_then(|r| r.as_reader().plane_min_max(series, plane))
    }

    fn channel_min_max(&self, series: usize, channel: usize) -> Option<SampleRange> {
        self.inner
            .as_ref()
            .and_then(|r| r.as_reader().channel_min_max(series, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MemoryMetadataStore;
    use image::{GrayImage, ImageFormat, Luma};

    fn write_tiff(path: &Path) {
        let img = GrayImage::from_fn(4, 2, |x, y| Luma([(x + 4 * y) as u8]));
        img.save_with_format(path, ImageFormat::Tiff).unwrap();
    }

    #[test]
    fn test_dispatches_to_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plane.tif");
        write_tiff(&path);

        let mut store = MemoryMetadataStore::new();
        let mut reader = ImageReader::new();
        reader.set_source(&path, &mut store).unwrap();

        assert_eq!(reader.format(), Some(DatasetFormat::Tiff));
        assert_eq!(reader.format_name(), "Tagged Image File Format");
        assert_eq!(reader.open_full_plane(0, 0).unwrap().len(), 8);
    }

    #[test]
    fn test_uninitialized_errors() {
        let mut reader = ImageReader::new();
        assert_eq!(reader.series_count(), 0);
        assert!(reader.global_metadata().is_empty());
        assert!(matches!(
            reader.open_full_plane(0, 0),
            Err(ReaderError::Usage(UsageError::NotInitialized))
        ));
    }

    #[test]
    fn test_grouping_disabled_rejects_companion_dataset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("exp.htm"),
            "<HTML><p>Image Width</p>2<p>Image Length</p>2</HTML>",
        )
        .unwrap();
        std::fs::write(dir.path().join("exp_1.1"), [0u8; 10]).unwrap();

        let mut store = MemoryMetadataStore::new();
        let mut reader = ImageReader::new().with_grouping(false);
        let err = reader
            .set_source(&dir.path().join("exp.htm"), &mut store)
            .unwrap_err();
        assert!(matches!(
            err,
            ReaderError::Format(FormatError::UnsupportedGrouping(_))
        ));

        let mut reader = ImageReader::new();
        reader
            .set_source(&dir.path().join("exp.htm"), &mut store)
            .unwrap();
        assert_eq!(reader.format(), Some(DatasetFormat::PerkinElmer));
    }
}
