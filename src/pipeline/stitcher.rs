//! Stitching of numbered files into one dataset.
//!
//! The stitcher turns a file name into a [`FilePattern`] and presents the
//! matched files as one series with an extra axis. A single inner reader is
//! re-bound to whichever file holds the requested plane, so at most one file
//! is open at a time.
//!
//! Plane `p` of the stitched series lives in file `p / n` at inner plane
//! `p % n`, where `n` is the plane count of one file. The stitched axis is
//! moved to the outermost position of the dimension order, which keeps that
//! mapping consistent with the raster index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FormatError, IoError, ReaderError};
use crate::format::reader::core_at;
use crate::format::{Axis, CoreMetadata, FormatReader, GroupingPolicy, LookupTable, Region};
use crate::io::{absolute, list_dir, parent_dir};
use crate::meta::{populate_pixels, MemoryMetadataStore, MetadataStore};

use super::file_pattern::{find_pattern, FilePattern};

/// Decorator that treats a numbered file set as one dataset.
pub struct FileStitcher {
    inner: Box<dyn FormatReader>,
    source: Option<PathBuf>,
    pattern: Option<FilePattern>,
    files: Vec<PathBuf>,
    current_file: Option<usize>,
    axis: Option<Axis>,
    cores: Vec<CoreMetadata>,
    /// Plane count of one file, per series.
    inner_counts: Vec<usize>,
}

impl FileStitcher {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        Self {
            inner,
            source: None,
            pattern: None,
            files: Vec::new(),
            current_file: None,
            axis: None,
            cores: Vec::new(),
            inner_counts: Vec::new(),
        }
    }

    /// Whether more than one file is being stitched.
    pub fn is_stitching(&self) -> bool {
        self.axis.is_some()
    }

    /// Axis the files are stacked along.
    pub fn axis(&self) -> Option<Axis> {
        self.axis
    }

    /// Files matched by the pattern, in plane order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn pattern(&self) -> Option<&FilePattern> {
        self.pattern.as_ref()
    }

    fn reset(&mut self) {
        self.source = None;
        self.pattern = None;
        self.files.clear();
        self.current_file = None;
        self.axis = None;
        self.cores.clear();
        self.inner_counts.clear();
    }

    /// Bind the inner reader to file `index` and check it matches file 0.
    fn bind_file(&mut self, index: usize) -> Result<(), ReaderError> {
        if self.current_file == Some(index) {
            return Ok(());
        }
        let path = self.files[index].clone();
        debug!("Switching to {}", path.display());

        // Unbound until the new file opens and matches.
        self.current_file = None;
        let mut scratch = MemoryMetadataStore::new();
        self.inner.set_source(&path, &mut scratch)?;

        let expected = core_at(&self.cores, 0)?;
        let found = self.inner.core(0)?;
        let matches = found.size_x == expected.size_x
            && found.size_y == expected.size_y
            && found.pixel_type == expected.pixel_type
            && found.rgb_channel_count == expected.rgb_channel_count
            && Some(&found.image_count) == self.inner_counts.first();
        if !matches {
            return Err(self.pattern_error(format!(
                "{} does not have the dimensions of the first file",
                path.display()
            )));
        }
        self.current_file = Some(index);
        Ok(())
    }

    fn pattern_error(&self, message: String) -> ReaderError {
        FormatError::InvalidPattern {
            pattern: self
                .pattern
                .as_ref()
                .map(|p| p.pattern().to_string())
                .unwrap_or_default(),
            message,
        }
        .into()
    }

    /// Pick the axis to stitch along: the guessed one when the inner series
    /// is flat there, otherwise the first flat axis of T, Z, C.
    fn choose_axis(guessed: Axis, core: &CoreMetadata) -> Option<Axis> {
        let flat = |axis: Axis| match axis {
            Axis::Z => core.size_z == 1,
            Axis::C => core.effective_size_c() == 1,
            Axis::T => core.size_t == 1,
        };
        std::iter::once(guessed)
            .chain([Axis::T, Axis::Z, Axis::C])
            .find(|axis| flat(*axis))
    }

    fn stitched_core(inner: &CoreMetadata, axis: Axis, files: usize) -> CoreMetadata {
        let mut core = inner.clone();
        match axis {
            Axis::Z => core.size_z = files,
            Axis::C => core.size_c = inner.rgb_channel_count * files,
            Axis::T => core.size_t = files,
        }
        core.image_count = inner.image_count * files;
        core.dimension_order = inner.dimension_order.with_outermost(axis);
        core
    }
}

impl FormatReader for FileStitcher {
    fn format_name(&self) -> &'static str {
        self.inner.format_name()
    }

    fn is_this_type(&self, path: &Path, allow_open: bool) -> bool {
        self.inner.is_this_type(path, allow_open)
    }

    fn grouping_policy(&self, path: &Path) -> GroupingPolicy {
        self.inner.grouping_policy(path)
    }

    fn set_source(
        &mut self,
        path: &Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        let wanted = absolute(path);
        if self.source.as_deref() == Some(wanted.as_path()) || self.files.contains(&wanted) {
            return Ok(());
        }
        self.close(false);

        let pattern_text = if FilePattern::is_pattern(&wanted) {
            Some(wanted.display().to_string())
        } else {
            find_pattern(&wanted)?
        };
        let Some(pattern_text) = pattern_text else {
            self.inner.set_source(&wanted, store)?;
            self.source = Some(wanted.clone());
            self.files = vec![wanted];
            return Ok(());
        };

        let pattern = FilePattern::parse(&pattern_text)?;
        let listed = list_dir(&parent_dir(&wanted))?.len();
        if pattern.file_count() > listed {
            return Err(IoError::NotFound(pattern_text).into());
        }
        let files = pattern.files();
        if let Some(missing) = files.iter().find(|f| !f.exists()) {
            return Err(IoError::NotFound(missing.display().to_string()).into());
        }
        let first = if FilePattern::is_pattern(&wanted) {
            files[0].clone()
        } else {
            wanted.clone()
        };

        self.pattern = Some(pattern);
        if let Err(e) = self.inner.set_source(&first, store) {
            self.reset();
            return Err(e);
        }
        self.source = Some(wanted);
        self.current_file = files.iter().position(|f| *f == first);

        // Formats that already group the matched files need no stitching.
        let owned = self.inner.used_files(false)?;
        if files.len() == 1 || files.iter().all(|f| owned.contains(f)) {
            self.files = files;
            return Ok(());
        }

        let guessed = self
            .pattern
            .as_ref()
            .and_then(|p| p.blocks().first())
            .map_or(Axis::T, |b| b.axis);
        let first_core = self.inner.core(0)?.clone();
        let Some(axis) = Self::choose_axis(guessed, &first_core) else {
            let err = self.pattern_error("every axis of the first file is already used".into());
            self.close(false);
            return Err(err);
        };

        let mut cores = Vec::with_capacity(self.inner.series_count());
        let mut inner_counts = Vec::with_capacity(self.inner.series_count());
        for series in 0..self.inner.series_count() {
            let inner = self.inner.core(series)?;
            inner_counts.push(inner.image_count);
            cores.push(Self::stitched_core(inner, axis, files.len()));
        }

        info!(
            "Stitching {} files along {:?} ({})",
            files.len(),
            axis,
            pattern_text
        );
        self.axis = Some(axis);
        self.cores = cores;
        self.inner_counts = inner_counts;
        self.files = files;

        populate_pixels(store, &*self)
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn series_count(&self) -> usize {
        if self.is_stitching() {
            self.cores.len()
        } else {
            self.inner.series_count()
        }
    }

    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        if self.is_stitching() {
            core_at(&self.cores, series)
        } else {
            self.inner.core(series)
        }
    }

    fn read_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        if !self.is_stitching() {
            return self.inner.read_plane(series, plane, region, buf);
        }
        let per_file = self.inner_counts.get(series).copied().unwrap_or(1).max(1);
        self.bind_file(plane / per_file)?;
        self.inner.read_plane(series, plane % per_file, region, buf)
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        self.inner.lookup_table(series)
    }

    fn used_files(&self, no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError> {
        if !self.is_stitching() {
            return self.inner.used_files(no_pixels);
        }
        if no_pixels {
            self.inner.used_files(true)
        } else {
            Ok(self.files.clone())
        }
    }

    fn global_metadata(&self) -> &BTreeMap<String, String> {
        self.inner.global_metadata()
    }

    fn close(&mut self, file_only: bool) {
        self.inner.close(file_only);
        if file_only {
            if self.is_stitching() {
                self.current_file = None;
            }
        } else {
            self.reset();
        }
    }

    fn optimal_tile_size(&self, series: usize) -> Result<(u32, u32), ReaderError> {
        self.inner.optimal_tile_size(series)
    }
}
