//! In-memory reader used by the decorator tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ReaderError;
use crate::format::{CoreMetadata, FormatReader, GroupingPolicy, LookupTable, Region};
use crate::meta::{populate_pixels, MetadataStore};

/// Reader serving fixed planes of a single series.
#[derive(Debug, Clone)]
pub struct MockReader {
    core: CoreMetadata,
    planes: Vec<Vec<u8>>,
    lut: Option<LookupTable>,
    source: Option<PathBuf>,
    metadata: BTreeMap<String, String>,
    pub reads: usize,
}

impl MockReader {
    pub fn new(core: CoreMetadata, planes: Vec<Vec<u8>>) -> Self {
        assert_eq!(core.image_count, planes.len());
        Self {
            core,
            planes,
            lut: None,
            source: None,
            metadata: BTreeMap::new(),
            reads: 0,
        }
    }

    pub fn with_lut(mut self, lut: LookupTable) -> Self {
        self.lut = Some(lut);
        self
    }

    /// A bound reader, as if `set_source` had run.
    pub fn opened(mut self) -> Self {
        self.source = Some(PathBuf::from("/mock/data.bin"));
        self
    }
}

impl FormatReader for MockReader {
    fn format_name(&self) -> &'static str {
        "Mock"
    }

    fn is_this_type(&self, _path: &Path, _allow_open: bool) -> bool {
        true
    }

    fn grouping_policy(&self, _path: &Path) -> GroupingPolicy {
        GroupingPolicy::Never
    }

    fn set_source(
        &mut self,
        path: &Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        self.source = Some(path.to_path_buf());
        populate_pixels(store, self)
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn series_count(&self) -> usize {
        usize::from(self.source.is_some())
    }

    fn core(&self, _series: usize) -> Result<&CoreMetadata, ReaderError> {
        Ok(&self.core)
    }

    fn read_plane(
        &mut self,
        _series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        self.reads += 1;
        copy_region(&self.planes[plane], &self.core, region, buf);
        Ok(())
    }

    fn lookup_table(&mut self, _series: usize) -> Result<Option<LookupTable>, ReaderError> {
        Ok(self.lut.clone())
    }

    fn used_files(&self, _no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError> {
        Ok(self.source.iter().cloned().collect())
    }

    fn global_metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn close(&mut self, file_only: bool) {
        if !file_only {
            self.source = None;
        }
    }
}

/// Copy a region out of a full plane laid out as described by `core`.
pub fn copy_region(plane: &[u8], core: &CoreMetadata, region: Region, buf: &mut [u8]) {
    let bpp = core.bytes_per_pixel();
    let width = core.size_x as usize;
    let height = core.size_y as usize;
    let (rx, ry) = (region.x as usize, region.y as usize);
    let (rw, rh) = (region.width as usize, region.height as usize);

    if core.interleaved {
        let px = bpp * core.rgb_channel_count;
        for row in 0..rh {
            let src = ((ry + row) * width + rx) * px;
            let dst = row * rw * px;
            buf[dst..dst + rw * px].copy_from_slice(&plane[src..src + rw * px]);
        }
    } else {
        for ch in 0..core.rgb_channel_count {
            for row in 0..rh {
                let src = (ch * width * height + (ry + row) * width + rx) * bpp;
                let dst = (ch * rw * rh + row * rw) * bpp;
                buf[dst..dst + rw * bpp].copy_from_slice(&plane[src..src + rw * bpp]);
            }
        }
    }
}
