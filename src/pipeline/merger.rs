//! Merging of separate channel planes into one interleaved plane.

use crate::error::ReaderError;
use crate::format::reader::core_at;
use crate::format::{CoreMetadata, FormatReader, LookupTable, PlaneCoords, Region};
use crate::meta::MetadataStore;

/// Channel counts the merger will fold into one plane.
const MERGEABLE_CHANNELS: std::ops::RangeInclusive<usize> = 2..=4;

/// Decorator that reads one plane per channel and interleaves them.
///
/// Only series with single-sample planes and two to four channels are
/// merged; every other series passes through.
pub struct ChannelMerger {
    inner: Box<dyn FormatReader>,
    cores: Vec<CoreMetadata>,
    merged: Vec<bool>,
}

impl ChannelMerger {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        Self {
            inner,
            cores: Vec::new(),
            merged: Vec::new(),
        }
    }

    /// Whether a series is being merged.
    pub fn is_merging(&self, series: usize) -> bool {
        self.merged.get(series).copied().unwrap_or(false)
    }

    fn can_merge(core: &CoreMetadata) -> bool {
        !core.is_rgb() && MERGEABLE_CHANNELS.contains(&core.size_c)
    }

    fn merged_core(inner: &CoreMetadata) -> CoreMetadata {
        let mut core = inner.clone();
        core.rgb_channel_count = inner.size_c;
        core.interleaved = true;
        core.image_count = inner.image_count / inner.size_c;
        core
    }
}

impl FormatReader for ChannelMerger {
    forward_to_inner!();

    fn set_source(
        &mut self,
        path: &std::path::Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        self.inner.set_source(path, store)?;
        self.cores.clear();
        self.merged.clear();
        for series in 0..self.inner.series_count() {
            let inner = self.inner.core(series)?;
            let merge = Self::can_merge(inner);
            self.cores.push(if merge {
                Self::merged_core(inner)
            } else {
                inner.clone()
            });
            self.merged.push(merge);
        }
        Ok(())
    }

    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        core_at(&self.cores, series)
    }

    fn read_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        if !self.is_merging(series) {
            return self.inner.read_plane(series, plane, region, buf);
        }

        let inner_core = self.inner.core(series)?.clone();
        let channels = inner_core.size_c;
        let bpp = inner_core.bytes_per_pixel();
        let coords = self.zct_coords(series, plane)?;

        let mut channel_plane = vec![0u8; inner_core.plane_size(&region)];
        for channel in 0..channels {
            let source = self
                .inner
                .raster_index(series, PlaneCoords::new(coords.z, channel, coords.t))?;
            self.inner
                .read_plane(series, source, region, &mut channel_plane)?;

            for pixel in 0..region.area() {
                let dst = (pixel * channels + channel) * bpp;
                buf[dst..dst + bpp].copy_from_slice(&channel_plane[pixel * bpp..(pixel + 1) * bpp]);
            }
        }
        Ok(())
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        self.inner.lookup_table(series)
    }

    fn close(&mut self, file_only: bool) {
        self.inner.close(file_only);
        if !file_only {
            self.cores.clear();
            self.merged.clear();
        }
    }
}
