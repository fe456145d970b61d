//! Per-plane and per-channel sample statistics.

use std::collections::HashMap;

use crate::error::ReaderError;
use crate::format::pixels::sample_ranges;
use crate::format::{CoreMetadata, FormatReader, LookupTable, Region, SampleRange};
use crate::meta::MetadataStore;

/// Decorator that records the sample range of every plane it reads in full.
///
/// The first full-plane read of a plane computes one [`SampleRange`] per
/// sample of the plane and folds them into running per-channel ranges.
/// Partial reads are passed through without statistics. The caches are only
/// dropped by `close(false)` or by binding a different dataset.
pub struct MinMaxCalculator {
    inner: Box<dyn FormatReader>,
    planes: HashMap<(usize, usize), Vec<SampleRange>>,
    /// Running ranges per series, indexed by channel.
    channels: Vec<Vec<Option<SampleRange>>>,
}

impl MinMaxCalculator {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        Self {
            inner,
            planes: HashMap::new(),
            channels: Vec::new(),
        }
    }

    /// Minimum of each sample of a plane, once it has been read in full.
    pub fn plane_minimum(&self, series: usize, plane: usize) -> Option<Vec<f64>> {
        self.planes
            .get(&(series, plane))
            .map(|ranges| ranges.iter().map(|r| r.min).collect())
    }

    /// Maximum of each sample of a plane, once it has been read in full.
    pub fn plane_maximum(&self, series: usize, plane: usize) -> Option<Vec<f64>> {
        self.planes
            .get(&(series, plane))
            .map(|ranges| ranges.iter().map(|r| r.max).collect())
    }

    fn clear(&mut self) {
        self.planes.clear();
        self.channels.clear();
    }

    fn record(
        &mut self,
        series: usize,
        plane: usize,
        core: &CoreMetadata,
        bytes: &[u8],
    ) -> Result<(), ReaderError> {
        let samples = core.rgb_channel_count;
        let ranges = sample_ranges(
            bytes,
            core.pixel_type,
            core.little_endian,
            samples,
            core.interleaved,
        );

        let first_channel = self.zct_coords(series, plane)?.c * samples;
        if self.channels.len() <= series {
            self.channels.resize_with(series + 1, Vec::new);
        }
        let running = &mut self.channels[series];
        if running.len() < core.size_c {
            running.resize(core.size_c, None);
        }
        for (offset, range) in ranges.iter().enumerate() {
            if let Some(slot) = running.get_mut(first_channel + offset) {
                let merged = match *slot {
                    Some(existing) => existing.union(range),
                    None => *range,
                };
                *slot = Some(merged);
            }
        }

        self.planes.insert((series, plane), ranges);
        Ok(())
    }
}

impl FormatReader for MinMaxCalculator {
    forward_to_inner!();

    fn set_source(
        &mut self,
        path: &std::path::Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        let before = self.inner.source().map(|p| p.to_path_buf());
        self.inner.set_source(path, store)?;
        if self.inner.source() != before.as_deref() {
            self.clear();
        }
        Ok(())
    }

    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        self.inner.core(series)
    }

    fn read_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        self.inner.read_plane(series, plane, region, buf)?;

        let core = self.inner.core(series)?.clone();
        if region.is_full(&core) && !self.planes.contains_key(&(series, plane)) {
            self.record(series, plane, &core, &buf[..core.full_plane_size()])?;
        }
        Ok(())
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        self.inner.lookup_table(series)
    }

    fn close(&mut self, file_only: bool) {
        self.inner.close(file_only);
        if !file_only {
            self.clear();
        }
    }

    fn plane_min_max(&self, series: usize, plane: usize) -> Option<Vec<SampleRange>> {
        self.planes.get(&(series, plane)).cloned()
    }

    fn channel_min_max(&self, series: usize, channel: usize) -> Option<SampleRange> {
        self.channels
            .get(series)
            .and_then(|running| running.get(channel).copied().flatten())
    }
}
