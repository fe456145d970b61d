//! Expansion of indexed-color planes through their lookup table.

use tracing::debug;

use crate::error::ReaderError;
use crate::format::pixels::{put_unsigned, sample_at};
use crate::format::reader::core_at;
use crate::format::{CoreMetadata, FormatReader, LookupTable, Region};
use crate::meta::{MetadataStore, PixelsDimensions};

/// Decorator that replaces palette indices with the colors they stand for.
///
/// Active for series that are indexed and not false-color. A filled series
/// reports interleaved samples of the table's bit depth, one per table ramp,
/// and no longer has a lookup table of its own.
pub struct ChannelFiller {
    inner: Box<dyn FormatReader>,
    cores: Vec<CoreMetadata>,
    tables: Vec<Option<LookupTable>>,
}

impl ChannelFiller {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        Self {
            inner,
            cores: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Whether planes of a series are being expanded.
    pub fn is_filling(&self, series: usize) -> bool {
        matches!(self.tables.get(series), Some(Some(_)))
    }

    fn filled_core(inner: &CoreMetadata, table: &LookupTable) -> CoreMetadata {
        let mut core = inner.clone();
        let ramps = table.channel_count();
        core.size_c = inner.effective_size_c() * ramps;
        core.rgb_channel_count = ramps;
        core.interleaved = true;
        core.pixel_type = table.output_pixel_type();
        core.bits_per_pixel = core.pixel_type.bits();
        core.indexed = false;
        core
    }
}

impl FormatReader for ChannelFiller {
    forward_to_inner!();

    fn set_source(
        &mut self,
        path: &std::path::Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        self.inner.set_source(path, store)?;
        self.cores.clear();
        self.tables.clear();

        for series in 0..self.inner.series_count() {
            let inner = self.inner.core(series)?.clone();
            let table = if inner.indexed && !inner.false_color && !inner.is_rgb() {
                self.inner
                    .lookup_table(series)?
                    .filter(|t| !t.is_empty() && t.channel_count() > 0)
            } else {
                None
            };

            match &table {
                Some(t) => {
                    debug!(
                        "Filling series {} through a {}-entry table",
                        series,
                        t.len()
                    );
                    let core = Self::filled_core(&inner, t);
                    store.set_pixels_dimensions(PixelsDimensions::from(&core), series);
                    self.cores.push(core);
                }
                None => self.cores.push(inner),
            }
            self.tables.push(table);
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
        let Some(Some(table)) = self.tables.get(series).cloned() else {
            return self.inner.read_plane(series, plane, region, buf);
        };

        let inner_core = self.inner.core(series)?.clone();
        let mut indices = vec![0u8; inner_core.plane_size(&region)];
        self.inner.read_plane(series, plane, region, &mut indices)?;

        let ramps = table.channel_count();
        for pixel in 0..region.area() {
            let index = sample_at(
                &indices,
                pixel,
                inner_core.pixel_type,
                inner_core.little_endian,
            ) as usize;
            for ramp in 0..ramps {
                let dst = pixel * ramps + ramp;
                match &table {
                    LookupTable::Bits8(t) => buf[dst] = ramp_entry(&t[ramp], index),
                    LookupTable::Bits16(t) => put_unsigned(
                        &mut buf[dst * 2..dst * 2 + 2],
                        u64::from(ramp_entry(&t[ramp], index)),
                        2,
                        inner_core.little_endian,
                    ),
                }
            }
        }
        Ok(())
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        if self.is_filling(series) {
            Ok(None)
        } else {
            self.inner.lookup_table(series)
        }
    }

    fn close(&mut self, file_only: bool) {
        self.inner.close(file_only);
        if !file_only {
            self.cores.clear();
            self.tables.clear();
        }
    }
}

/// Entry `index` of a ramp, clamped to the ramp's last entry. Empty ramps
/// read as zero.
fn ramp_entry<T: Copy + Default>(ramp: &[T], index: usize) -> T {
    ramp.get(index)
        .or_else(|| ramp.last())
        .copied()
        .unwrap_or_default()
}
