//! Splitting of interleaved RGB planes into one plane per channel.

use tracing::debug;

use crate::error::ReaderError;
use crate::format::pixels::extract_channel;
use crate::format::reader::core_at;
use crate::format::{CoreMetadata, FormatReader, LookupTable, PlaneCoords, Region};
use crate::meta::MetadataStore;

/// Inner plane kept after the last request.
struct CachedPlane {
    series: usize,
    plane: usize,
    region: Region,
    bytes: Vec<u8>,
}

/// Decorator that exposes every sample of an RGB plane as its own plane.
///
/// The channel count is unchanged (it already counts every sample); each
/// plane now carries a single sample per pixel, so the plane count grows by
/// the interleave factor. Readers without multi-sample planes pass through
/// untouched.
pub struct ChannelSeparator {
    inner: Box<dyn FormatReader>,
    cores: Vec<CoreMetadata>,
    last: Option<CachedPlane>,
}

impl ChannelSeparator {
    pub fn new(inner: Box<dyn FormatReader>) -> Self {
        Self {
            inner,
            cores: Vec::new(),
            last: None,
        }
    }

    fn separated_core(inner: &CoreMetadata) -> CoreMetadata {
        let mut core = inner.clone();
        if inner.is_rgb() {
            core.image_count = inner.image_count * inner.rgb_channel_count;
            core.rgb_channel_count = 1;
            core.interleaved = false;
        }
        core
    }
}

impl FormatReader for ChannelSeparator {
    forward_to_inner!();

    fn set_source(
        &mut self,
        path: &std::path::Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        self.inner.set_source(path, store)?;
        self.last = None;
        self.cores = (0..self.inner.series_count())
            .map(|series| self.inner.core(series).map(Self::separated_core))
            .collect::<Result<_, _>>()?;
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
        let inner_core = self.inner.core(series)?.clone();
        if !inner_core.is_rgb() {
            return self.inner.read_plane(series, plane, region, buf);
        }

        let samples = inner_core.rgb_channel_count;
        let coords = self.zct_coords(series, plane)?;
        let source = self.inner.raster_index(
            series,
            PlaneCoords::new(coords.z, coords.c / samples, coords.t),
        )?;
        let channel = coords.c % samples;

        let cached = matches!(
            &self.last,
            Some(c) if c.series == series && c.plane == source && c.region == region
        );
        if !cached {
            debug!("Decoding inner plane {} of series {}", source, series);
            let mut bytes = vec![0u8; inner_core.plane_size(&region)];
            self.inner.read_plane(series, source, region, &mut bytes)?;
            self.last = Some(CachedPlane {
                series,
                plane: source,
                region,
                bytes,
            });
        }

        if let Some(last) = &self.last {
            extract_channel(
                &last.bytes,
                region.area(),
                samples,
                channel,
                inner_core.bytes_per_pixel(),
                inner_core.interleaved,
                buf,
            );
        }
        Ok(())
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        self.inner.lookup_table(series)
    }

    fn close(&mut self, file_only: bool) {
        self.last = None;
        self.inner.close(file_only);
        if !file_only {
            self.cores.clear();
        }
    }
}
