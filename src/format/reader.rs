//! FormatReader trait: the contract every reader and decorator satisfies.
//!
//! A reader is created uninitialized, bound to a dataset with
//! [`FormatReader::set_source`], queried and read plane by plane, and finally
//! released with [`FormatReader::close`]. All accessors take the series index
//! explicitly; there is no hidden "current series" state.
//!
//! Plane access is split in two: implementations provide
//! [`FormatReader::read_plane`], which may assume its parameters are valid,
//! and callers use the provided [`FormatReader::open_plane_into`] /
//! [`FormatReader::open_plane`], which validate against the series bounds
//! first.
//!
//! Readers are not thread-safe. Every data access takes `&mut self`, so the
//! single-owner discipline is enforced by the borrow checker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ReaderError, UsageError};
use crate::meta::MetadataStore;

use super::core::{CoreMetadata, LookupTable, Region};
use super::dimensions::{raster_index, zct_coords, PlaneCoords, ZctSizes};
use super::pixels::PlaneSamples;

/// Longest edge of a thumbnail, in pixels.
pub const THUMBNAIL_SIZE: u32 = 128;

/// Target size of one tile in bytes, used for the default tiling hint.
const DEFAULT_TILE_BYTES: usize = 1024 * 1024;

// =============================================================================
// Grouping Policy
// =============================================================================

/// Whether files of a format form multi-file datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingPolicy {
    /// Every file is a dataset on its own.
    Never,
    /// Files may be grouped with siblings, or read individually.
    May,
    /// Files are only meaningful as part of a group.
    Must,
}

// =============================================================================
// Per-plane statistics
// =============================================================================

/// Minimum and maximum sample value of one channel of a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRange {
    pub min: f64,
    pub max: f64,
}

impl SampleRange {
    /// Range of a sequence of samples, or `None` if it is empty.
    pub fn of(samples: impl IntoIterator<Item = f64>) -> Option<Self> {
        samples.into_iter().fold(None, |acc, s| match acc {
            None => Some(SampleRange { min: s, max: s }),
            Some(r) => Some(SampleRange {
                min: r.min.min(s),
                max: r.max.max(s),
            }),
        })
    }

    /// Smallest range containing both.
    pub fn union(&self, other: &SampleRange) -> SampleRange {
        SampleRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

// =============================================================================
// FormatReader Trait
// =============================================================================

/// Capability surface shared by concrete readers and decorators.
pub trait FormatReader {
    /// Human-readable format name.
    fn format_name(&self) -> &'static str;

    /// Test whether `path` belongs to this format.
    ///
    /// With `allow_open == false` the decision must be made from the name
    /// alone, without touching the filesystem.
    fn is_this_type(&self, path: &Path, allow_open: bool) -> bool;

    /// How files of this format relate to multi-file datasets.
    fn grouping_policy(&self, path: &Path) -> GroupingPolicy;

    /// Bind the reader to a dataset and populate `store`.
    ///
    /// Calling this again with the entry file (or any used file) of the
    /// already-open dataset is a no-op.
    fn set_source(&mut self, path: &Path, store: &mut dyn MetadataStore)
        -> Result<(), ReaderError>;

    /// Entry file of the open dataset, if any.
    fn source(&self) -> Option<&Path>;

    /// Number of series; zero before `set_source`.
    fn series_count(&self) -> usize;

    /// Core metadata of a series.
    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError>;

    /// Decode a plane region into `buf`.
    ///
    /// Called by [`FormatReader::open_plane_into`] after validation; `buf` is
    /// at least `core.plane_size(&region)` bytes long.
    fn read_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError>;

    /// Palette of an indexed series.
    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError>;

    /// Every physical file of the open dataset, in a stable order.
    ///
    /// With `no_pixels`, files that only hold pixel data are left out.
    fn used_files(&self, no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError>;

    /// Raw key/value pairs collected while parsing.
    fn global_metadata(&self) -> &BTreeMap<String, String>;

    /// Release resources.
    ///
    /// With `file_only` only open file handles are dropped and the dataset
    /// stays bound; otherwise the reader returns to its uninitialized state.
    fn close(&mut self, file_only: bool);

    /// Preferred tile size `(width, height)` for reading a series piecewise.
    fn optimal_tile_size(&self, series: usize) -> Result<(u32, u32), ReaderError> {
        Ok(default_tile_size(self.core(series)?))
    }

    /// Cached per-channel sample ranges of a plane, when statistics are
    /// collected by some layer of the reader stack.
    fn plane_min_max(&self, _series: usize, _plane: usize) -> Option<Vec<SampleRange>> {
        None
    }

    /// Range of one channel over every plane read so far, when collected.
    fn channel_min_max(&self, _series: usize, _channel: usize) -> Option<SampleRange> {
        None
    }

    // -------------------------------------------------------------------------
    // Provided methods
    // -------------------------------------------------------------------------

    fn is_initialized(&self) -> bool {
        self.source().is_some()
    }

    /// Validate parameters, then decode into a caller-supplied buffer.
    ///
    /// Returns the same buffer for chaining.
    fn open_plane_into<'b>(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &'b mut [u8],
    ) -> Result<&'b mut [u8], ReaderError> {
        check_plane_parameters(self, series, plane, &region, Some(buf.len()))?;
        self.read_plane(series, plane, region, buf)?;
        Ok(buf)
    }

    /// Validate parameters, then decode into a newly allocated buffer.
    fn open_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
    ) -> Result<Vec<u8>, ReaderError> {
        let size = check_plane_parameters(self, series, plane, &region, None)?;
        let mut buf = vec![0u8; size];
        self.read_plane(series, plane, region, &mut buf)?;
        Ok(buf)
    }

    /// Decode a whole plane.
    fn open_full_plane(&mut self, series: usize, plane: usize) -> Result<Vec<u8>, ReaderError> {
        let region = Region::full(self.core(series)?);
        self.open_plane(series, plane, region)
    }

    /// Decode a plane region into typed samples.
    fn open_plane_samples(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
    ) -> Result<PlaneSamples, ReaderError> {
        let (pixel_type, little_endian) = {
            let core = self.core(series)?;
            (core.pixel_type, core.little_endian)
        };
        let bytes = self.open_plane(series, plane, region)?;
        Ok(PlaneSamples::from_bytes(&bytes, pixel_type, little_endian))
    }

    /// Thumbnail of a plane, returned as `(bytes, width, height)`.
    ///
    /// The plane is downsampled by nearest neighbour so that its longest edge
    /// is at most [`THUMBNAIL_SIZE`]; sample layout is unchanged.
    fn open_thumbnail(
        &mut self,
        series: usize,
        plane: usize,
    ) -> Result<(Vec<u8>, u32, u32), ReaderError> {
        let core = self.core(series)?.clone();
        let full = self.open_full_plane(series, plane)?;
        let (tw, th) = thumbnail_size(core.size_x, core.size_y);

        let bpp = core.bytes_per_pixel();
        let channels = core.rgb_channel_count;
        let src_w = core.size_x as usize;
        let src_h = core.size_y as usize;
        let (tw_us, th_us) = (tw as usize, th as usize);
        let mut out = vec![0u8; tw_us * th_us * bpp * channels];

        for ch in 0..channels {
            for ty in 0..th_us {
                let sy = ty * src_h / th_us;
                for tx in 0..tw_us {
                    let sx = tx * src_w / tw_us;
                    let (src, dst) = if core.interleaved {
                        (
                            ((sy * src_w + sx) * channels + ch) * bpp,
                            ((ty * tw_us + tx) * channels + ch) * bpp,
                        )
                    } else {
                        (
                            (ch * src_w * src_h + sy * src_w + sx) * bpp,
                            (ch * tw_us * th_us + ty * tw_us + tx) * bpp,
                        )
                    };
                    out[dst..dst + bpp].copy_from_slice(&full[src..src + bpp]);
                }
            }
        }

        Ok((out, tw, th))
    }

    /// Rasterized index of `(z, c, t)` in a series.
    fn raster_index(&self, series: usize, coords: PlaneCoords) -> Result<usize, ReaderError> {
        let core = self.core(series)?;
        Ok(raster_index(
            core.dimension_order,
            ZctSizes::from(core.zct_sizes()),
            coords,
        )?)
    }

    /// Coordinates of a rasterized plane index in a series.
    fn zct_coords(&self, series: usize, plane: usize) -> Result<PlaneCoords, ReaderError> {
        let core = self.core(series)?;
        Ok(zct_coords(
            core.dimension_order,
            ZctSizes::from(core.zct_sizes()),
            plane,
        )?)
    }
}

impl<R: FormatReader + ?Sized> FormatReader for Box<R> {
    fn format_name(&self) -> &'static str {
        (**self).format_name()
    }

    fn is_this_type(&self, path: &Path, allow_open: bool) -> bool {
        (**self).is_this_type(path, allow_open)
    }

    fn grouping_policy(&self, path: &Path) -> GroupingPolicy {
        (**self).grouping_policy(path)
    }

    fn set_source(
        &mut self,
        path: &Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        (**self).set_source(path, store)
    }

    fn source(&self) -> Option<&Path> {
        (**self).source()
    }

    fn series_count(&self) -> usize {
        (**self).series_count()
    }

    fn core(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        (**self).core(series)
    }

    fn read_plane(
        &mut self,
        series: usize,
        plane: usize,
        region: Region,
        buf: &mut [u8],
    ) -> Result<(), ReaderError> {
        (**self).read_plane(series, plane, region, buf)
    }

    fn lookup_table(&mut self, series: usize) -> Result<Option<LookupTable>, ReaderError> {
        (**self).lookup_table(series)
    }

    fn used_files(&self, no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError> {
        (**self).used_files(no_pixels)
    }

    fn global_metadata(&self) -> &BTreeMap<String, String> {
        (**self).global_metadata()
    }

    fn close(&mut self, file_only: bool) {
        (**self).close(file_only)
    }

    fn optimal_tile_size(&self, series: usize) -> Result<(u32, u32), ReaderError> {
        (**self).optimal_tile_size(series)
    }

    fn plane_min_max(&self, series: usize, plane: usize) -> Option<Vec<SampleRange>> {
        (**self).plane_min_max(series, plane)
    }

    fn channel_min_max(&self, series: usize, channel: usize) -> Option<SampleRange> {
        (**self).channel_min_max(series, channel)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Validate a plane request against the reader's current series bounds.
///
/// Returns the number of bytes the region occupies. All failures are usage
/// errors.
pub fn check_plane_parameters<R: FormatReader + ?Sized>(
    reader: &R,
    series: usize,
    plane: usize,
    region: &Region,
    buf_len: Option<usize>,
) -> Result<usize, ReaderError> {
    if !reader.is_initialized() {
        return Err(UsageError::NotInitialized.into());
    }
    let count = reader.series_count();
    if series >= count {
        return Err(UsageError::SeriesOutOfRange { series, count }.into());
    }

    let core = reader.core(series)?;
    if plane >= core.image_count {
        return Err(UsageError::PlaneOutOfRange {
            plane,
            count: core.image_count,
        }
        .into());
    }

    let fits_x = region.x as u64 + region.width as u64 <= core.size_x as u64;
    let fits_y = region.y as u64 + region.height as u64 <= core.size_y as u64;
    if !fits_x || !fits_y {
        return Err(UsageError::RegionOutOfBounds {
            x: region.x,
            y: region.y,
            w: region.width,
            h: region.height,
            width: core.size_x,
            height: core.size_y,
        }
        .into());
    }

    let required = core.plane_size(region);
    if let Some(actual) = buf_len {
        if actual < required {
            return Err(UsageError::BufferTooSmall { required, actual }.into());
        }
    }
    Ok(required)
}

/// Fetch a series' core metadata from a reader-owned list.
pub(crate) fn core_at(cores: &[CoreMetadata], series: usize) -> Result<&CoreMetadata, ReaderError> {
    if cores.is_empty() {
        return Err(UsageError::NotInitialized.into());
    }
    cores.get(series).ok_or_else(|| {
        UsageError::SeriesOutOfRange {
            series,
            count: cores.len(),
        }
        .into()
    })
}

/// Tile hint used when a format has no native tiling: full-width strips of
/// about one megabyte.
pub fn default_tile_size(core: &CoreMetadata) -> (u32, u32) {
    let row_bytes = core.size_x as usize * core.bytes_per_pixel() * core.rgb_channel_count;
    let rows = (DEFAULT_TILE_BYTES / row_bytes.max(1)).max(1);
    let height = (rows as u32).min(core.size_y.max(1));
    (core.size_x, height)
}

/// Thumbnail dimensions preserving aspect ratio.
pub fn thumbnail_size(width: u32, height: u32) -> (u32, u32) {
    if width <= THUMBNAIL_SIZE && height <= THUMBNAIL_SIZE {
        return (width.max(1), height.max(1));
    }
    if width >= height {
        let h = (height as u64 * THUMBNAIL_SIZE as u64 / width.max(1) as u64) as u32;
        (THUMBNAIL_SIZE, h.max(1))
    } else {
        let w = (width as u64 * THUMBNAIL_SIZE as u64 / height.max(1) as u64) as u32;
        (w.max(1), THUMBNAIL_SIZE)
    }
}
