//! PerkinElmer Ultraview reader.
//!
//! A dataset is one `.htm` file, several metadata sidecars (`.tim`, `.csv`,
//! `.zpo`, ...) and either TIFF files or raw records numbered with
//! hexadecimal extensions (`.1`, `.2`, ..., `.a`, ...). Each pixel file holds
//! exactly one plane.
//!
//! Opening a dataset goes through these phases:
//!
//! 1. Retarget to the `.htm` file of the directory
//! 2. Group the sibling files by role ([`companion`])
//! 3. Order the pixel files (extension family re-merge, hexadecimal sort)
//! 4. Parse the sidecars ([`metadata`])
//! 5. Reconcile declared sizes against the pixel files ([`reconcile`])
//! 6. Populate the metadata store
//!
//! Raw records start with a 6-byte header followed by little-endian samples
//! in row-major order. The dimension order is always `XYCTZ`.

pub mod companion;
pub mod metadata;
pub mod reconcile;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{FormatError, IoError, ReaderError, UsageError};
use crate::format::core::{CoreMetadata, LookupTable, PixelType, Region};
use crate::format::detect::{contains_marker, ULTRAVIEW_MARKER};
use crate::format::dimensions::DimensionOrder;
use crate::format::reader::{core_at, default_tile_size, FormatReader, GroupingPolicy};
use crate::format::tiff::TiffPlane;
use crate::io::{
    absolute, check_suffix, extension, hex_suffix, list_dir, parent_dir, read_text, stem,
    FileRangeReader, RangeReader,
};
use crate::meta::{create_lsid, populate_pixels, MetadataStore, StagePosition};

use companion::{
    find_describing_file, is_pixel_file, merge_extension_families,
    retarget_to_describing_file, sort_pixel_files, CompanionFiles, PERKIN_ELMER_SUFFIXES,
};
use metadata::ParsedMetadata;
use reconcile::{reconcile, DeclaredSizes};

/// Bytes before the first sample of a raw record.
pub const RAW_HEADER_BYTES: u64 = 6;

/// The pixel file currently held open. At most one exists at a time.
#[derive(Debug)]
enum OpenPixelFile {
    Tiff { index: usize, plane: TiffPlane },
    Raw { index: usize, reader: FileRangeReader },
}

impl OpenPixelFile {
    fn index(&self) -> usize {
        match self {
            OpenPixelFile::Tiff { index, .. } | OpenPixelFile::Raw { index, .. } => *index,
        }
    }
}

/// Reader for PerkinElmer Ultraview companion-file datasets.
#[derive(Debug, Default)]
pub struct PerkinElmerReader {
    /// The `.htm` file the dataset was opened through.
    current: Option<PathBuf>,
    /// Pixel files, one per plane, in plane order.
    files: Vec<PathBuf>,
    /// Every file of the dataset, pixel files first.
    all_files: Vec<PathBuf>,
    /// Pixel files are raw records rather than TIFFs.
    raw: bool,
    open: Option<OpenPixelFile>,
    /// Color map of the first TIFF payload, if it is a palette image.
    lookup_table: Option<LookupTable>,
    cores: Vec<CoreMetadata>,
    metadata: BTreeMap<String, String>,
}

impl PerkinElmerReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn init(&mut self, path: &Path, store: &mut dyn MetadataStore) -> Result<(), ReaderError> {
        info!("Finding HTML companion file");
        let id = retarget_to_describing_file(path)?;
        let dir = parent_dir(&id);
        let entry_name = id
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!("Searching for all metadata companion files");
        let listing = list_dir(&dir)?;
        let group = CompanionFiles::collect(&listing, stem(&entry_name));

        info!("Finding image files");
        let mut pixels = merge_extension_families(group.pixels.clone());
        sort_pixel_files(&mut pixels, group.raw);

        self.all_files = pixels
            .iter()
            .chain(group.sidecars())
            .map(|f| dir.join(f))
            .collect();

        info!("Parsing metadata values");
        let mut meta = ParsedMetadata::new();
        if let Some(tim) = &group.tim {
            meta.parse_tim(&read_text(&dir.join(tim))?);
        }
        if let Some(csv) = &group.csv {
            meta.parse_csv(&read_text(&dir.join(csv))?);
        } else if let Some(zpo) = &group.zpo {
            meta.parse_zpo(&read_text(&dir.join(zpo))?);
        }
        let htm = group.htm.as_ref().ok_or_else(|| {
            FormatError::MissingCompanion(format!("no .htm file describes {}", id.display()))
        })?;
        meta.parse_htm(&read_text(&dir.join(htm))?);

        info!("Populating metadata");
        if pixels.is_empty() {
            return Err(FormatError::NoPixelFiles(id.display().to_string()).into());
        }

        let first = dir.join(&pixels[0]);
        let layout = if group.raw {
            raw_layout(&first, &meta, &dir.join(htm))?
        } else {
            tiff_layout(&first, &meta)?
        };

        let counts = meta.declared_counts();
        let declared = DeclaredSizes {
            size_z: counts.size_z.or(meta.size_z),
            size_c: counts.size_c,
            size_t: counts.size_t,
        };
        let reconciled = reconcile(declared, pixels);

        let pixel_type = layout.pixel_type;
        let bits_per_pixel = meta
            .bits_per_pixel
            .filter(|bits| *bits > 0 && *bits <= pixel_type.bits())
            .unwrap_or(pixel_type.bits());

        self.cores = vec![CoreMetadata {
            size_x: layout.size_x,
            size_y: layout.size_y,
            size_z: reconciled.size_z,
            size_c: reconciled.size_c * layout.samples_per_pixel,
            size_t: reconciled.size_t,
            image_count: reconciled.image_count,
            pixel_type,
            bits_per_pixel,
            dimension_order: DimensionOrder::XYCTZ,
            rgb_channel_count: layout.samples_per_pixel,
            interleaved: layout.samples_per_pixel > 1,
            little_endian: true,
            indexed: layout.lookup_table.is_some(),
            false_color: false,
            metadata_complete: true,
        }];
        self.lookup_table = layout.lookup_table;
        self.files = reconciled.files.iter().map(|f| dir.join(f)).collect();
        self.raw = group.raw;
        self.metadata = meta.original.clone();
        self.current = Some(id);

        self.populate_store(store, &meta)
    }

    fn populate_store(
        &self,
        store: &mut dyn MetadataStore,
        meta: &ParsedMetadata,
    ) -> Result<(), ReaderError> {
        populate_pixels(store, self)?;
        let core = core_at(&self.cores, 0)?;

        if let Some(date) = meta.finish() {
            store.set_image_acquisition_date(date, 0);
        }

        if meta.pixel_size_x > 0.0 {
            store.set_pixels_physical_size_x(meta.pixel_size_x, 0);
        } else {
            warn!(
                "Expected positive value for PhysicalSizeX; got {}",
                meta.pixel_size_x
            );
        }
        if meta.pixel_size_y > 0.0 {
            store.set_pixels_physical_size_y(meta.pixel_size_y, 0);
        } else {
            warn!(
                "Expected positive value for PhysicalSizeY; got {}",
                meta.pixel_size_y
            );
        }

        let instrument = create_lsid("Instrument", 0);
        store.set_instrument_id(&instrument, 0);
        store.set_image_instrument_ref(&instrument, 0);

        for channel in 0..core.effective_size_c() {
            if let Some(&em) = meta.emission_wavelengths.get(channel) {
                match u32::try_from(em) {
                    Ok(nm) if nm > 0 => store.set_channel_emission_wavelength(nm, 0, channel),
                    _ => warn!("Expected positive value for EmissionWavelength; got {}", em),
                }
            }
            if let Some(&ex) = meta.excitation_wavelengths.get(channel) {
                match u32::try_from(ex) {
                    Ok(nm) if nm > 0 => store.set_channel_excitation_wavelength(nm, 0, channel),
                    _ => warn!("Expected positive value for ExcitationWavelength; got {}", ex),
                }
            }
        }

        let seconds_per_plane = match (meta.start(), meta.finish()) {
            (Some(start), Some(finish)) if core.image_count > 0 => {
                (finish - start).num_milliseconds() as f64 / 1000.0 / core.image_count as f64
            }
            _ => 0.0,
        };

        for plane in 0..core.image_count {
            let coords = self.zct_coords(0, plane)?;
            store.set_plane_delta_t(plane as f64 * seconds_per_plane, 0, plane);
            if let Some(&exposure) = meta.exposure_times.get(coords.c) {
                store.set_plane_exposure_time(exposure, 0, plane);
            }
            if let Some(&z) = meta.z_positions.get(coords.z) {
                store.set_plane_position(StagePosition { x: 0.0, y: 0.0, z }, 0, plane);
            }
        }
        Ok(())
    }

    /// The open pixel file for plane `index`, opening it if needed.
    fn pixel_file(&mut self, index: usize) -> Result<&mut OpenPixelFile, ReaderError> {
        if self.open.as_ref().map(OpenPixelFile::index) != Some(index) {
            self.open = None;
            let path = self.files.get(index).ok_or(UsageError::PlaneOutOfRange {
                plane: index,
                count: self.files.len(),
            })?;
            let file = if self.raw {
                OpenPixelFile::Raw {
                    index,
                    reader: FileRangeReader::open(path)?,
                }
            } else {
                OpenPixelFile::Tiff {
                    index,
                    plane: TiffPlane::open(path)?,
                }
            };
            self.open = Some(file);
        }
        self.open
            .as_mut()
            .ok_or_else(|| UsageError::NotInitialized.into())
    }
}

/// Raster size, sample type and samples per pixel of the pixel files.
struct PixelLayout {
    size_x: u32,
    size_y: u32,
    pixel_type: PixelType,
    samples_per_pixel: usize,
    lookup_table: Option<LookupTable>,
}

/// Raw records carry no header fields: the sample size follows from the file
/// length and the declared raster size.
fn raw_layout(
    first: &Path,
    meta: &ParsedMetadata,
    htm: &Path,
) -> Result<PixelLayout, ReaderError> {
    let (size_x, size_y) = match (meta.size_x, meta.size_y) {
        (Some(x), Some(y)) if x > 0 && y > 0 => (x, y),
        _ => {
            return Err(FormatError::InvalidHeader {
                path: htm.display().to_string(),
                message: "image width and length are not declared".to_string(),
            }
            .into())
        }
    };

    let length = fs::metadata(first)
        .map_err(|e| IoError::from_std(first, e))?
        .len();
    let mut bytes = length.saturating_sub(RAW_HEADER_BYTES) / (size_x as u64 * size_y as u64);
    if bytes % 3 == 0 {
        bytes /= 3;
    }
    let pixel_type = PixelType::from_bytes(bytes as usize, false, false).ok_or_else(|| {
        FormatError::InvalidHeader {
            path: first.display().to_string(),
            message: format!(
                "{} bytes cannot hold a {}x{} plane",
                length, size_x, size_y
            ),
        }
    })?;

    Ok(PixelLayout {
        size_x,
        size_y,
        pixel_type,
        samples_per_pixel: 1,
        lookup_table: None,
    })
}

fn tiff_layout(first: &Path, meta: &ParsedMetadata) -> Result<PixelLayout, ReaderError> {
    let tiff = TiffPlane::open(first)?;
    if meta.size_x.is_some_and(|x| x != tiff.width())
        || meta.size_y.is_some_and(|y| y != tiff.height())
    {
        debug!(
            "Declared size {:?}x{:?} differs from TIFF size {}x{}; using the TIFF",
            meta.size_x,
            meta.size_y,
            tiff.width(),
            tiff.height()
        );
    }
    Ok(PixelLayout {
        size_x: tiff.width(),
        size_y: tiff.height(),
        pixel_type: tiff.pixel_type(),
        samples_per_pixel: tiff.samples_per_pixel(),
        lookup_table: tiff.lookup_table(),
    })
}

/// Copy a region of a raw record into `buf`, one row at a time.
fn read_raw_region(
    reader: &mut FileRangeReader,
    width: u32,
    bytes_per_pixel: usize,
    region: Region,
    buf: &mut [u8],
) -> Result<(), ReaderError> {
    let row_bytes = region.width as usize * bytes_per_pixel;
    let total = row_bytes * region.height as usize;
    let offset_of = |row: u32| {
        RAW_HEADER_BYTES
            + ((region.y + row) as u64 * width as u64 + region.x as u64) * bytes_per_pixel as u64
    };

    if region.x == 0 && region.width == width {
        let bytes = reader.read_exact_at(offset_of(0), total)?;
        buf[..total].copy_from_slice(&bytes);
        return Ok(());
    }

    for row in 0..region.height {
        let bytes = reader.read_exact_at(offset_of(row), row_bytes)?;
        let start = row as usize * row_bytes;
        buf[start..start + row_bytes].copy_from_slice(&bytes);
    }
    Ok(())
}

impl FormatReader for PerkinElmerReader {
    fn format_name(&self) -> &'static str {
        "PerkinElmer"
    }

    /// A dataset cannot be confirmed from a name alone, so without filesystem
    /// access this always answers `false`.
    fn is_this_type(&self, path: &Path, allow_open: bool) -> bool {
        if !allow_open {
            return false;
        }

        let name = path.display().to_string();
        if check_suffix(&name, &["cfg"]) {
            if let Ok(text) = read_text(path) {
                if !contains_marker(text.as_bytes(), ULTRAVIEW_MARKER) {
                    return false;
                }
            }
        }

        let pixel_file = hex_suffix(&name).is_some()
            || extension(&name)
                .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
                .unwrap_or(false);

        find_describing_file(path).is_some()
            && (pixel_file || check_suffix(&name, PERKIN_ELMER_SUFFIXES))
    }

    fn grouping_policy(&self, _path: &Path) -> GroupingPolicy {
        GroupingPolicy::Must
    }

    fn set_source(
        &mut self,
        path: &Path,
        store: &mut dyn MetadataStore,
    ) -> Result<(), ReaderError> {
        let path = absolute(path);
        if self.current.as_deref() == Some(path.as_path()) || self.all_files.contains(&path) {
            return Ok(());
        }
        self.close(false);

        let result = self.init(&path, store);
        if result.is_err() {
            self.close(false);
        }
        result
    }

    fn source(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn series_count(&self) -> usize {
        self.cores.len()
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
        let (width, height, bytes_per_pixel) = {
            let core = core_at(&self.cores, series)?;
            (core.size_x, core.size_y, core.bytes_per_pixel())
        };

        match self.pixel_file(plane)? {
            OpenPixelFile::Raw { reader, .. } => {
                read_raw_region(reader, width, bytes_per_pixel, region, buf)
            }
            OpenPixelFile::Tiff { plane: tiff, .. } => {
                if tiff.width() != width || tiff.height() != height {
                    return Err(FormatError::Decode {
                        path: tiff.path().display().to_string(),
                        message: format!(
                            "plane is {}x{}, dataset is {}x{}",
                            tiff.width(),
                            tiff.height(),
                            width,
                            height
                        ),
                    }
                    .into());
                }
                tiff.read_region(region, buf)
            }
        }
    }

    fn lookup_table(&mut self, _series: usize) -> Result<Option<LookupTable>, ReaderError> {
        Ok(match &self.open {
            Some(OpenPixelFile::Tiff { plane, .. }) if plane.is_indexed() => plane.lookup_table(),
            _ => self.lookup_table.clone(),
        })
    }

    fn used_files(&self, no_pixels: bool) -> Result<Vec<PathBuf>, ReaderError> {
        if self.current.is_none() {
            return Err(UsageError::NotInitialized.into());
        }
        Ok(self
            .all_files
            .iter()
            .filter(|f| !no_pixels || !is_pixel_file(&f.display().to_string()))
            .cloned()
            .collect())
    }

    fn global_metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn close(&mut self, file_only: bool) {
        self.open = None;
        if !file_only {
            self.current = None;
            self.files.clear();
            self.all_files.clear();
            self.raw = false;
            self.lookup_table = None;
            self.cores.clear();
            self.metadata.clear();
        }
    }

    fn optimal_tile_size(&self, series: usize) -> Result<(u32, u32), ReaderError> {
        let core = self.core(series)?;
        Ok(match &self.open {
            Some(OpenPixelFile::Tiff { plane, .. }) => default_tile_size(&plane.core()),
            _ => default_tile_size(core),
        })
    }
}
