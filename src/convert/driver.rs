//! The conversion loop.
//!
//! A [`Converter`] opens the input through a reader pipeline, then copies the
//! selected planes of every selected series into one or more output files.
//! Planes of one output are always read and written in increasing index
//! order.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ConvertError, IoError, UsageError};
use crate::format::pixels::sample_ranges;
use crate::format::{
    CoreMetadata, FormatReader, ImageReader, PixelType, PlaneCoords, Region, SampleRange,
};
use crate::meta::MemoryMetadataStore;
use crate::pipeline::{Decorator, PipelineBuilder};

use super::autoscale::{autoscale, combined_range};
use super::labels::LabelTable;
use super::naming::{plane_file, series_file, OutputNamer};
use super::tiles::{paste_tile, TileGrid};
use super::writer::{
    writer_for_path, Compression, FormatWriter, PlaneLayout, RawWriter, WriterCapabilities,
};

/// Planes with more pixels than this are written tile by tile when the
/// writer allows it.
pub const DEFAULT_BIG_IMAGE_THRESHOLD: u64 = 4096 * 4096;

// =============================================================================
// Options
// =============================================================================

/// Everything a conversion run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub input: PathBuf,
    /// Output name, possibly holding `%s %n %z %c %t` placeholders.
    pub output: String,

    pub stitch: bool,
    pub separate: bool,
    pub merge: bool,
    pub fill: bool,

    /// Require a writer that takes outputs beyond 4 GiB.
    pub bigtiff: bool,
    pub compression: Compression,

    /// Only this series; all series when unset.
    pub series: Option<usize>,
    /// Inclusive plane range.
    pub range: Option<(usize, usize)>,
    pub crop: Option<Region>,
    pub channel: Option<usize>,
    pub z: Option<usize>,
    pub timepoint: Option<usize>,

    pub autoscale: bool,
    /// Depth of autoscaled samples, [`PixelType::Uint8`] or
    /// [`PixelType::Uint16`]. Writers without 16-bit samples get 8 bits.
    pub autoscale_type: PixelType,
    /// `Some(true)` replaces existing outputs; anything else refuses them.
    pub overwrite: Option<bool>,
    pub group_files: bool,
    pub labels: Option<PathBuf>,
    pub delete_empty: bool,
    pub big_image_threshold: u64,
    /// Tile size for big planes; the reader's optimal size when unset.
    pub tile_size: Option<(u32, u32)>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: String::new(),
            stitch: false,
            separate: false,
            merge: false,
            fill: false,
            bigtiff: false,
            compression: Compression::default(),
            series: None,
            range: None,
            crop: None,
            channel: None,
            z: None,
            timepoint: None,
            autoscale: false,
            autoscale_type: PixelType::Uint8,
            overwrite: None,
            group_files: true,
            labels: None,
            delete_empty: false,
            big_image_threshold: DEFAULT_BIG_IMAGE_THRESHOLD,
            tile_size: None,
        }
    }
}

impl ConvertOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.output.is_empty() {
            return Err(ConvertError::Config("output name is empty".to_string()));
        }
        if let Some((start, end)) = self.range {
            if start > end {
                return Err(ConvertError::Config(format!(
                    "plane range {}..{} is reversed",
                    start, end
                )));
            }
        }
        if let Some(crop) = self.crop {
            if crop.width == 0 || crop.height == 0 {
                return Err(ConvertError::Config("crop rectangle is empty".to_string()));
            }
        }
        if let Some((w, h)) = self.tile_size {
            if w == 0 || h == 0 {
                return Err(ConvertError::Config("tile size must be positive".to_string()));
            }
        }
        if !matches!(self.autoscale_type, PixelType::Uint8 | PixelType::Uint16) {
            return Err(ConvertError::Config(format!(
                "cannot autoscale into {:?} samples",
                self.autoscale_type
            )));
        }
        if self.big_image_threshold == 0 {
            return Err(ConvertError::Config(
                "big image threshold must be positive".to_string(),
            ));
        }
        if self.merge && self.separate {
            warn!("Both --merge and --separate requested; channels are split then merged again");
        }
        Ok(())
    }

    /// Decorators requested by these options.
    pub fn pipeline(&self) -> PipelineBuilder {
        PipelineBuilder::new()
            .with_if(Decorator::Stitch, self.stitch)
            .with_if(Decorator::Separate, self.separate)
            .with_if(Decorator::Merge, self.merge)
            .with_if(Decorator::Fill, self.fill)
            .with_if(Decorator::MinMax, self.autoscale)
    }

    /// Whether plane `coords` passes the channel, Z and timepoint filters.
    fn selects(&self, coords: &PlaneCoords) -> bool {
        self.channel.map_or(true, |c| c == coords.c)
            && self.z.map_or(true, |z| z == coords.z)
            && self.timepoint.map_or(true, |t| t == coords.t)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionReport {
    pub planes_written: usize,
    pub outputs_created: Vec<PathBuf>,
    pub outputs_deleted: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Bookkeeping for one output file.
#[derive(Debug)]
struct OutputRecord {
    path: PathBuf,
    planes: usize,
    empty_planes: usize,
}

/// Planes of one series that share an output name.
#[derive(Debug)]
struct OutputGroup {
    name: String,
    planes: Vec<usize>,
}

// =============================================================================
// Converter
// =============================================================================

/// Runs one conversion.
pub struct Converter {
    options: ConvertOptions,
    labels: Option<LabelTable>,
    cancel: Arc<AtomicBool>,
}

impl Converter {
    /// Validate the options and load the label table, if any.
    pub fn new(options: ConvertOptions) -> Result<Self, ConvertError> {
        options.validate()?;
        let labels = options.labels.as_deref().map(LabelTable::load).transpose()?;
        Ok(Self {
            options,
            labels,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share a flag that stops the run before the next plane once set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Open the input, pick a writer from the output name and convert.
    pub fn run(&self) -> Result<ConversionReport, ConvertError> {
        let started = Instant::now();
        let mut writer = writer_for_path(&self.options.output)?;

        let base = ImageReader::new().with_grouping(self.options.group_files);
        let mut reader = self.options.pipeline().build(Box::new(base));
        let mut store = MemoryMetadataStore::new();

        info!("Opening {}", self.options.input.display());
        reader.set_source(&self.options.input, &mut store)?;
        info!(
            "Reading {} dataset with {} series through [{}]",
            reader.format_name(),
            reader.series_count(),
            reader
                .layers()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        debug!("Opened in {:?}", started.elapsed());

        let result = self.convert(&mut *reader, writer.as_mut(), &store);
        reader.close(false);

        let mut report = result?;
        report.elapsed = started.elapsed();
        info!(
            "Wrote {} planes to {} files in {:.2}s",
            report.planes_written,
            report.outputs_created.len(),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Copy planes from an open reader into `writer`.
    ///
    /// `store` supplies series names for the `%n` placeholder.
    pub fn convert(
        &self,
        reader: &mut dyn FormatReader,
        writer: &mut dyn FormatWriter,
        store: &MemoryMetadataStore,
    ) -> Result<ConversionReport, ConvertError> {
        let started = Instant::now();
        let capabilities = writer.capabilities();
        if self.options.bigtiff && !capabilities.big_images {
            return Err(ConvertError::Config(format!(
                "{} writer cannot store big images",
                writer.format_name()
            )));
        }
        writer.set_compression(self.options.compression);

        let mut records = Vec::new();
        let result = self.convert_all(reader, writer, store, capabilities, &mut records);
        let closed = writer.close();

        let planes_written = records.iter().map(|r| r.planes).sum();
        result.and(closed).map_err(|err| match err {
            ConvertError::Cancelled { .. } => ConvertError::Cancelled { planes_written },
            other => other,
        })?;

        let outputs_deleted = if self.options.delete_empty {
            delete_empty_outputs(&records)?
        } else {
            Vec::new()
        };

        Ok(ConversionReport {
            planes_written,
            outputs_created: records.into_iter().map(|r| r.path).collect(),
            outputs_deleted,
            elapsed: started.elapsed(),
        })
    }

    fn convert_all(
        &self,
        reader: &mut dyn FormatReader,
        writer: &mut dyn FormatWriter,
        store: &MemoryMetadataStore,
        capabilities: WriterCapabilities,
        records: &mut Vec<OutputRecord>,
    ) -> Result<(), ConvertError> {
        let count = reader.series_count();
        let series_list: Vec<usize> = match self.options.series {
            Some(series) if series >= count => {
                return Err(UsageError::SeriesOutOfRange { series, count }.into())
            }
            Some(series) => vec![series],
            None => (0..count).collect(),
        };

        let namer = OutputNamer::new(self.options.output.as_str());
        let suffix_series = series_list.len() > 1 && !namer.splits_series();

        for series in series_list {
            let name = store.image(series).and_then(|image| image.name.as_deref());
            let groups = self.output_groups(reader, series, name, &namer, suffix_series)?;
            for group in groups {
                self.convert_group(reader, writer, series, group, capabilities, records)?;
            }
        }
        Ok(())
    }

    /// Selected planes of a series, grouped by output name in first-use order.
    fn output_groups(
        &self,
        reader: &dyn FormatReader,
        series: usize,
        series_name: Option<&str>,
        namer: &OutputNamer,
        suffix_series: bool,
    ) -> Result<Vec<OutputGroup>, ConvertError> {
        let image_count = reader.core(series)?.image_count;
        let (first, last) = match self.options.range {
            Some((start, _)) if start >= image_count => {
                return Err(UsageError::PlaneOutOfRange {
                    plane: start,
                    count: image_count,
                }
                .into())
            }
            Some((start, end)) => (start, end.min(image_count - 1)),
            None => (0, image_count.saturating_sub(1)),
        };

        let mut groups: Vec<OutputGroup> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for plane in (first..=last).take(image_count) {
            let coords = reader.zct_coords(series, plane)?;
            if !self.options.selects(&coords) {
                continue;
            }
            let mut name = namer.render(series, series_name, coords);
            if suffix_series {
                name = series_file(&name, series);
            }
            if let Some(labels) = &self.labels {
                name = labels.rewrite(&name)?;
            }
            let slot = *by_name.entry(name.clone()).or_insert_with(|| {
                groups.push(OutputGroup {
                    name,
                    planes: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].planes.push(plane);
        }
        Ok(groups)
    }

    fn convert_group(
        &self,
        reader: &mut dyn FormatReader,
        writer: &mut dyn FormatWriter,
        series: usize,
        group: OutputGroup,
        capabilities: WriterCapabilities,
        records: &mut Vec<OutputRecord>,
    ) -> Result<(), ConvertError> {
        let core = reader.core(series)?.clone();
        let region = self.options.crop.unwrap_or_else(|| Region::full(&core));
        check_region(&core, &region)?;

        let target = self
            .options
            .autoscale
            .then(|| self.autoscale_type(capabilities));
        let mut layout = PlaneLayout::of_region(&core, &region);
        if let Some(target) = target {
            layout.pixel_type = target;
            writer.set_lookup_table(None);
        } else {
            writer.set_lookup_table(reader.lookup_table(series)?);
        }

        let big = region.area() as u64 > self.options.big_image_threshold;
        let tile_size = match self.options.tile_size {
            Some(size) => size,
            None => reader.optimal_tile_size(series)?,
        };
        let one_file_per_plane = !capabilities.stacks && group.planes.len() > 1;

        for (index, &plane) in group.planes.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Conversion cancelled before plane {} of series {}", plane, series);
                return Err(ConvertError::Cancelled { planes_written: 0 });
            }

            let (path, index_in_file) = if one_file_per_plane {
                (PathBuf::from(plane_file(&group.name, index)), 0)
            } else {
                (PathBuf::from(&group.name), index)
            };
            if index_in_file == 0 {
                self.prepare_output(&path)?;
                writer.open(&path, layout)?;
                records.push(OutputRecord {
                    path: path.clone(),
                    planes: 0,
                    empty_planes: 0,
                });
            }

            let source = PlaneSource {
                series,
                plane,
                core: &core,
                target,
            };
            let empty = if !big {
                copy_plane(reader, writer, &source, index_in_file, region)?
            } else {
                let grid = TileGrid::new(region, tile_size.0, tile_size.1);
                if capabilities.tiles {
                    copy_tiles(reader, writer, &source, index_in_file, &grid)?
                } else {
                    copy_assembled(reader, writer, &source, index_in_file, &grid)?
                }
            };

            if let Some(record) = records.last_mut() {
                record.planes += 1;
                if empty {
                    warn!(
                        "Plane {} of series {} is empty in {}",
                        plane,
                        series,
                        path.display()
                    );
                    record.empty_planes += 1;
                }
            }
            debug!("Series {} plane {} -> {} [{}]", series, plane, path.display(), index_in_file);
        }
        Ok(())
    }

    /// Depth of autoscaled output for a writer.
    fn autoscale_type(&self, capabilities: WriterCapabilities) -> PixelType {
        match self.options.autoscale_type {
            PixelType::Uint16 if capabilities.sixteen_bit => PixelType::Uint16,
            PixelType::Uint16 => {
                warn!("Writer stores 8-bit samples only; autoscaling into 8 bits");
                PixelType::Uint8
            }
            _ => PixelType::Uint8,
        }
    }

    /// Clear the way for a new output file.
    fn prepare_output(&self, path: &Path) -> Result<(), ConvertError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| IoError::from_std(parent, e))?;
        }
        if !path.exists() {
            return Ok(());
        }
        if self.options.overwrite != Some(true) {
            return Err(ConvertError::OutputExists(path.display().to_string()));
        }
        info!("Replacing {}", path.display());
        fs::remove_file(path).map_err(|e| IoError::from_std(path, e))?;
        Ok(())
    }
}

/// The plane being copied, and the depth to autoscale it into.
struct PlaneSource<'a> {
    series: usize,
    plane: usize,
    core: &'a CoreMetadata,
    /// Set when autoscaling.
    target: Option<PixelType>,
}

impl PlaneSource<'_> {
    fn read(&self, reader: &mut dyn FormatReader, region: Region) -> Result<Vec<u8>, ConvertError> {
        Ok(reader.open_plane(self.series, self.plane, region)?)
    }

    fn rescale(&self, bytes: Vec<u8>, range: Option<SampleRange>) -> Vec<u8> {
        match self.target {
            Some(target) => scale(self.core, &bytes, range, target),
            None => bytes,
        }
    }

    /// Autoscale range of the whole tiled area, when autoscaling.
    fn autoscale_range(
        &self,
        reader: &mut dyn FormatReader,
        grid: &TileGrid,
    ) -> Result<Option<SampleRange>, ConvertError> {
        if self.target.is_none() {
            return Ok(None);
        }
        match reader
            .plane_min_max(self.series, self.plane)
            .as_deref()
            .and_then(combined_range)
        {
            Some(range) => Ok(Some(range)),
            None => tiled_range(reader, self.series, self.plane, self.core, grid),
        }
    }
}

/// Read, rescale and save a whole region. Returns whether it was empty.
fn copy_plane(
    reader: &mut dyn FormatReader,
    writer: &mut dyn FormatWriter,
    source: &PlaneSource<'_>,
    index: usize,
    region: Region,
) -> Result<bool, ConvertError> {
    let mut bytes = source.read(reader, region)?;
    if source.target.is_some() {
        let range = reader
            .plane_min_max(source.series, source.plane)
            .as_deref()
            .and_then(combined_range)
            .or_else(|| buffer_range(source.core, &bytes));
        bytes = source.rescale(bytes, range);
    }
    writer.save_plane(index, &bytes)?;
    Ok(is_empty(&bytes))
}

/// Save a region tile by tile. Returns whether every tile was empty.
fn copy_tiles(
    reader: &mut dyn FormatReader,
    writer: &mut dyn FormatWriter,
    source: &PlaneSource<'_>,
    index: usize,
    grid: &TileGrid,
) -> Result<bool, ConvertError> {
    let range = source.autoscale_range(reader, grid)?;
    let mut empty = true;
    for tile in grid.tiles() {
        let bytes = source.rescale(source.read(reader, tile)?, range);
        empty &= is_empty(&bytes);
        writer.save_tile(index, grid.relative(&tile), &bytes)?;
    }
    Ok(empty)
}

/// Read a region tile by tile and save it as one plane, for writers that
/// take whole planes only.
fn copy_assembled(
    reader: &mut dyn FormatReader,
    writer: &mut dyn FormatWriter,
    source: &PlaneSource<'_>,
    index: usize,
    grid: &TileGrid,
) -> Result<bool, ConvertError> {
    let range = source.autoscale_range(reader, grid)?;
    let core = source.core;
    let sample_bytes = source
        .target
        .unwrap_or(core.pixel_type)
        .bytes_per_pixel();
    let area = grid.area();
    let mut whole = vec![0u8; area.area() * core.rgb_channel_count * sample_bytes];

    for tile in grid.tiles() {
        let bytes = source.rescale(source.read(reader, tile)?, range);
        paste_tile(
            &mut whole,
            &area,
            &tile,
            &bytes,
            sample_bytes,
            core.rgb_channel_count,
            core.interleaved,
        );
    }
    writer.save_plane(index, &whole)?;
    Ok(is_empty(&whole))
}

fn check_region(core: &CoreMetadata, region: &Region) -> Result<(), ConvertError> {
    let fits_x = region.x as u64 + region.width as u64 <= core.size_x as u64;
    let fits_y = region.y as u64 + region.height as u64 <= core.size_y as u64;
    if fits_x && fits_y {
        return Ok(());
    }
    Err(UsageError::RegionOutOfBounds {
        x: region.x,
        y: region.y,
        w: region.width,
        h: region.height,
        width: core.size_x,
        height: core.size_y,
    }
    .into())
}

fn is_empty(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0)
}

fn buffer_range(core: &CoreMetadata, bytes: &[u8]) -> Option<SampleRange> {
    let ranges = sample_ranges(
        bytes,
        core.pixel_type,
        core.little_endian,
        core.rgb_channel_count,
        core.interleaved,
    );
    combined_range(&ranges)
}

/// Range of a plane gathered tile by tile.
fn tiled_range(
    reader: &mut dyn FormatReader,
    series: usize,
    plane: usize,
    core: &CoreMetadata,
    grid: &TileGrid,
) -> Result<Option<SampleRange>, ConvertError> {
    let mut range: Option<SampleRange> = None;
    for tile in grid.tiles() {
        let bytes = reader.open_plane(series, plane, tile)?;
        if let Some(tile_range) = buffer_range(core, &bytes) {
            range = Some(match range {
                Some(existing) => existing.union(&tile_range),
                None => tile_range,
            });
        }
    }
    Ok(range)
}

fn scale(
    core: &CoreMetadata,
    bytes: &[u8],
    range: Option<SampleRange>,
    target: PixelType,
) -> Vec<u8> {
    let range = range.unwrap_or(SampleRange { min: 0.0, max: 0.0 });
    autoscale(bytes, core.pixel_type, core.little_endian, range, target)
}

/// Delete outputs whose every plane was empty.
fn delete_empty_outputs(records: &[OutputRecord]) -> Result<Vec<PathBuf>, ConvertError> {
    let mut deleted = Vec::new();
    for record in records {
        if record.planes == 0 || record.empty_planes < record.planes {
            continue;
        }
        warn!("Deleting empty output {}", record.path.display());
        fs::remove_file(&record.path).map_err(|e| IoError::from_std(&record.path, e))?;
        let header = RawWriter::header_path(&record.path);
        if header.exists() {
            fs::remove_file(&header).map_err(|e| IoError::from_std(&header, e))?;
        }
        deleted.push(record.path.clone());
    }
    Ok(deleted)
}
