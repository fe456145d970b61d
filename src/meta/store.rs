//! Metadata store interface and an in-memory implementation.
//!
//! Readers push normalized fields into a [`MetadataStore`] while a dataset is
//! being opened. The store is owned by the caller; the reader only borrows it
//! for the duration of `set_source`.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::format::{CoreMetadata, DimensionOrder, PixelType};

// =============================================================================
// MetadataStore Trait
// =============================================================================

/// Pixel dimensions of one image, as recorded in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelsDimensions {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub pixel_type: PixelType,
    pub dimension_order: DimensionOrder,
    pub little_endian: bool,
}

impl From<&CoreMetadata> for PixelsDimensions {
    fn from(core: &CoreMetadata) -> Self {
        Self {
            size_x: core.size_x,
            size_y: core.size_y,
            size_z: core.size_z,
            size_c: core.size_c,
            size_t: core.size_t,
            pixel_type: core.pixel_type,
            dimension_order: core.dimension_order,
            little_endian: core.little_endian,
        }
    }
}

/// Sink for canonical, normalized metadata.
///
/// Every setter is idempotent; a later call for the same target replaces the
/// earlier value.
pub trait MetadataStore {
    fn set_image_name(&mut self, name: &str, series: usize);

    fn set_pixels_dimensions(&mut self, dimensions: PixelsDimensions, series: usize);

    fn set_pixels_physical_size_x(&mut self, microns: f64, series: usize);

    fn set_pixels_physical_size_y(&mut self, microns: f64, series: usize);

    fn set_channel_emission_wavelength(&mut self, nm: u32, series: usize, channel: usize);

    fn set_channel_excitation_wavelength(&mut self, nm: u32, series: usize, channel: usize);

    /// Seconds since the start of the acquisition.
    fn set_plane_delta_t(&mut self, seconds: f64, series: usize, plane: usize);

    fn set_plane_exposure_time(&mut self, seconds: f64, series: usize, plane: usize);

    fn set_plane_position(&mut self, position: StagePosition, series: usize, plane: usize);

    fn set_image_acquisition_date(&mut self, date: NaiveDateTime, series: usize);

    fn set_instrument_id(&mut self, id: &str, instrument: usize);

    fn set_image_instrument_ref(&mut self, id: &str, series: usize);
}

/// Stage position of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StagePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Per-channel fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelMeta {
    pub emission_wavelength: Option<u32>,
    pub excitation_wavelength: Option<u32>,
}

/// Per-plane fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaneMeta {
    pub delta_t: Option<f64>,
    pub exposure_time: Option<f64>,
    pub position: Option<StagePosition>,
}

/// Per-image fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageMeta {
    pub name: Option<String>,
    pub acquisition_date: Option<NaiveDateTime>,
    pub instrument_ref: Option<String>,
    pub pixels: Option<PixelsDimensions>,
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub channels: Vec<ChannelMeta>,
    pub planes: Vec<PlaneMeta>,
}

/// Growable, serializable metadata store.
///
/// Images, channels and planes are created on first write to their index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryMetadataStore {
    pub images: Vec<ImageMeta>,
    pub instruments: Vec<String>,
}

fn slot<T: Default>(items: &mut Vec<T>, index: usize) -> &mut T {
    if items.len() <= index {
        items.resize_with(index + 1, T::default);
    }
    &mut items[index]
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self, series: usize) -> Option<&ImageMeta> {
        self.images.get(series)
    }

    pub fn plane(&self, series: usize, plane: usize) -> Option<&PlaneMeta> {
        self.images.get(series)?.planes.get(plane)
    }

    pub fn channel(&self, series: usize, channel: usize) -> Option<&ChannelMeta> {
        self.images.get(series)?.channels.get(channel)
    }

    fn image_mut(&mut self, series: usize) -> &mut ImageMeta {
        slot(&mut self.images, series)
    }

    fn plane_mut(&mut self, series: usize, plane: usize) -> &mut PlaneMeta {
        slot(&mut self.image_mut(series).planes, plane)
    }

    fn channel_mut(&mut self, series: usize, channel: usize) -> &mut ChannelMeta {
        slot(&mut self.image_mut(series).channels, channel)
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn set_image_name(&mut self, name: &str, series: usize) {
        self.image_mut(series).name = Some(name.to_string());
    }

    fn set_pixels_dimensions(&mut self, dimensions: PixelsDimensions, series: usize) {
        self.image_mut(series).pixels = Some(dimensions);
    }

    fn set_pixels_physical_size_x(&mut self, microns: f64, series: usize) {
        self.image_mut(series).physical_size_x = Some(microns);
    }

    fn set_pixels_physical_size_y(&mut self, microns: f64, series: usize) {
        self.image_mut(series).physical_size_y = Some(microns);
    }

    fn set_channel_emission_wavelength(&mut self, nm: u32, series: usize, channel: usize) {
        self.channel_mut(series, channel).emission_wavelength = Some(nm);
    }

    fn set_channel_excitation_wavelength(&mut self, nm: u32, series: usize, channel: usize) {
        self.channel_mut(series, channel).excitation_wavelength = Some(nm);
    }

    fn set_plane_delta_t(&mut self, seconds: f64, series: usize, plane: usize) {
        self.plane_mut(series, plane).delta_t = Some(seconds);
    }

    fn set_plane_exposure_time(&mut self, seconds: f64, series: usize, plane: usize) {
        self.plane_mut(series, plane).exposure_time = Some(seconds);
    }

    fn set_plane_position(&mut self, position: StagePosition, series: usize, plane: usize) {
        self.plane_mut(series, plane).position = Some(position);
    }

    fn set_image_acquisition_date(&mut self, date: NaiveDateTime, series: usize) {
        self.image_mut(series).acquisition_date = Some(date);
    }

    fn set_instrument_id(&mut self, id: &str, instrument: usize) {
        *slot(&mut self.instruments, instrument) = id.to_string();
    }

    fn set_image_instrument_ref(&mut self, id: &str, series: usize) {
        self.image_mut(series).instrument_ref = Some(id.to_string());
    }
}
