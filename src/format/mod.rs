//! Format readers for microscopy datasets.
//!
//! This module holds the reader contract ([`FormatReader`]), the data model it
//! speaks in ([`CoreMetadata`], [`DimensionOrder`], [`PixelType`], ...) and
//! the concrete readers.
//!
//! # Format Detection
//!
//! Use [`detect::detect_format`] to identify the format of a file, or open it
//! through [`ImageReader`], which detects and dispatches in one step.
//! Currently supported formats:
//!
//! - **PerkinElmer Ultraview**: `.htm` described companion-file datasets
//! - **TIFF**: single-plane TIFF files

pub mod core;
pub mod detect;
pub mod dimensions;
pub mod image_reader;
pub mod perkin_elmer;
pub mod pixels;
pub mod reader;
pub mod tiff;

pub use self::core::{CoreMetadata, LookupTable, PixelType, Region};
pub use detect::{detect_format, is_tiff_header, DatasetFormat};
pub use dimensions::{raster_index, zct_coords, Axis, DimensionOrder, PlaneCoords, ZctSizes};
pub use image_reader::ImageReader;
pub use perkin_elmer::PerkinElmerReader;
pub use pixels::PlaneSamples;
pub use reader::{
    check_plane_parameters, FormatReader, GroupingPolicy, SampleRange, THUMBNAIL_SIZE,
};
pub use tiff::{TiffPlane, TiffReader};
