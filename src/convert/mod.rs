//! Dataset conversion.
//!
//! The [`Converter`] drives a reader pipeline and a [`FormatWriter`]: for each
//! selected series and plane it reads the plane (or a crop of it), optionally
//! rescales it to 8 or 16 bits, and saves it whole or tile by tile depending
//! on its size and on what the writer can do.
//!
//! ```text
//! input --> ImageReader --> decorators --> Converter --> FormatWriter --> output(s)
//! ```

pub mod autoscale;
pub mod driver;
pub mod labels;
pub mod naming;
pub mod tiles;
pub mod writer;

pub use autoscale::{autoscale, combined_range, scale_sample};
pub use driver::{ConversionReport, ConvertOptions, Converter, DEFAULT_BIG_IMAGE_THRESHOLD};
pub use labels::{LabelTable, WellLabel};
pub use naming::{plane_file, series_file, OutputNamer};
pub use tiles::{paste_tile, TileGrid};
pub use writer::{
    writer_for_path, Compression, FormatWriter, PlaneLayout, PngWriter, RawHeader, RawWriter,
    WriterCapabilities,
};
