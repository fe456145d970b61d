//! # scope-convert
//!
//! Readers and a converter for multidimensional microscopy datasets.
//!
//! Vendor datasets come as a mix of binary pixel files and companion text
//! files. This library detects them, groups their files, parses their
//! metadata into a canonical model and serves their pixels plane by plane in
//! one buffer layout, whatever the source format.
//!
//! ## Features
//!
//! - **Format readers**: PerkinElmer Ultraview companion-file datasets and
//!   single-plane TIFF files behind one [`FormatReader`] contract
//! - **Canonical metadata**: dimensions, physical sizes, wavelengths, timing
//!   and stage positions pushed into a [`MetadataStore`]
//! - **Decorators**: file stitching, channel separation and merging,
//!   lookup-table expansion and min/max statistics, composed by a
//!   [`PipelineBuilder`]
//! - **Conversion**: plane ranges, crops, per-axis filters, autoscaling,
//!   tiled writes for big planes and empty-output cleanup
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - File range reads and path helpers
//! - [`mod@format`] - Reader contract, data model and concrete readers
//! - [`meta`] - Metadata store interface and in-memory store
//! - [`pipeline`] - Reader decorators and their builder
//! - [`convert`] - Conversion driver and output writers
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use scope_convert::{FormatReader, ImageReader, MemoryMetadataStore};
//!
//! let mut reader = ImageReader::new();
//! let mut store = MemoryMetadataStore::new();
//! reader.set_source("/data/exp.htm".as_ref(), &mut store)?;
//!
//! let core = reader.core(0)?;
//! println!("{} planes of {}x{}", core.image_count, core.size_x, core.size_y);
//! let plane = reader.open_full_plane(0, 0)?;
//! # let _ = plane;
//! # Ok::<(), scope_convert::ReaderError>(())
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod io;
pub mod meta;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Cli, Command, ConvertConfig, InfoConfig, InfoOutputFormat};
pub use convert::{
    writer_for_path, Compression, ConversionReport, ConvertOptions, Converter, FormatWriter,
    LabelTable, OutputNamer, PngWriter, RawWriter, TileGrid, WriterCapabilities,
};
pub use error::{ConvertError, FormatError, IoError, ReaderError, UsageError};
pub use format::{
    check_plane_parameters, detect_format, raster_index, zct_coords, CoreMetadata,
    DatasetFormat, DimensionOrder, FormatReader, GroupingPolicy, ImageReader, LookupTable,
    PerkinElmerReader, PixelType, PlaneCoords, PlaneSamples, Region, SampleRange, TiffReader,
};
pub use io::{FileRangeReader, RangeReader};
pub use meta::{MemoryMetadataStore, MetadataStore};
pub use pipeline::{
    find_pattern, ChannelFiller, ChannelMerger, ChannelSeparator, Decorator, FilePattern,
    FileStitcher, MinMaxCalculator, Pipeline, PipelineBuilder,
};
