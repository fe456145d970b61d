//! Command-line configuration for scope-convert.
//!
//! This module provides the CLI surface of the binary:
//! - Subcommands via clap (`convert`, `info`)
//! - Environment variables with the `SCOPE_` prefix
//! - Defaults shared with the library
//!
//! Each subcommand validates itself and converts into the plain
//! configuration the library works with, so nothing below `main` depends on
//! clap.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use scope_convert::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Convert(config) => println!("{} -> {}", config.input.display(), config.output),
//!     Command::Info(config) => println!("{}", config.file.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `SCOPE_COMPRESSION` - Output compression (default: none)
//! - `SCOPE_SERIES` - Only convert this series
//! - `SCOPE_OVERWRITE` - Replace existing outputs
//! - `SCOPE_LABELS` - Well label file
//! - `SCOPE_BIG_IMAGE_THRESHOLD` - Pixel count above which planes are tiled
//!   (default: 16777216)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::convert::{Compression, ConvertOptions, DEFAULT_BIG_IMAGE_THRESHOLD};
use crate::format::{PixelType, Region};

// =============================================================================
// CLI Arguments
// =============================================================================

/// scope-convert - reads and converts microscopy datasets.
#[derive(Parser, Debug, Clone)]
#[command(name = "scope-convert")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a dataset into raw or PNG planes.
    Convert(ConvertConfig),

    /// Describe a dataset without converting it.
    Info(InfoConfig),
}

// =============================================================================
// Convert Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ConvertConfig {
    /// Any file of the input dataset.
    pub input: PathBuf,

    /// Output file. May contain %s, %n, %z, %c and %t placeholders.
    pub output: String,

    // =========================================================================
    // Reader Pipeline
    // =========================================================================
    /// Treat numbered sibling files as one dataset.
    #[arg(long, default_value_t = false)]
    pub stitch: bool,

    /// Split RGB planes into one plane per channel.
    #[arg(long, default_value_t = false)]
    pub separate: bool,

    /// Combine channel planes into RGB planes.
    #[arg(long, default_value_t = false)]
    pub merge: bool,

    /// Expand indexed planes through their lookup table.
    #[arg(long, default_value_t = false)]
    pub expand: bool,

    /// Open only the given file, even for multi-file formats.
    #[arg(long, default_value_t = false)]
    pub no_group: bool,

    // =========================================================================
    // Output
    // =========================================================================
    /// Require an output format that can exceed 4 GiB.
    #[arg(long, default_value_t = false)]
    pub bigtiff: bool,

    /// Output compression: none, fast, default or best.
    #[arg(long, default_value = "none", env = "SCOPE_COMPRESSION")]
    pub compression: Compression,

    /// Replace existing output files.
    #[arg(long, conflicts_with = "no_overwrite", env = "SCOPE_OVERWRITE")]
    pub overwrite: bool,

    /// Refuse to replace existing output files.
    #[arg(long)]
    pub no_overwrite: bool,

    /// Delete outputs whose planes are all empty.
    #[arg(long, default_value_t = false)]
    pub delete_empty: bool,

    /// Well label file used to rewrite output names.
    #[arg(long, env = "SCOPE_LABELS")]
    pub labels: Option<PathBuf>,

    // =========================================================================
    // Plane Selection
    // =========================================================================
    /// Only convert this series.
    #[arg(long, env = "SCOPE_SERIES")]
    pub series: Option<usize>,

    /// Inclusive plane range.
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub range: Option<Vec<usize>>,

    /// Crop rectangle as x,y,width,height.
    #[arg(long, value_parser = parse_crop)]
    pub crop: Option<Region>,

    /// Only convert this channel.
    #[arg(long)]
    pub channel: Option<usize>,

    /// Only convert this Z section.
    #[arg(long)]
    pub z: Option<usize>,

    /// Only convert this timepoint.
    #[arg(long)]
    pub timepoint: Option<usize>,

    // =========================================================================
    // Pixels
    // =========================================================================
    /// Rescale every plane into 8 bits using its own range.
    #[arg(long, default_value_t = false)]
    pub autoscale: bool,

    /// Depth of autoscaled samples: 8 or 16.
    #[arg(long, default_value_t = 8, value_parser = parse_autoscale_bits)]
    pub autoscale_bits: u32,

    /// Planes with more pixels than this are written tile by tile.
    #[arg(long, default_value_t = DEFAULT_BIG_IMAGE_THRESHOLD, env = "SCOPE_BIG_IMAGE_THRESHOLD")]
    pub big_image_threshold: u64,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ConvertConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.output.is_empty() {
            return Err("Output file is required".to_string());
        }

        if let Some(range) = &self.range {
            match range.as_slice() {
                [start, end] if start <= end => {}
                [start, end] => {
                    return Err(format!(
                        "range start {} is greater than range end {}",
                        start, end
                    ))
                }
                _ => return Err("range takes exactly two values".to_string()),
            }
        }

        if self.big_image_threshold == 0 {
            return Err("big_image_threshold must be greater than 0".to_string());
        }

        if self.merge && self.separate {
            return Err("--merge and --separate cannot be combined".to_string());
        }

        Ok(())
    }

    /// Overwrite policy: `None` when neither flag was given.
    pub fn overwrite_policy(&self) -> Option<bool> {
        if self.overwrite {
            Some(true)
        } else if self.no_overwrite {
            Some(false)
        } else {
            None
        }
    }
}

impl From<ConvertConfig> for ConvertOptions {
    fn from(config: ConvertConfig) -> Self {
        let overwrite = config.overwrite_policy();
        let range = config.range.as_deref().and_then(|r| match r {
            [start, end] => Some((*start, *end)),
            _ => None,
        });
        ConvertOptions {
            input: config.input,
            output: config.output,
            stitch: config.stitch,
            separate: config.separate,
            merge: config.merge,
            fill: config.expand,
            bigtiff: config.bigtiff,
            compression: config.compression,
            series: config.series,
            range,
            crop: config.crop,
            channel: config.channel,
            z: config.z,
            timepoint: config.timepoint,
            autoscale: config.autoscale,
            autoscale_type: if config.autoscale_bits == 16 {
                PixelType::Uint16
            } else {
                PixelType::Uint8
            },
            overwrite,
            group_files: !config.no_group,
            labels: config.labels,
            delete_empty: config.delete_empty,
            big_image_threshold: config.big_image_threshold,
            tile_size: None,
        }
    }
}

/// Parse an autoscale depth in bits.
pub fn parse_autoscale_bits(value: &str) -> Result<u32, String> {
    match value.trim() {
        "8" => Ok(8),
        "16" => Ok(16),
        other => Err(format!("autoscale depth must be 8 or 16, not '{}'", other)),
    }
}

/// Parse `x,y,width,height`.
pub fn parse_crop(value: &str) -> Result<Region, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid crop '{}': {}", value, e))?;
    match parts.as_slice() {
        [x, y, width, height] if *width > 0 && *height > 0 => {
            Ok(Region::new(*x, *y, *width, *height))
        }
        [_, _, _, _] => Err(format!("crop '{}' has an empty rectangle", value)),
        _ => Err(format!(
            "crop '{}' must have four values: x,y,width,height",
            value
        )),
    }
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Any file of the dataset.
    pub file: PathBuf,

    /// Leave pixel files out of the used-files report.
    #[arg(long, default_value_t = false)]
    pub no_pixels: bool,

    /// Open only the given file, even for multi-file formats.
    #[arg(long, default_value_t = false)]
    pub no_group: bool,

    /// Treat numbered sibling files as one dataset.
    #[arg(long, default_value_t = false)]
    pub stitch: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = InfoOutputFormat::Text)]
    pub format: InfoOutputFormat,

    /// Shorthand for --format json.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    pub fn output_format(&self) -> InfoOutputFormat {
        if self.json {
            InfoOutputFormat::Json
        } else {
            self.format
        }
    }
}

/// How `info` prints its report.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfoOutputFormat {
    /// Human-readable listing.
    #[default]
    Text,
    /// JSON document.
    Json,
}

// =============================================================================
// Tests
// =============================================================================
