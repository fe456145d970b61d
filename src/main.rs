//! scope-convert - reads and converts microscopy datasets.
//!
//! This binary parses the command line, sets up logging and runs the
//! requested subcommand. Conversion itself is synchronous and runs on a
//! blocking worker so that Ctrl-C can stop it between planes.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scope_convert::{
    config::{Cli, Command, ConvertConfig, InfoConfig, InfoOutputFormat},
    ConvertError, ConvertOptions, Converter, CoreMetadata, Decorator, FormatReader, ImageReader,
    MemoryMetadataStore, PipelineBuilder,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Convert(config) => run_convert(config).await,
        Command::Info(config) => run_info(config),
    }
}

// =============================================================================
// Convert Command
// =============================================================================

async fn run_convert(config: ConvertConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options = ConvertOptions::from(config);
    info!("Configuration:");
    info!("  Input: {}", options.input.display());
    info!("  Output: {}", options.output);
    if let Some((start, end)) = options.range {
        info!("  Planes: {} to {}", start, end);
    }
    if let Some(crop) = options.crop {
        info!(
            "  Crop: {}x{} at ({}, {})",
            crop.width, crop.height, crop.x, crop.y
        );
    }

    let converter = match Converter::new(options) {
        Ok(converter) => converter,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let converter = converter.with_cancel_flag(Arc::clone(&cancel));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current plane");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let result = tokio::task::spawn_blocking(move || converter.run()).await;
    match result {
        Ok(Ok(report)) => {
            for path in &report.outputs_deleted {
                info!("  Deleted empty output {}", path.display());
            }
            info!("[done]");
            ExitCode::SUCCESS
        }
        Ok(Err(ConvertError::Cancelled { planes_written })) => {
            warn!("Conversion cancelled after {} plane(s)", planes_written);
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Conversion worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "scope_convert=debug"
    } else {
        "scope_convert=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Serialize)]
struct DatasetInfo {
    format: &'static str,
    series: Vec<CoreMetadata>,
    used_files: Vec<PathBuf>,
    metadata: MemoryMetadataStore,
}

fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let base = ImageReader::new().with_grouping(!config.no_group);
    let mut reader = PipelineBuilder::new()
        .with_if(Decorator::Stitch, config.stitch)
        .build(Box::new(base));
    let mut store = MemoryMetadataStore::new();

    if let Err(e) = reader.set_source(&config.file, &mut store) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let info = match collect_info(&*reader, store, config.no_pixels) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    reader.close(false);

    match config.output_format() {
        InfoOutputFormat::Json => match serde_json::to_string_pretty(&info) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        InfoOutputFormat::Text => print_info(&info),
    }

    ExitCode::SUCCESS
}

fn collect_info(
    reader: &dyn FormatReader,
    metadata: MemoryMetadataStore,
    no_pixels: bool,
) -> Result<DatasetInfo, ConvertError> {
    let series = (0..reader.series_count())
        .map(|s| reader.core(s).cloned())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DatasetInfo {
        format: reader.format_name(),
        series,
        used_files: reader.used_files(no_pixels)?,
        metadata,
    })
}

fn print_info(info: &DatasetInfo) {
    println!("Format: {}", info.format);
    println!("Series: {}", info.series.len());
    for (index, core) in info.series.iter().enumerate() {
        println!();
        println!("Series #{}", index);
        println!("─────────");
        println!("  Image count = {}", core.image_count);
        println!("  RGB = {} ({})", core.is_rgb(), core.rgb_channel_count);
        println!("  Interleaved = {}", core.interleaved);
        println!("  Indexed = {}", core.indexed);
        println!("  Width = {}", core.size_x);
        println!("  Height = {}", core.size_y);
        println!("  SizeZ = {}", core.size_z);
        println!("  SizeC = {}", core.size_c);
        println!("  SizeT = {}", core.size_t);
        println!("  Pixel type = {}", core.pixel_type);
        println!("  Bits per pixel = {}", core.bits_per_pixel);
        println!("  Little endian = {}", core.little_endian);
        println!("  Dimension order = {}", core.dimension_order);
    }

    println!();
    println!("Used files:");
    for path in &info.used_files {
        println!("  {}", path.display());
    }
}
