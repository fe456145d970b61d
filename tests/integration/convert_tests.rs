//! End-to-end conversion tests.
//!
//! Each test writes a dataset into a temporary directory, runs a
//! [`Converter`] with options as the CLI would build them, and inspects the
//! files it produced.

use super::test_utils::*;
use std::fs;
use std::path::Path;

use scope_convert::{
    Compression, ConvertError, ConvertOptions, Converter, RawWriter, Region,
};

fn run(options: ConvertOptions) -> Result<scope_convert::ConversionReport, ConvertError> {
    Converter::new(options)?.run()
}

fn out(dir: &Path, name: &str) -> String {
    dir.join(name).display().to_string()
}

fn raw_header(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(RawWriter::header_path(path)).unwrap();
    serde_json::from_str(&text).unwrap()
}

// =============================================================================
// Raw Output
// =============================================================================

#[test]
fn test_experiment_to_raw() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "exp.raw");

    let report = run(ConvertOptions::new(&htm, output.as_str())).unwrap();
    assert_eq!(report.planes_written, 5);
    assert_eq!(report.outputs_created.len(), 1);

    let bytes = fs::read(&output).unwrap();
    assert_eq!(bytes.len(), 5 * 4 * 3 * 2);
    let samples = u16_samples(&bytes);
    for plane in 0..5 {
        assert!(samples[plane * 12..(plane + 1) * 12]
            .iter()
            .all(|v| *v == raw_value(plane + 1)));
    }

    let header = raw_header(Path::new(&output));
    assert_eq!(header["width"], 4);
    assert_eq!(header["height"], 3);
    assert_eq!(header["planes"], 5);
    assert_eq!(header["little_endian"], true);
}

#[test]
fn test_plane_range_writes_reindexed_planes() {
    let data = tempfile::tempdir().unwrap();
    let layout = ExperimentLayout {
        slices: 10,
        files: 10,
        ..Default::default()
    };
    let htm = write_experiment(data.path(), &layout);
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "range.raw");

    let mut options = ConvertOptions::new(&htm, output.as_str());
    options.range = Some((2, 4));
    let report = run(options).unwrap();

    assert_eq!(report.planes_written, 3);
    let samples = u16_samples(&fs::read(&output).unwrap());
    assert_eq!(samples.len(), 3 * 12);
    assert_eq!(samples[0], raw_value(3));
    assert_eq!(samples[12], raw_value(4));
    assert_eq!(samples[24], raw_value(5));
    assert_eq!(raw_header(Path::new(&output))["planes"], 3);
}

#[test]
fn test_crop_and_z_filter() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "crop.raw");

    let mut options = ConvertOptions::new(&htm, output.as_str());
    options.crop = Some(Region::new(1, 1, 2, 2));
    options.z = Some(3);
    let report = run(options).unwrap();

    assert_eq!(report.planes_written, 1);
    assert_eq!(
        u16_samples(&fs::read(&output).unwrap()),
        vec![raw_value(4); 4]
    );
}

#[test]
fn test_tiled_conversion_matches_whole_planes() {
    let data = tempfile::tempdir().unwrap();
    let layout = ExperimentLayout {
        width: 9,
        height: 7,
        ..Default::default()
    };
    let htm = write_experiment(data.path(), &layout);
    let target = tempfile::tempdir().unwrap();

    let whole = out(target.path(), "whole.raw");
    run(ConvertOptions::new(&htm, whole.as_str())).unwrap();

    let tiled = out(target.path(), "tiled.raw");
    let mut options = ConvertOptions::new(&htm, tiled.as_str());
    options.big_image_threshold = 10;
    options.tile_size = Some((4, 3));
    run(options).unwrap();

    assert_eq!(fs::read(&tiled).unwrap(), fs::read(&whole).unwrap());
}

#[test]
fn test_stitched_tiffs_to_raw() {
    let data = tempfile::tempdir().unwrap();
    write_numbered_tiffs(data.path(), "t", 3, 2, 2);
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "stack.raw");

    let mut options = ConvertOptions::new(data.path().join("t2.tif"), output.as_str());
    options.stitch = true;
    let report = run(options).unwrap();

    assert_eq!(report.planes_written, 3);
    assert_eq!(
        fs::read(&output).unwrap(),
        vec![10, 10, 10, 10, 20, 20, 20, 20, 30, 30, 30, 30]
    );
}

// =============================================================================
// PNG Output
// =============================================================================

#[test]
fn test_one_png_per_z_section() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());
    let target = tempfile::tempdir().unwrap();

    let mut options = ConvertOptions::new(&htm, out(target.path(), "z%z.png"));
    options.compression = Compression::Best;
    let report = run(options).unwrap();
    assert_eq!(report.outputs_created.len(), 5);

    let img = image::open(target.path().join("z2.png")).unwrap().to_luma16();
    assert_eq!(img.dimensions(), (4, 3));
    assert!(img.pixels().all(|p| p.0[0] == raw_value(3)));
}

#[test]
fn test_autoscaled_png() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("rgb.tif");
    write_rgb_tiff(&path, 3, 2);
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "scaled.png");

    let mut options = ConvertOptions::new(&path, output.as_str());
    options.autoscale = true;
    run(options).unwrap();

    // Samples span 0..=3 across all channels.
    let img = image::open(&output).unwrap().to_rgb8();
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(img.get_pixel(2, 1).0, [170, 85, 255]);
}

#[test]
fn test_separated_channels_to_png_files() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("rgb.tif");
    write_rgb_tiff(&path, 3, 2);
    let target = tempfile::tempdir().unwrap();

    let mut options = ConvertOptions::new(&path, out(target.path(), "c%c.png"));
    options.separate = true;
    let report = run(options).unwrap();
    assert_eq!(report.planes_written, 3);

    let green = image::open(target.path().join("c1.png")).unwrap().to_luma8();
    assert_eq!(green.as_raw(), &vec![0, 0, 0, 1, 1, 1]);
}

// =============================================================================
// Output Policies
// =============================================================================

#[test]
fn test_existing_output_needs_overwrite() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "exp.raw");
    fs::write(&output, b"keep me").unwrap();

    let err = run(ConvertOptions::new(&htm, output.as_str())).unwrap_err();
    assert!(matches!(err, ConvertError::OutputExists(_)));
    assert_eq!(fs::read(&output).unwrap(), b"keep me");

    let mut options = ConvertOptions::new(&htm, output.as_str());
    options.overwrite = Some(true);
    run(options).unwrap();
    assert_eq!(fs::read(&output).unwrap().len(), 5 * 24);
}

#[test]
fn test_empty_outputs_are_deleted() {
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("dark.tif");
    write_gray_tiff(&path, 4, 4, 0);
    let target = tempfile::tempdir().unwrap();
    let output = out(target.path(), "dark.raw");

    let mut options = ConvertOptions::new(&path, output.as_str());
    options.delete_empty = true;
    let report = run(options).unwrap();

    assert_eq!(report.planes_written, 1);
    assert_eq!(report.outputs_deleted.len(), 1);
    assert!(!Path::new(&output).exists());
}

#[test]
fn test_labels_rewrite_output_names() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());
    let labels = data.path().join("labels.txt");
    fs::write(&labels, "1--A--1--x--empty\n2--A--2--x--GFP--CDK1,CDK2\n").unwrap();
    let target = tempfile::tempdir().unwrap();

    let mut options = ConvertOptions::new(
        &htm,
        out(target.path(), "plate7/W2/platename_reporter_symbol.raw"),
    );
    options.labels = Some(labels);
    run(options).unwrap();

    assert!(target
        .path()
        .join("plate7/W2/plate7_GFP_CDK1__CDK2.raw")
        .exists());
}

#[test]
fn test_unknown_writer_suffix() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());

    let err = run(ConvertOptions::new(&htm, "out.jpg")).unwrap_err();
    assert!(matches!(err, ConvertError::Config(_)));
}

#[test]
fn test_grouping_disabled_for_experiment() {
    let data = tempfile::tempdir().unwrap();
    let htm = write_experiment(data.path(), &ExperimentLayout::default());
    let target = tempfile::tempdir().unwrap();

    let mut options = ConvertOptions::new(&htm, out(target.path(), "x.raw"));
    options.group_files = false;
    let err = run(options).unwrap_err();
    assert!(matches!(err, ConvertError::Reader(_)));
}
