//! Decorator pipeline tests over files on disk.

use super::test_utils::*;

use scope_convert::{
    find_pattern, Decorator, FormatReader, ImageReader, MemoryMetadataStore, Pipeline,
    PipelineBuilder, SampleRange,
};

fn build(layers: &[Decorator]) -> Pipeline {
    layers
        .iter()
        .fold(PipelineBuilder::new(), |builder, layer| builder.with(*layer))
        .build(Box::new(ImageReader::new()))
}

// =============================================================================
// Stitching
// =============================================================================

#[test]
fn test_numbered_tiffs_become_one_series() {
    let dir = tempfile::tempdir().unwrap();
    write_numbered_tiffs(dir.path(), "frame_", 4, 3, 2);

    let first = dir.path().join("frame_1.tif");
    let pattern = find_pattern(&first).unwrap().unwrap();
    assert!(pattern.ends_with("frame_<1-4>.tif"));

    let mut reader = build(&[Decorator::Stitch]);
    let mut store = MemoryMetadataStore::new();
    reader.set_source(&first, &mut store).unwrap();

    let core = reader.core(0).unwrap();
    assert_eq!(core.image_count, 4);
    assert_eq!(core.size_t, 4);
    assert_eq!(reader.used_files(false).unwrap().len(), 4);

    for plane in 0..4 {
        let bytes = reader.open_full_plane(0, plane).unwrap();
        assert_eq!(bytes, vec![((plane + 1) * 10) as u8; 6]);
    }
}

#[test]
fn test_stitcher_leaves_grouped_formats_alone() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());

    let mut plain = ImageReader::new();
    let mut store = MemoryMetadataStore::new();
    plain.set_source(&htm, &mut store).unwrap();

    let mut stitched = build(&[Decorator::Stitch]);
    let mut store = MemoryMetadataStore::new();
    stitched.set_source(&htm, &mut store).unwrap();

    assert_eq!(stitched.core(0).unwrap(), plain.core(0).unwrap());
    assert_eq!(
        stitched.open_full_plane(0, 3).unwrap(),
        plain.open_full_plane(0, 3).unwrap()
    );
}

// =============================================================================
// Channels
// =============================================================================

#[test]
fn test_separate_rgb_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.tif");
    write_rgb_tiff(&path, 3, 2);

    let mut reader = build(&[Decorator::Separate]);
    let mut store = MemoryMetadataStore::new();
    reader.set_source(&path, &mut store).unwrap();

    let core = reader.core(0).unwrap();
    assert_eq!(core.image_count, 3);
    assert_eq!(core.rgb_channel_count, 1);
    assert!(!core.interleaved);

    // Pixels in row-major order: x then y.
    assert_eq!(reader.open_full_plane(0, 0).unwrap(), vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(reader.open_full_plane(0, 1).unwrap(), vec![0, 0, 0, 1, 1, 1]);
    assert_eq!(reader.open_full_plane(0, 2).unwrap(), vec![0, 1, 2, 1, 2, 3]);
}

#[test]
fn test_separator_is_transparent_for_gray_data() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());

    let mut plain = ImageReader::new();
    let mut store = MemoryMetadataStore::new();
    plain.set_source(&htm, &mut store).unwrap();

    let mut separated = build(&[Decorator::Separate]);
    let mut store = MemoryMetadataStore::new();
    separated.set_source(&htm, &mut store).unwrap();

    assert_eq!(separated.core(0).unwrap(), plain.core(0).unwrap());
    for plane in 0..5 {
        assert_eq!(
            separated.open_full_plane(0, plane).unwrap(),
            plain.open_full_plane(0, plane).unwrap()
        );
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[test]
fn test_min_max_over_experiment() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());

    let mut reader = build(&[Decorator::MinMax]);
    let mut store = MemoryMetadataStore::new();
    reader.set_source(&htm, &mut store).unwrap();

    assert_eq!(reader.plane_min_max(0, 1), None);
    reader.open_full_plane(0, 1).unwrap();
    reader.open_full_plane(0, 4).unwrap();

    let value = raw_value(2) as f64;
    assert_eq!(
        reader.plane_min_max(0, 1),
        Some(vec![SampleRange {
            min: value,
            max: value
        }])
    );
    assert_eq!(
        reader.channel_min_max(0, 0),
        Some(SampleRange {
            min: raw_value(2) as f64,
            max: raw_value(5) as f64,
        })
    );
}
