//! Reader tests over datasets written to disk.
//!
//! These tests open synthetic datasets through the dispatching reader and
//! check detection, grouping, reconciliation, plane access and the metadata
//! pushed into the store.

use super::test_utils::*;
use std::fs;

use scope_convert::{
    detect_format, DatasetFormat, DimensionOrder, FormatReader, ImageReader, LookupTable,
    MemoryMetadataStore, PixelType, PlaneCoords, ReaderError, Region, UsageError,
};

fn open(path: &std::path::Path) -> (ImageReader, MemoryMetadataStore) {
    let mut reader = ImageReader::new();
    let mut store = MemoryMetadataStore::new();
    reader.set_source(path, &mut store).unwrap();
    (reader, store)
}

// =============================================================================
// PerkinElmer Experiments
// =============================================================================

#[test]
fn test_experiment_is_one_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());

    assert_eq!(detect_format(&htm).unwrap(), DatasetFormat::PerkinElmer);
    assert_eq!(
        detect_format(&dir.path().join("exp_1.3")).unwrap(),
        DatasetFormat::PerkinElmer
    );

    let (reader, _) = open(&htm);
    assert_eq!(reader.format(), Some(DatasetFormat::PerkinElmer));
    assert_eq!(reader.series_count(), 1);

    let core = reader.core(0).unwrap();
    assert_eq!((core.size_x, core.size_y), (4, 3));
    assert_eq!((core.size_z, core.size_c, core.size_t), (5, 1, 1));
    assert_eq!(core.image_count, 5);
    assert_eq!(core.pixel_type, PixelType::Uint16);
    assert_eq!(core.dimension_order, DimensionOrder::XYCTZ);
    assert!(!core.interleaved);
    assert!(core.little_endian);
}

#[test]
fn test_pixel_files_in_ascending_hex_order() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (mut reader, _) = open(&htm);

    let files = reader.used_files(false).unwrap();
    assert_eq!(
        file_names(&files[..5]),
        vec!["exp_1.1", "exp_1.2", "exp_1.3", "exp_1.4", "exp_1.5"]
    );

    for plane in 0..5 {
        let bytes = reader.open_full_plane(0, plane).unwrap();
        assert_eq!(bytes.len(), 4 * 3 * 2);
        assert!(u16_samples(&bytes)
            .iter()
            .all(|v| *v == raw_value(plane + 1)));
    }
}

#[test]
fn test_hex_suffixes_sort_numerically() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ExperimentLayout {
        slices: 12,
        files: 12,
        ..Default::default()
    };
    let htm = write_experiment(dir.path(), &layout);
    let (mut reader, _) = open(&htm);

    let files = reader.used_files(false).unwrap();
    let names = file_names(&files[..12]);
    assert_eq!(names[8], "exp_1.9");
    assert_eq!(names[9], "exp_1.a");
    assert_eq!(names[11], "exp_1.c");

    let bytes = reader.open_full_plane(0, 9).unwrap();
    assert_eq!(u16_samples(&bytes)[0], raw_value(10));
}

#[test]
fn test_open_from_pixel_file_retargets_to_htm() {
    let dir = tempfile::tempdir().unwrap();
    write_experiment(dir.path(), &ExperimentLayout::default());
    let (reader, _) = open(&dir.path().join("exp_1.4"));

    assert_eq!(
        reader.source().unwrap().file_name().unwrap(),
        "exp.htm"
    );
}

#[test]
fn test_plane_out_of_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (mut reader, _) = open(&htm);

    let err = reader
        .open_plane(0, 5, Region::new(0, 0, 4, 3))
        .unwrap_err();
    assert!(matches!(
        err,
        ReaderError::Usage(UsageError::PlaneOutOfRange { plane: 5, count: 5 })
    ));
}

#[test]
fn test_region_read() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (mut reader, _) = open(&htm);

    let bytes = reader.open_plane(0, 1, Region::new(1, 1, 2, 2)).unwrap();
    assert_eq!(u16_samples(&bytes), vec![raw_value(2); 4]);

    let err = reader.open_plane(0, 1, Region::new(3, 0, 2, 1)).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::Usage(UsageError::RegionOutOfBounds { .. })
    ));
}

#[test]
fn test_declared_counts_larger_than_files_are_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ExperimentLayout {
        slices: 8,
        files: 5,
        ..Default::default()
    };
    let htm = write_experiment(dir.path(), &layout);
    let (reader, _) = open(&htm);

    let core = reader.core(0).unwrap();
    assert_eq!(core.image_count, 5);
    assert_eq!(core.size_z * core.effective_size_c() * core.size_t, 5);
}

#[test]
fn test_missing_htm_is_not_detected() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    fs::remove_file(&htm).unwrap();

    let mut reader = ImageReader::new();
    let mut store = MemoryMetadataStore::new();
    let err = reader
        .set_source(&dir.path().join("exp_1.1"), &mut store)
        .unwrap_err();
    assert!(matches!(err, ReaderError::Format(_)));
    assert!(!reader.is_initialized());
}

#[test]
fn test_raster_index_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (reader, _) = open(&htm);

    for plane in 0..5 {
        let coords = reader.zct_coords(0, plane).unwrap();
        assert_eq!(coords, PlaneCoords { z: plane, c: 0, t: 0 });
        assert_eq!(reader.raster_index(0, coords).unwrap(), plane);
    }
    assert!(reader
        .raster_index(0, PlaneCoords { z: 5, c: 0, t: 0 })
        .is_err());
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_store_is_populated() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (_, store) = open(&htm);

    let image = store.image(0).unwrap();
    let pixels = image.pixels.as_ref().unwrap();
    assert_eq!((pixels.size_x, pixels.size_y, pixels.size_z), (4, 3, 5));
    assert_eq!(image.physical_size_x, Some(0.25));
    assert_eq!(image.physical_size_y, Some(0.25));
    assert!(image.acquisition_date.is_some());
    assert_eq!(image.instrument_ref.as_deref(), Some("Instrument:0"));

    let channel = store.channel(0, 0).unwrap();
    assert_eq!(channel.emission_wavelength, Some(520));
    assert_eq!(channel.excitation_wavelength, Some(488));

    // 20 seconds over 5 planes.
    assert_eq!(store.plane(0, 0).unwrap().delta_t, Some(0.0));
    assert_eq!(store.plane(0, 2).unwrap().delta_t, Some(8.0));
    assert_eq!(store.plane(0, 4).unwrap().exposure_time, Some(0.25));
}

#[test]
fn test_original_metadata_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (reader, _) = open(&htm);

    let metadata = reader.global_metadata();
    assert_eq!(metadata.get("Lens").map(String::as_str), Some("40x"));
    assert_eq!(metadata.get("Image Width").map(String::as_str), Some("4"));
}

#[test]
fn test_used_files_without_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_experiment(dir.path(), &ExperimentLayout::default());
    let (reader, _) = open(&htm);

    assert_eq!(reader.used_files(false).unwrap().len(), 8);
    assert_eq!(
        file_names(&reader.used_files(true).unwrap()),
        vec!["exp.tim", "exp.csv", "exp.htm"]
    );
}

#[test]
fn test_palette_tiff_payloads_forward_lookup_table() {
    let dir = tempfile::tempdir().unwrap();
    let htm = write_palette_experiment(dir.path(), 3);
    let (mut reader, _) = open(&htm);

    let core = reader.core(0).unwrap().clone();
    assert!(core.indexed);
    assert_eq!(core.image_count, 3);
    assert_eq!(core.pixel_type, PixelType::Uint8);
    assert_eq!(core.rgb_channel_count, 1);

    // Available before any plane has been read.
    let Some(LookupTable::Bits8(ramps)) = reader.lookup_table(0).unwrap() else {
        panic!("expected an 8-bit lookup table");
    };
    assert_eq!(ramps.len(), 3);
    assert_eq!((ramps[0][7], ramps[1][7], ramps[2][7]), (7, 248, 128));

    assert_eq!(
        reader.open_full_plane(0, 1).unwrap(),
        vec![0, 1, 2, 3, 4, 5, 6, 7]
    );
    assert!(reader.lookup_table(0).unwrap().is_some());
}

// =============================================================================
// TIFF Files
// =============================================================================

#[test]
fn test_single_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cells.tif");
    write_rgb_tiff(&path, 3, 2);
    let (mut reader, store) = open(&path);

    assert_eq!(reader.format(), Some(DatasetFormat::Tiff));
    let core = reader.core(0).unwrap().clone();
    assert_eq!(core.rgb_channel_count, 3);
    assert_eq!(core.size_c, 3);
    assert_eq!(core.image_count, 1);
    assert!(core.interleaved);
    assert!(store.image(0).is_some());

    let bytes = reader.open_full_plane(0, 0).unwrap();
    // Pixel (2, 1).
    assert_eq!(&bytes[15..18], &[2, 1, 3]);

    let (thumb, w, h) = reader.open_thumbnail(0, 0).unwrap();
    assert_eq!((w, h), (3, 2));
    assert_eq!(thumb, bytes);
}

#[test]
fn test_unknown_file_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "nothing to see").unwrap();

    let mut reader = ImageReader::new();
    let mut store = MemoryMetadataStore::new();
    let err = reader.set_source(&path, &mut store).unwrap_err();
    assert!(matches!(err, ReaderError::Format(_)));
}
