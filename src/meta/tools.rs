//! Helpers that copy reader state into a metadata store.

use crate::error::ReaderError;
use crate::format::FormatReader;
use crate::io::stem;

use super::store::{MetadataStore, PixelsDimensions};

/// Write pixel dimensions and an image name for every series of `reader`.
pub fn populate_pixels<R: FormatReader + ?Sized>(
    store: &mut dyn MetadataStore,
    reader: &R,
) -> Result<(), ReaderError> {
    let name = reader
        .source()
        .map(|p| stem(&p.display().to_string()).to_string())
        .unwrap_or_default();

    for series in 0..reader.series_count() {
        let core = reader.core(series)?;
        store.set_pixels_dimensions(PixelsDimensions::from(core), series);
        if reader.series_count() > 1 {
            store.set_image_name(&format!("{} #{}", name, series + 1), series);
        } else {
            store.set_image_name(&name, series);
        }
    }
    Ok(())
}

/// Identifier of the `index`-th object of a kind, e.g. `Instrument:0`.
pub fn create_lsid(kind: &str, index: usize) -> String {
    format!("{}:{}", kind, index)
}
