//! Canonical metadata sink.
//!
//! Readers normalize what they parse into the [`MetadataStore`] interface.
//! [`MemoryMetadataStore`] is the in-crate implementation used by the
//! conversion driver and the `info` command; it serializes to JSON.

mod store;
mod tools;

pub use store::{
    ChannelMeta, ImageMeta, MemoryMetadataStore, MetadataStore, PixelsDimensions, PlaneMeta,
    StagePosition,
};
pub use tools::{create_lsid, populate_pixels};
