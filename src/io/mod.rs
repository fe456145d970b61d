mod location;
mod range_reader;

pub use location::{
    absolute, check_suffix, extension, hex_suffix, list_dir, parent_dir, read_text, stem,
};
pub use range_reader::{read_u16, read_u32, read_u64, FileRangeReader, RangeReader};
