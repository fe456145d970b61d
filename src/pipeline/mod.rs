//! Reader decorators and the builder that composes them.
//!
//! Every decorator wraps exactly one inner reader and implements
//! [`FormatReader`](crate::format::FormatReader) itself, so layers stack
//! freely. The builder fixes the composition order:
//!
//! ```text
//! MinMax(Filler(Merger(Separator(Stitcher(base)))))
//! ```
//!
//! Channel layout is settled before the filler expands palettes, and the
//! min/max layer sees the final samples.

/// Forward the contract methods a decorator never changes to `self.inner`.
macro_rules! forward_to_inner {
    () => {
        fn format_name(&self) -> &'static str {
            self.inner.format_name()
        }

        fn is_this_type(&self, path: &std::path::Path, allow_open: bool) -> bool {
            self.inner.is_this_type(path, allow_open)
        }

        fn grouping_policy(&self, path: &std::path::Path) -> $crate::format::GroupingPolicy {
            self.inner.grouping_policy(path)
        }

        fn source(&self) -> Option<&std::path::Path> {
            self.inner.source()
        }

        fn series_count(&self) -> usize {
            self.inner.series_count()
        }

        fn used_files(
            &self,
            no_pixels: bool,
        ) -> Result<Vec<std::path::PathBuf>, $crate::error::ReaderError> {
            self.inner.used_files(no_pixels)
        }

        fn global_metadata(&self) -> &std::collections::BTreeMap<String, String> {
            self.inner.global_metadata()
        }

        fn optimal_tile_size(&self, series: usize) -> Result<(u32, u32), $crate::error::ReaderError> {
            self.inner.optimal_tile_size(series)
        }
    };
}

mod builder;
mod file_pattern;
mod filler;
mod merger;
mod min_max;
mod separator;
mod stitcher;

#[cfg(test)]
pub(crate) mod mock;

pub use builder::{Decorator, Pipeline, PipelineBuilder};
pub use file_pattern::{find_pattern, FilePattern, PatternBlock};
pub use filler::ChannelFiller;
pub use merger::ChannelMerger;
pub use min_max::MinMaxCalculator;
pub use separator::ChannelSeparator;
pub use stitcher::FileStitcher;
