//! Composition of decorators around a base reader.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::Serialize;
use tracing::debug;

use crate::format::FormatReader;

use super::{ChannelFiller, ChannelMerger, ChannelSeparator, FileStitcher, MinMaxCalculator};

/// One optional reader capability.
///
/// Variants are declared innermost first; the builder wraps in this order
/// regardless of the order they were requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decorator {
    Stitch,
    Separate,
    Merge,
    Fill,
    MinMax,
}

impl fmt::Display for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Decorator::Stitch => "stitcher",
            Decorator::Separate => "channel separator",
            Decorator::Merge => "channel merger",
            Decorator::Fill => "channel filler",
            Decorator::MinMax => "min/max calculator",
        };
        f.write_str(name)
    }
}

/// Collects decorator requests and wraps a base reader once.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    layers: BTreeSet<Decorator>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a decorator. Requesting one twice has no further effect.
    pub fn with(mut self, decorator: Decorator) -> Self {
        self.layers.insert(decorator);
        self
    }

    /// Request a decorator when `enabled` is set.
    pub fn with_if(self, decorator: Decorator, enabled: bool) -> Self {
        if enabled {
            self.with(decorator)
        } else {
            self
        }
    }

    /// Requested decorators, innermost first.
    pub fn layers(&self) -> Vec<Decorator> {
        self.layers.iter().copied().collect()
    }

    /// Wrap `base` in every requested decorator.
    pub fn build(self, base: Box<dyn FormatReader>) -> Pipeline {
        let mut reader = base;
        for layer in &self.layers {
            debug!("Adding {}", layer);
            reader = match layer {
                Decorator::Stitch => Box::new(FileStitcher::new(reader)),
                Decorator::Separate => Box::new(ChannelSeparator::new(reader)),
                Decorator::Merge => Box::new(ChannelMerger::new(reader)),
                Decorator::Fill => Box::new(ChannelFiller::new(reader)),
                Decorator::MinMax => Box::new(MinMaxCalculator::new(reader)),
            };
        }
        Pipeline {
            reader,
            layers: self.layers.into_iter().collect(),
        }
    }
}

/// A finished reader stack.
///
/// Dereferences to the outermost reader, so the whole
/// [`FormatReader`] contract is available directly.
pub struct Pipeline {
    reader: Box<dyn FormatReader>,
    layers: Vec<Decorator>,
}

impl Pipeline {
    /// Decorators in the stack, innermost first.
    pub fn layers(&self) -> &[Decorator] {
        &self.layers
    }

    pub fn has(&self, decorator: Decorator) -> bool {
        self.layers.contains(&decorator)
    }

    pub fn into_inner(self) -> Box<dyn FormatReader> {
        self.reader
    }
}

impl Deref for Pipeline {
    type Target = dyn FormatReader;

    fn deref(&self) -> &Self::Target {
        self.reader.as_ref()
    }
}

impl DerefMut for Pipeline {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader.as_mut()
    }
}
