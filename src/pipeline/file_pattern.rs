//! Numbered file patterns.
//!
//! A pattern is a path whose file name contains one or more `<start-end>`
//! blocks, for example `img_z<01-12>.tif`. Expanding it yields every file
//! name in the inclusive range, zero-padded to the width of `start`. When
//! there are several blocks, the last one varies fastest. A pattern may name
//! at most [`MAX_PATTERN_FILES`] files.

use std::path::{Path, PathBuf};

use crate::error::{FormatError, IoError};
use crate::format::Axis;
use crate::io::{list_dir, parent_dir};

/// Largest number of files a pattern may expand to.
pub const MAX_PATTERN_FILES: usize = 1 << 20;

/// One `<start-end>` block of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternBlock {
    pub start: u64,
    pub end: u64,
    /// Minimum number of digits; shorter values are zero-padded.
    pub width: usize,
    /// Axis guessed from the letters in front of the block.
    pub axis: Axis,
}

impl PatternBlock {
    /// Values in the block, saturating at `usize::MAX`.
    pub fn count(&self) -> usize {
        self.checked_count().unwrap_or(usize::MAX)
    }

    fn checked_count(&self) -> Option<usize> {
        let span = self.end.checked_sub(self.start)?.checked_add(1)?;
        usize::try_from(span).ok()
    }

    fn format(&self, value: u64) -> String {
        format!("{:0width$}", value, width = self.width)
    }
}

/// A parsed file pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    pattern: String,
    /// Text around the blocks; always one more entry than `blocks`.
    literals: Vec<String>,
    blocks: Vec<PatternBlock>,
}

impl FilePattern {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Result<Self, FormatError> {
        let invalid = |message: &str| FormatError::InvalidPattern {
            pattern: pattern.to_string(),
            message: message.to_string(),
        };

        let mut literals = Vec::new();
        let mut blocks = Vec::new();
        let mut rest = pattern;
        let mut literal = String::new();
        let mut total: usize = 1;

        while let Some(open) = rest.find('<') {
            let close = rest[open..]
                .find('>')
                .map(|i| open + i)
                .ok_or_else(|| invalid("unterminated block"))?;
            literal.push_str(&rest[..open]);

            let body = &rest[open + 1..close];
            let (start_text, end_text) = body
                .split_once('-')
                .ok_or_else(|| invalid("block must be <start-end>"))?;
            let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
            if !digits(start_text) || !digits(end_text) {
                return Err(invalid("block bounds must be decimal numbers"));
            }
            let start: u64 = start_text.parse().map_err(|_| invalid("block start overflows"))?;
            let end: u64 = end_text.parse().map_err(|_| invalid("block end overflows"))?;
            if end < start {
                return Err(invalid("block end is before its start"));
            }

            let block = PatternBlock {
                start,
                end,
                width: start_text.len(),
                axis: guess_axis(&literal),
            };
            total = block
                .checked_count()
                .and_then(|count| total.checked_mul(count))
                .filter(|count| *count <= MAX_PATTERN_FILES)
                .ok_or_else(|| {
                    invalid(&format!("pattern names more than {} files", MAX_PATTERN_FILES))
                })?;
            blocks.push(block);
            literals.push(std::mem::take(&mut literal));
            rest = &rest[close + 1..];
        }
        literal.push_str(rest);
        literals.push(literal);

        Ok(Self {
            pattern: pattern.to_string(),
            literals,
            blocks,
        })
    }

    /// Whether the file name of `path` contains a block.
    pub fn is_pattern(path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.contains('<') && name.contains('>')
            })
            .unwrap_or(false)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn blocks(&self) -> &[PatternBlock] {
        &self.blocks
    }

    /// Number of files the pattern expands to.
    pub fn file_count(&self) -> usize {
        self.blocks
            .iter()
            .map(PatternBlock::count)
            .fold(1, usize::saturating_mul)
    }

    /// Every file named by the pattern, last block varying fastest.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut values: Vec<u64> = self.blocks.iter().map(|b| b.start).collect();
        let mut files = Vec::with_capacity(self.file_count());

        loop {
            let mut name = String::new();
            for (i, block) in self.blocks.iter().enumerate() {
                name.push_str(&self.literals[i]);
                name.push_str(&block.format(values[i]));
            }
            name.push_str(&self.literals[self.blocks.len()]);
            files.push(PathBuf::from(name));

            // Advance the odometer from the last block.
            let mut i = self.blocks.len();
            loop {
                if i == 0 {
                    return files;
                }
                i -= 1;
                if values[i] < self.blocks[i].end {
                    values[i] += 1;
                    break;
                }
                values[i] = self.blocks[i].start;
            }
        }
    }
}

/// Derive a pattern from the siblings of `path`.
///
/// Each run of digits in the file name is tried, last run first. A run
/// qualifies when at least two siblings differ from `path` only in that run
/// and their values form a contiguous range. The run with the most siblings
/// wins. Returns `None` when no run qualifies.
pub fn find_pattern(path: &Path) -> Result<Option<String>, IoError> {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let dir = parent_dir(path);
    let siblings = list_dir(&dir)?;

    let mut best: Option<(usize, String)> = None;
    for (start, end) in digit_runs(&name).into_iter().rev() {
        let prefix = &name[..start];
        let suffix = &name[end..];

        let mut values: Vec<(u64, &str)> = siblings
            .iter()
            .filter_map(|sibling| sibling.strip_prefix(prefix)?.strip_suffix(suffix))
            .filter(|mid| !mid.is_empty() && mid.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|mid| mid.parse::<u64>().ok().map(|v| (v, mid)))
            .collect();
        if values.len() < 2 {
            continue;
        }
        values.sort_unstable();
        values.dedup_by_key(|(v, _)| *v);

        let (min, min_text) = values[0];
        let (max, _) = values[values.len() - 1];
        if max - min != values.len() as u64 - 1 {
            continue;
        }

        let padded = values.iter().all(|(_, text)| text.len() == min_text.len());
        let width = if padded { min_text.len() } else { 1 };
        let candidate = format!(
            "{}<{:0w$}-{:0w$}>{}",
            prefix,
            min,
            max,
            suffix,
            w = width
        );
        if best.as_ref().map_or(true, |(count, _)| values.len() > *count) {
            best = Some((values.len(), candidate));
        }
    }

    Ok(best.map(|(_, name)| dir.join(name).display().to_string()))
}

/// Byte ranges of the maximal digit runs in `name`.
fn digit_runs(name: &str) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, c) in name.char_indices() {
        match (c.is_ascii_digit(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, name.len()));
    }
    runs
}

/// Guess the axis of a block from the letters just before it.
fn guess_axis(prefix: &str) -> Axis {
    let word: String = prefix
        .trim_end_matches(['_', '-', '.', ' '])
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<String>()
        .to_ascii_lowercase();

    if word.ends_with("ch") || word.ends_with('c') || word.ends_with('w') {
        Axis::C
    } else if word.ends_with('z') {
        Axis::Z
    } else {
        Axis::T
    }
}
