//! Well label table for plate conversions.
//!
//! A label file has one line per well:
//!
//! ```text
//! 12--A--3--plate7--GFP-tagged--CDK1,CDK2
//! ```
//!
//! Columns are separated by `--`. The first column is the well index, the
//! fifth the reporter and the optional sixth the gene symbol. Output names
//! that pass through a `W<n>` directory or file component then have the words
//! `platename`, `reporter` and `symbol` rewritten for well `n`.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::ConvertError;
use crate::io::read_text;

const SEPARATOR: &str = "--";
const REPORTER_COLUMN: usize = 4;
const SYMBOL_COLUMN: usize = 5;

/// Reporter and symbol of one well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WellLabel {
    pub reporter: String,
    pub symbol: String,
}

impl WellLabel {
    fn from_columns(columns: &[&str]) -> Self {
        let reporter = columns[REPORTER_COLUMN].to_string();
        let symbol = match columns.get(SYMBOL_COLUMN) {
            Some(symbol) => symbol.replace(',', "__").replace('/', "-"),
            None if reporter == "empty" => "mock".to_string(),
            None => "unknown".to_string(),
        };
        Self { reporter, symbol }
    }
}

/// Labels keyed by well index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: BTreeMap<usize, WellLabel>,
}

impl LabelTable {
    /// Parse the text of a label file. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, ConvertError> {
        let mut labels = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let columns: Vec<&str> = line.split(SEPARATOR).collect();
            if columns.len() <= REPORTER_COLUMN {
                return Err(ConvertError::Config(format!(
                    "label line {} has {} columns, at least {} required",
                    number + 1,
                    columns.len(),
                    REPORTER_COLUMN + 1
                )));
            }
            let index: usize = columns[0].trim().parse().map_err(|_| {
                ConvertError::Config(format!(
                    "label line {} starts with '{}', not a well index",
                    number + 1,
                    columns[0]
                ))
            })?;
            labels.insert(index, WellLabel::from_columns(&columns));
        }
        debug!("Parsed {} well labels", labels.len());
        Ok(Self { labels })
    }

    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        Self::parse(&read_text(path)?)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WellLabel> {
        self.labels.get(&index)
    }

    /// Rewrite the label words of an output name.
    ///
    /// Names without a `W<n>` component are returned unchanged. A well number
    /// with no entry in the table is a configuration error.
    pub fn rewrite(&self, name: &str) -> Result<String, ConvertError> {
        let Some(well) = find_well(name) else {
            return Ok(name.to_string());
        };
        let label = self.get(well.number).ok_or_else(|| {
            ConvertError::Config(format!(
                "well W{} of '{}' has no entry in the label table",
                well.number, name
            ))
        })?;
        Ok(name
            .replace("platename", well.plate)
            .replace("reporter", &label.reporter)
            .replace("symbol", &label.symbol))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Well<'a> {
    number: usize,
    /// Path component holding the well component.
    plate: &'a str,
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Last `W<digits>` that directly follows a path separator.
fn find_well(name: &str) -> Option<Well<'_>> {
    let bytes = name.as_bytes();
    let mut found = None;
    for (i, c) in name.char_indices() {
        if !is_separator(c) || bytes.get(i + 1) != Some(&b'W') {
            continue;
        }
        let digits_start = i + 2;
        let digits_end = name[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(name.len(), |n| digits_start + n);
        if let Ok(number) = name[digits_start..digits_end].parse() {
            let plate_start = name[..i].rfind(is_separator).map_or(0, |s| s + 1);
            found = Some(Well {
                number,
                plate: &name[plate_start..i],
            });
        }
    }
    found
}
