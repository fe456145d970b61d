//! Grammars of the PerkinElmer sidecar files.
//!
//! Each parser feeds key/value pairs into [`ParsedMetadata::parse_key_value`],
//! which records every pair in the original-metadata table and interprets the
//! keys the reader needs. Unparseable values are logged and skipped.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

/// Date layout of `Start Time:` and `Finish Time:` values.
pub const DATE_FORMAT: &str = "%H:%M:%S (%m/%d/%Y)";

/// Tags the `.htm` file is split on.
const HTML_TAGS: &[&str] = &[
    "<p>", "</p>", "<br>", "<hr>", "<b>", "</b>", "<HTML>", "<HEAD>", "</HTML>", "</HEAD>",
    "<h1>", "</h1>", "<HR>", "</body>",
];

/// Positional keys of the `.tim` file.
const TIM_KEYS: &[&str] = &[
    "Number of Wavelengths/Timepoints",
    "Zero 1",
    "Zero 2",
    "Number of slices",
    "Extra int",
    "Calibration Unit",
    "Pixel Size Y",
    "Pixel Size X",
    "Image Width",
    "Image Length",
    "Origin X",
    "SubfileType X",
    "Dimension Label X",
    "Origin Y",
    "SubfileType Y",
    "Dimension Label Y",
    "Origin Z",
    "SubfileType Z",
    "Dimension Label Z",
];

/// Positional keys of the `.csv` file, assigned to the non-skipped slots.
const CSV_KEYS: &[&str] = &["Calibration Unit", "Pixel Size X", "Pixel Size Y", "Z slice space"];

/// Dimension counts declared in the free-text experiment details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclaredCounts {
    pub size_c: Option<usize>,
    pub size_t: Option<usize>,
    pub size_z: Option<usize>,
}

/// Everything collected from the sidecar files of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMetadata {
    pub size_x: Option<u32>,
    pub size_y: Option<u32>,
    pub size_z: Option<usize>,
    pub bits_per_pixel: Option<u32>,
    pub details: Option<String>,
    pub slice_space: Option<String>,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub start_time: Option<String>,
    pub finish_time: Option<String>,
    pub origin_x: f64,
    pub origin_y: f64,
    pub origin_z: f64,
    /// Exposure per channel, in seconds.
    pub exposure_times: Vec<f64>,
    pub z_positions: Vec<f64>,
    pub emission_wavelengths: Vec<i64>,
    pub excitation_wavelengths: Vec<i64>,
    /// Every key/value pair seen, in key order.
    pub original: BTreeMap<String, String>,
}

impl Default for ParsedMetadata {
    fn default() -> Self {
        Self {
            size_x: None,
            size_y: None,
            size_z: None,
            bits_per_pixel: None,
            details: None,
            slice_space: None,
            pixel_size_x: 1.0,
            pixel_size_y: 1.0,
            start_time: None,
            finish_time: None,
            origin_x: 0.0,
            origin_y: 0.0,
            origin_z: 0.0,
            exposure_times: Vec::new(),
            z_positions: Vec::new(),
            emission_wavelengths: Vec::new(),
            excitation_wavelengths: Vec::new(),
            original: BTreeMap::new(),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!("Skipping unparseable value {:?} for {:?}", value, key);
            None
        }
    }
}

impl ParsedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair and interpret the keys the reader understands.
    pub fn parse_key_value(&mut self, key: &str, value: &str) {
        self.original.insert(key.to_string(), value.to_string());

        match key {
            "Image Width" => self.size_x = parsed(key, value).or(self.size_x),
            "Image Length" => self.size_y = parsed(key, value).or(self.size_y),
            "Number of slices" => self.size_z = parsed(key, value).or(self.size_z),
            "Experiment details:" => self.details = Some(value.to_string()),
            "Z slice space" => self.slice_space = Some(value.to_string()),
            "Pixel Size X" => {
                if let Some(v) = parsed(key, value) {
                    self.pixel_size_x = v;
                }
            }
            "Pixel Size Y" => {
                if let Some(v) = parsed(key, value) {
                    self.pixel_size_y = v;
                }
            }
            "Finish Time:" => self.finish_time = Some(value.to_string()),
            "Start Time:" => self.start_time = Some(value.to_string()),
            "Origin X" => {
                if let Some(v) = parsed(key, value) {
                    self.origin_x = v;
                }
            }
            "Origin Y" => {
                if let Some(v) = parsed(key, value) {
                    self.origin_y = v;
                }
            }
            "Origin Z" => {
                if let Some(v) = parsed(key, value) {
                    self.origin_z = v;
                }
            }
            "SubfileType X" => self.bits_per_pixel = parsed(key, value).or(self.bits_per_pixel),
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // .tim
    // -------------------------------------------------------------------------

    /// Positional tokens mapped onto [`TIM_KEYS`].
    ///
    /// A `um` token resynchronises to `Calibration Unit`; the two zero slots
    /// only consume literal `0` tokens and the extra-int slot only integers.
    pub fn parse_tim(&mut self, text: &str) {
        let mut slot = 0;
        for token in text.split_whitespace() {
            if slot >= TIM_KEYS.len() {
                break;
            }
            if token == "um" {
                slot = 5;
            }
            while (slot == 1 || slot == 2) && token != "0" {
                slot += 1;
            }
            if slot == 4 && token.parse::<i32>().is_err() {
                slot += 1;
            }
            self.parse_key_value(TIM_KEYS[slot], token);
            slot += 1;
        }
    }

    // -------------------------------------------------------------------------
    // .csv
    // -------------------------------------------------------------------------

    /// Fixed positions are skipped, the next four tokens fill [`CSV_KEYS`]
    /// and the rest are `(key1 key2 value)` triples.
    pub fn parse_csv(&mut self, text: &str) {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut position = 0;
        let mut assigned = 0;
        let mut j = 0;

        while j < tokens.len() {
            let skipped = position < 7
                || (8..12).contains(&position)
                || (13..18).contains(&position)
                || (19..22).contains(&position);

            if skipped {
                j += 1;
            } else if assigned < CSV_KEYS.len() {
                self.parse_key_value(CSV_KEYS[assigned], tokens[j]);
                assigned += 1;
                j += 1;
            } else if j + 2 < tokens.len() {
                let key = format!("{}{}", tokens[j], tokens[j + 1]);
                self.parse_key_value(&key, tokens[j + 2]);
                j += 3;
            } else {
                debug!("Ignoring {} trailing .csv token(s)", tokens.len() - j);
                break;
            }
            position += 1;
        }
    }

    // -------------------------------------------------------------------------
    // .zpo
    // -------------------------------------------------------------------------

    pub fn parse_zpo(&mut self, text: &str) {
        for (n, token) in text.split_whitespace().enumerate() {
            self.original
                .insert(format!("Z slice #{} position", n), token.to_string());
        }
    }

    // -------------------------------------------------------------------------
    // .htm
    // -------------------------------------------------------------------------

    /// Key/value pairs between HTML tags, plus camera lines and Z positions.
    pub fn parse_htm(&mut self, text: &str) {
        let tokens: Vec<String> = split_html(text)
            .into_iter()
            .map(|t| if t.contains('<') { String::new() } else { t })
            .collect();

        let mut j = 0;
        while j + 1 < tokens.len() {
            let token = &tokens[j];
            if token.contains("Exposure") {
                self.parse_camera_line(token);
                j += 1;
                continue;
            }

            if tokens[j + 1].trim() == "Slice Z positions" {
                for position in &tokens[j + 2..] {
                    let position = position.trim();
                    if position.is_empty() {
                        continue;
                    }
                    if let Ok(z) = position.parse::<f64>() {
                        self.z_positions.push(z);
                    }
                }
            } else if !token.trim().is_empty() {
                let key = token.trim().to_string();
                let value = tokens[j + 1].trim().to_string();
                self.parse_key_value(&key, &value);
            }
            j += 2;
        }
    }

    /// A camera line carries the exposure in milliseconds and optionally the
    /// emission and excitation wavelengths, e.g.
    /// `Camera Data 1: Exposure 250, Filter (520/40 nm) Excitation 488/10nm`.
    fn parse_camera_line(&mut self, line: &str) {
        let label = line.chars().nth(13).map(String::from).unwrap_or_default();
        self.original
            .insert(format!("Camera Data {}", label), line.to_string());

        let Some(exposure_at) = line.find("Exposure") else {
            return;
        };
        let tail = line.get(exposure_at + 9..).unwrap_or_default();
        let exposure = tail.split(' ').next().unwrap_or_default();
        let exposure = exposure.trim().trim_end_matches(',');
        if let Some(ms) = parsed::<f64>("Exposure", exposure) {
            self.exposure_times.push(ms / 1000.0);
        }

        let Some(em_nm) = line.find("nm") else {
            return;
        };
        let paren = line[..em_nm].rfind('(').map_or(0, |p| p + 1);
        let slash = line[..em_nm].rfind('/').filter(|s| *s >= paren).unwrap_or(em_nm);
        if let Some(em) = parsed::<i64>("Emission", line[paren..slash].trim()) {
            self.emission_wavelengths.push(em);
        }

        // The excitation search skips one character past the emission "nm".
        let after_em = em_nm + 2;
        let search_from = line[after_em..]
            .char_indices()
            .nth(1)
            .map_or(line.len(), |(i, _)| after_em + i);
        let Some(ex_nm) = line[search_from..].find("nm").map(|i| search_from + i) else {
            return;
        };
        let space = line[..ex_nm].rfind(' ').map_or(0, |p| p + 1);
        let slash = line[..ex_nm].rfind('/').filter(|s| *s >= space).unwrap_or(ex_nm);
        if let Some(ex) = parsed::<i64>("Excitation", line[space..slash].trim()) {
            self.excitation_wavelengths.push(ex);
        }
    }

    // -------------------------------------------------------------------------
    // Derived values
    // -------------------------------------------------------------------------

    /// Counts declared in the experiment details.
    ///
    /// `Wavelengths`, `Frames` and `Slices` each take the number right before
    /// them (`2 Wavelengths 10 Frames 5 Slices`).
    pub fn declared_counts(&self) -> DeclaredCounts {
        let mut counts = DeclaredCounts::default();
        let Some(details) = &self.details else {
            return counts;
        };

        let mut n = 0usize;
        for token in details.split_whitespace() {
            match token {
                "Wavelengths" => counts.size_c = Some(n),
                "Frames" => counts.size_t = Some(n),
                "Slices" => counts.size_z = Some(n),
                _ => {}
            }
            n = token.parse().unwrap_or(0);
        }
        counts
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        parse_date(self.start_time.as_deref()?)
    }

    pub fn finish(&self) -> Option<NaiveDateTime> {
        parse_date(self.finish_time.as_deref()?)
    }
}

/// Parse a `HH:mm:ss (MM/dd/yyyy)` timestamp.
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(value.trim(), DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!("Unparseable timestamp {:?}: {}", value, e);
            None
        }
    }
}

/// Split text on the fixed tag set. Trailing empty pieces are dropped.
fn split_html(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(tag) = HTML_TAGS.iter().find(|tag| rest.starts_with(**tag)) {
            pieces.push(std::mem::take(&mut current));
            rest = &rest[tag.len()..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            current.push(c);
        }
        rest = chars.as_str();
    }
    pieces.push(current);

    while pieces.last().is_some_and(|p| p.is_empty()) {
        pieces.pop();
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Key/value
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_key_value_records_everything() {
        let mut meta = ParsedMetadata::new();
        meta.parse_key_value("Image Width", "640");
        meta.parse_key_value("Pixel Size X", "0.25");
        meta.parse_key_value("Lens", "40x");

        assert_eq!(meta.size_x, Some(640));
        assert_eq!(meta.pixel_size_x, 0.25);
        assert_eq!(meta.original.get("Lens").map(String::as_str), Some("40x"));
        assert_eq!(meta.original.len(), 3);
    }

    #[test]
    fn test_parse_key_value_bad_number_skipped() {
        let mut meta = ParsedMetadata::new();
        meta.parse_key_value("Image Width", "640");
        meta.parse_key_value("Image Width", "wide");
        meta.parse_key_value("Pixel Size Y", "n/a");

        assert_eq!(meta.size_x, Some(640));
        assert_eq!(meta.pixel_size_y, 1.0);
        assert_eq!(meta.original["Image Width"], "wide");
    }

    // -------------------------------------------------------------------------
    // .tim
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_tim() {
        let mut meta = ParsedMetadata::new();
        meta.parse_tim("3 0 0 5 7 um 0.5 0.25 64 48 0 16 X");

        assert_eq!(meta.original["Number of Wavelengths/Timepoints"], "3");
        assert_eq!(meta.size_z, Some(5));
        assert_eq!(meta.original["Extra int"], "7");
        assert_eq!(meta.original["Calibration Unit"], "um");
        assert_eq!(meta.pixel_size_y, 0.5);
        assert_eq!(meta.pixel_size_x, 0.25);
        assert_eq!(meta.size_x, Some(64));
        assert_eq!(meta.size_y, Some(48));
        assert_eq!(meta.bits_per_pixel, Some(16));
    }

    #[test]
    fn test_parse_tim_skips_missing_zeros() {
        let mut meta = ParsedMetadata::new();
        // No zero slots and no extra int: "4" lands on the slice count.
        meta.parse_tim("2 4 um 1.0 1.0 32 16");

        assert_eq!(meta.size_z, Some(4));
        assert!(!meta.original.contains_key("Zero 1"));
        assert_eq!(meta.size_x, Some(32));
        assert_eq!(meta.size_y, Some(16));
    }

    // -------------------------------------------------------------------------
    // .csv
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_csv() {
        // 7 skipped, unit, 4 skipped, size x, 5 skipped, size y, 3 skipped,
        // slice space, then one triple.
        let mut tokens: Vec<String> = Vec::new();
        tokens.extend((0..7).map(|i| format!("s{}", i)));
        tokens.push("um".into());
        tokens.extend((0..4).map(|i| format!("s{}", i)));
        tokens.push("0.3".into());
        tokens.extend((0..5).map(|i| format!("s{}", i)));
        tokens.push("0.4".into());
        tokens.extend((0..3).map(|i| format!("s{}", i)));
        tokens.push("1.5".into());
        tokens.extend(["Gain".into(), "Level".into(), "2".into()]);

        let mut meta = ParsedMetadata::new();
        meta.parse_csv(&tokens.join(" "));

        assert_eq!(meta.original["Calibration Unit"], "um");
        assert_eq!(meta.pixel_size_x, 0.3);
        assert_eq!(meta.pixel_size_y, 0.4);
        assert_eq!(meta.slice_space.as_deref(), Some("1.5"));
        assert_eq!(meta.original["GainLevel"], "2");
    }

    #[test]
    fn test_parse_zpo() {
        let mut meta = ParsedMetadata::new();
        meta.parse_zpo("0.0\n1.5\n3.0\n");
        assert_eq!(meta.original["Z slice #2 position"], "3.0");
    }

    // -------------------------------------------------------------------------
    // .htm
    // -------------------------------------------------------------------------

    #[test]
    fn test_split_html() {
        let pieces = split_html("<HTML>a<p>b</p><br>");
        assert_eq!(pieces, vec!["", "a", "b"]);
    }

    #[test]
    fn test_parse_htm_key_values() {
        let html = "<HTML><p>Image Width</p>64<p>Image Length</p>48\
                    <p>Experiment details:</p>2 Wavelengths 3 Frames 4 Slices</HTML>";
        let mut meta = ParsedMetadata::new();
        meta.parse_htm(html);

        assert_eq!(meta.size_x, Some(64));
        assert_eq!(meta.size_y, Some(48));
        assert_eq!(
            meta.declared_counts(),
            DeclaredCounts {
                size_c: Some(2),
                size_t: Some(3),
                size_z: Some(4),
            }
        );
    }

    #[test]
    fn test_parse_htm_camera_and_positions() {
        let html = "<HTML><p>Camera Data 1: Exposure 250, Filter (520/40 nm) Excitation 488/10nm\
                    <p>Lens</p>40x<p></p>Slice Z positions<p>0.5<p>1.0<p>1.5</HTML>";
        let mut meta = ParsedMetadata::new();
        meta.parse_htm(html);

        assert_eq!(meta.exposure_times, vec![0.25]);
        assert_eq!(meta.emission_wavelengths, vec![520]);
        assert_eq!(meta.excitation_wavelengths, vec![488]);
        assert_eq!(meta.original["Lens"], "40x");
        assert_eq!(meta.z_positions, vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_camera_line_with_multibyte_units() {
        let mut meta = ParsedMetadata::new();
        meta.parse_camera_line("Camera Data 1: Exposure 250, Filter (520nmµ) Excitation 488nm");
        assert_eq!(meta.emission_wavelengths, vec![520]);
        assert_eq!(meta.excitation_wavelengths, vec![488]);

        let mut meta = ParsedMetadata::new();
        meta.parse_camera_line("Camera Data 1: Exposure 250, Filter 520nmµ Excitation 488nm");
        assert_eq!(meta.exposure_times, vec![0.25]);
        assert!(meta.emission_wavelengths.is_empty());
        assert_eq!(meta.excitation_wavelengths, vec![488]);

        let mut meta = ParsedMetadata::new();
        meta.parse_camera_line("Camera Data 2: Exposure 10, Filter (µm/nm");
        assert_eq!(meta.exposure_times, vec![0.01]);
        assert!(meta.excitation_wavelengths.is_empty());
    }

    #[test]
    fn test_declared_counts_absent() {
        assert_eq!(ParsedMetadata::new().declared_counts(), DeclaredCounts::default());
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("14:05:09 (03/21/2008)").unwrap();
        assert_eq!(date.to_string(), "2008-03-21 14:05:09");
        assert!(parse_date("yesterday").is_none());
    }
}
