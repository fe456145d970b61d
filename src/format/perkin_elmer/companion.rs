//! Companion file discovery, grouping and ordering.
//!
//! A PerkinElmer dataset is a directory of files sharing a name prefix: one
//! describing `.htm` file, optional `.cfg/.ano/.rec/.tim/.csv/.zpo` sidecars
//! and the pixel files. Pixel files are either TIFFs or raw records whose
//! extension is a hexadecimal plane ordinal (`exp_1.1`, `exp_1.a`, ...).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::io::{absolute, check_suffix, extension, hex_suffix, list_dir, parent_dir, stem};
use crate::error::IoError;

use crate::format::tiff::TIFF_SUFFIXES;

/// Suffix of the describing file.
pub const HTM_SUFFIX: &str = "htm";

/// Every suffix that belongs to the format, besides hexadecimal ordinals.
pub const PERKIN_ELMER_SUFFIXES: &[&str] =
    &["ano", "cfg", "csv", "htm", "rec", "tim", "zpo", "tif", "tiff"];

/// Whether a file name denotes pixel data: a hexadecimal extension or TIFF.
pub fn is_pixel_file(name: &str) -> bool {
    hex_suffix(name).is_some() || check_suffix(name, TIFF_SUFFIXES)
}

// =============================================================================
// Describing file lookup
// =============================================================================

/// Locate the `.htm` file that describes the dataset `path` belongs to.
///
/// The extension is stripped, and for pixel files also the trailing `_`
/// segment (`exp_3.1` belongs to `exp`). Then `<prefix>.htm` and
/// `<prefix>.HTM` are tried, dropping one `_` segment at a time until a match
/// is found or no `_` is left.
pub fn find_describing_file(path: &Path) -> Option<PathBuf> {
    let path = absolute(path);
    let name = path.file_name()?.to_string_lossy().into_owned();
    if check_suffix(&name, &[HTM_SUFFIX]) {
        return path.exists().then_some(path);
    }

    let dir = parent_dir(&path);
    let mut prefix = stem(&name).to_string();
    if is_pixel_file(&name) {
        if let Some(underscore) = prefix.rfind('_') {
            prefix.truncate(underscore);
        }
    }

    loop {
        for suffix in ["htm", "HTM"] {
            let candidate = dir.join(format!("{}.{}", prefix, suffix));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        match prefix.rfind('_') {
            Some(underscore) => prefix.truncate(underscore),
            None => return None,
        }
    }
}

/// The first `.htm` file in the directory of `path`, or `path` itself.
///
/// Datasets are always opened through their describing file.
pub fn retarget_to_describing_file(path: &Path) -> Result<PathBuf, IoError> {
    let path = absolute(path);
    let name = path.display().to_string();
    if check_suffix(&name, &[HTM_SUFFIX]) {
        return Ok(path);
    }

    let dir = parent_dir(&path);
    let found = list_dir(&dir)?
        .into_iter()
        .find(|file| check_suffix(file, &[HTM_SUFFIX]));
    Ok(match found {
        Some(file) => dir.join(file),
        None => path,
    })
}

// =============================================================================
// Grouping
// =============================================================================

/// Files of one dataset, bucketed by role.
///
/// Sidecar roles keep the first matching file in directory order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanionFiles {
    pub cfg: Option<String>,
    pub ano: Option<String>,
    pub rec: Option<String>,
    pub tim: Option<String>,
    pub csv: Option<String>,
    pub zpo: Option<String>,
    pub htm: Option<String>,
    /// Pixel files in directory order.
    pub pixels: Vec<String>,
    /// Set when at least one pixel file is a raw, hex-numbered record.
    pub raw: bool,
}

impl CompanionFiles {
    /// Partition a directory listing into roles.
    ///
    /// A file takes part when its stem starts with `entry_stem`, is itself a
    /// prefix of `entry_stem`, or starts with the stem of the previously
    /// matched file. Files without an extension are ignored.
    pub fn collect(listing: &[String], entry_stem: &str) -> Self {
        let mut group = CompanionFiles::default();
        let mut previous: Option<&str> = None;

        for name in listing {
            let Some(dot) = name.rfind('.') else {
                continue;
            };
            let file_stem = &name[..dot];

            let related = file_stem.starts_with(entry_stem)
                || entry_stem.starts_with(file_stem)
                || previous.is_some_and(|p| file_stem.starts_with(p));
            if !related {
                continue;
            }
            previous = Some(file_stem);

            let slots: [(&str, &mut Option<String>); 7] = [
                ("cfg", &mut group.cfg),
                ("ano", &mut group.ano),
                ("rec", &mut group.rec),
                ("tim", &mut group.tim),
                ("csv", &mut group.csv),
                ("zpo", &mut group.zpo),
                ("htm", &mut group.htm),
            ];
            for (suffix, slot) in slots {
                if slot.is_none() && check_suffix(name, &[suffix]) {
                    *slot = Some(name.clone());
                }
            }

            if check_suffix(name, TIFF_SUFFIXES) {
                group.pixels.push(name.clone());
            } else if hex_suffix(name).is_some() {
                group.raw = true;
                group.pixels.push(name.clone());
            }
        }

        group
    }

    /// Sidecar files in the order they are reported as used files.
    pub fn sidecars(&self) -> impl Iterator<Item = &String> {
        [
            &self.cfg, &self.ano, &self.rec, &self.tim, &self.csv, &self.zpo, &self.htm,
        ]
        .into_iter()
        .flatten()
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Re-merge pixel files written by several interleaved extension families.
///
/// With `n` distinct extensions, every run of `n` consecutive files in
/// directory order is sorted by hexadecimal extension, so the result is
/// plane-major and channel-minor. When the families have unequal counts, the
/// trailing run is shorter and is sorted on its own.
pub fn merge_extension_families(files: Vec<String>) -> Vec<String> {
    let families: HashSet<&str> = files.iter().filter_map(|f| extension(f)).collect();
    let family_count = families.len().max(1);
    if family_count == 1 {
        return files;
    }

    let mut merged = Vec::with_capacity(files.len());
    for run in files.chunks(family_count) {
        let mut run = run.to_vec();
        run.sort_by_key(|f| hex_suffix(f));
        merged.extend(run);
    }
    merged
}

/// Canonical order of pixel files.
///
/// TIFF payloads sort by name. Raw records sort by the name before the
/// extension, then by the hexadecimal value of the extension, so `x.a` comes
/// after `x.9` and before `x.10`.
pub fn sort_pixel_files(files: &mut [String], raw: bool) {
    if raw {
        files.sort_by(|a, b| compare_hex_ordinal(a, b));
    } else {
        files.sort();
    }
}

fn split_ordinal(name: &str) -> (&str, Option<u64>) {
    match name.rfind('.') {
        Some(dot) => (&name[..dot], hex_suffix(name)),
        None => (name, None),
    }
}

/// Compare by prefix, then by hexadecimal extension.
pub fn compare_hex_ordinal(a: &str, b: &str) -> Ordering {
    let (prefix_a, ordinal_a) = split_ordinal(a);
    let (prefix_b, ordinal_b) = split_ordinal(b);
    prefix_a.cmp(prefix_b).then(ordinal_a.cmp(&ordinal_b))
}

/// The Z token of a pixel file: the text between the last `_` and the last
/// `.` (`exp_12.3` → `12`).
pub fn z_token(name: &str) -> &str {
    let dot = name.rfind('.').unwrap_or(name.len());
    let start = name[..dot].rfind('_').map_or(0, |u| u + 1);
    &name[start..dot]
}

/// Order used when dropping extra files: prefix before the last `_`, then the
/// numeric Z token, then the hexadecimal extension.
pub fn compare_z_sections(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let prefix = |s: &str| -> String {
        let underscore = s.rfind('_').unwrap_or(0);
        s[..underscore].to_string()
    };
    let by_prefix = prefix(a).cmp(&prefix(b));
    if by_prefix != Ordering::Equal {
        return by_prefix;
    }

    let by_z = match (z_token(a).parse::<u64>(), z_token(b).parse::<u64>()) {
        (Ok(za), Ok(zb)) => za.cmp(&zb),
        _ => Ordering::Equal,
    };
    if by_z != Ordering::Equal {
        return by_z;
    }

    match (hex_suffix(a), hex_suffix(b)) {
        (Some(ea), Some(eb)) => ea.cmp(&eb),
        _ => Ordering::Equal,
    }
}
