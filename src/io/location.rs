//! Path and directory helpers shared by the format readers.
//!
//! Dataset readers reason about file names a lot: suffix tests, stems,
//! hexadecimal extensions and sibling listings. These helpers keep that logic
//! in one place so every reader applies the same rules.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IoError;

/// Check whether `name` ends with `.suffix` for any of the given suffixes.
///
/// The comparison is case-insensitive.
pub fn check_suffix(name: &str, suffixes: &[&str]) -> bool {
    let lower = name.to_lowercase();
    suffixes.iter().any(|suffix| {
        let suffix = suffix.to_lowercase();
        lower.len() > suffix.len()
            && lower.ends_with(&suffix)
            && lower.as_bytes()[lower.len() - suffix.len() - 1] == b'.'
    })
}

/// Text after the last `.` of the file name, if any.
pub fn extension(name: &str) -> Option<&str> {
    let file_name = file_name_of(name);
    file_name.rfind('.').map(|dot| &file_name[dot + 1..])
}

/// File name without its last extension.
pub fn stem(name: &str) -> &str {
    let file_name = file_name_of(name);
    match file_name.rfind('.') {
        Some(dot) => &file_name[..dot],
        None => file_name,
    }
}

/// Parse the extension as a hexadecimal ordinal (`r01` is not, `1a` is).
pub fn hex_suffix(name: &str) -> Option<u64> {
    let ext = extension(name)?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(ext, 16).ok()
}

/// Final path component as a string slice.
fn file_name_of(name: &str) -> &str {
    match name.rfind(['/', '\\']) {
        Some(sep) => &name[sep + 1..],
        None => name,
    }
}

/// List the non-hidden entries of a directory, sorted by name.
pub fn list_dir(dir: &Path) -> Result<Vec<String>, IoError> {
    let entries = fs::read_dir(dir).map_err(|e| IoError::from_std(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IoError::from_std(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Read a whole text file, replacing invalid UTF-8 sequences.
pub fn read_text(path: &Path) -> Result<String, IoError> {
    let bytes = fs::read(path).map_err(|e| IoError::from_std(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Absolute form of `path`, falling back to the path itself.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Parent directory of `path`, or `.` for bare file names.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
