//! Output file naming.
//!
//! An output name may contain placeholders that split the conversion across
//! several files:
//!
//! | Placeholder | Replaced by |
//! |---|---|
//! | `%s` | series index |
//! | `%n` | series name (series index when unnamed) |
//! | `%z` | Z index |
//! | `%c` | channel index |
//! | `%t` | timepoint index |

use crate::format::PlaneCoords;

const SERIES_KEYS: &[&str] = &["%s", "%n"];
const PLANE_KEYS: &[&str] = &["%z", "%c", "%t"];

/// Renders output file names from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNamer {
    template: String,
}

impl OutputNamer {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether each series gets its own file.
    pub fn splits_series(&self) -> bool {
        SERIES_KEYS.iter().any(|key| self.template.contains(key))
    }

    /// Whether planes of one series are split across files.
    pub fn splits_planes(&self) -> bool {
        PLANE_KEYS.iter().any(|key| self.template.contains(key))
    }

    /// File name for one plane.
    pub fn render(&self, series: usize, series_name: Option<&str>, coords: PlaneCoords) -> String {
        let series_index = series.to_string();
        self.template
            .replace("%s", &series_index)
            .replace("%n", series_name.unwrap_or(&series_index))
            .replace("%z", &coords.z.to_string())
            .replace("%c", &coords.c.to_string())
            .replace("%t", &coords.t.to_string())
    }
}

/// Insert `suffix` between the stem and the extension of a file name.
///
/// `out/img.png` with suffix `_3` becomes `out/img_3.png`. Dots in directory
/// names are left alone.
pub fn insert_suffix(path: &str, suffix: &str) -> String {
    let name_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}{}{}", &path[..dot], suffix, &path[dot..])
        }
        _ => format!("{}{}", path, suffix),
    }
}

/// Output name of plane `plane` for writers that hold one plane per file.
pub fn plane_file(path: &str, plane: usize) -> String {
    insert_suffix(path, &format!("_{}", plane))
}

/// Output name of series `series` when the template does not name series.
pub fn series_file(path: &str, series: usize) -> String {
    insert_suffix(path, &format!("_s{}", series))
}
