//! Output formats and output path construction.
//!
//! The output pattern is an ordinary path containing `%VAR_<column>%` tokens,
//! for example `~/badges/%VAR_team%/%VAR_name%.pdf`. Values of the columns it
//! mentions are made file-name safe first; other columns are left alone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::Entry;
use crate::template::expand_vars;

static VAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%VAR_([^%]*)%").expect("VAR token pattern is valid"));

/// Characters replaced by `_` in values used for file names
pub const FILENAME_BLACKLIST: &[char] = &['/', '\\', '#', '$', ':', '!', '<', '>', '?', ',', ' '];

// =============================================================================
// Output Format
// =============================================================================

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The template's own format; rendered files are moved, not converted
    Svg,
    Png,
    Pdf,
    Ps,
    Eps,
    Emf,
    Wmf,
    /// Not exported directly, downgraded to PNG
    Jpg,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 8] = [
        OutputFormat::Svg,
        OutputFormat::Png,
        OutputFormat::Pdf,
        OutputFormat::Ps,
        OutputFormat::Eps,
        OutputFormat::Emf,
        OutputFormat::Wmf,
        OutputFormat::Jpg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Ps => "ps",
            OutputFormat::Eps => "eps",
            OutputFormat::Emf => "emf",
            OutputFormat::Wmf => "wmf",
            OutputFormat::Jpg => "jpg",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "SVG, moved as rendered",
            OutputFormat::Png => "PNG bitmap, uses --dpi",
            OutputFormat::Pdf => "PDF document",
            OutputFormat::Ps => "PostScript",
            OutputFormat::Eps => "Encapsulated PostScript",
            OutputFormat::Emf => "Enhanced Metafile",
            OutputFormat::Wmf => "Windows Metafile",
            OutputFormat::Jpg => "JPEG, exported as PNG",
        }
    }

    /// SVG output needs no conversion.
    pub fn is_native(&self) -> bool {
        matches!(self, OutputFormat::Svg)
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, OutputFormat::Jpg)
    }

    /// Format actually handed to the exporter.
    pub fn effective(&self) -> OutputFormat {
        match self {
            OutputFormat::Jpg => OutputFormat::Png,
            other => *other,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower == "jpeg" {
            return Ok(OutputFormat::Jpg);
        }
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Swap a `.jpg`/`.jpeg` extension for the format really produced.
pub fn downgrade_path(path: &Path, format: OutputFormat) -> PathBuf {
    if !format.is_legacy() {
        return path.to_path_buf();
    }
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        path.with_extension(format.effective().as_str())
    } else {
        path.to_path_buf()
    }
}

// =============================================================================
// Path Building
// =============================================================================

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) if rest.as_os_str().is_empty() => home,
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Columns mentioned by `%VAR_…%` tokens, in pattern order.
pub fn referenced_columns(pattern: &str) -> Vec<String> {
    VAR_TOKEN
        .captures_iter(pattern)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replace characters not allowed in file names with `_`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if FILENAME_BLACKLIST.contains(&c) { '_' } else { c })
        .collect()
}

/// Copy of `entry` where only the columns used by `pattern` are sanitized.
///
/// Returns the columns the pattern mentions but the entry lacks.
pub fn sanitize_for_file(entry: &Entry, pattern: &str) -> (Entry, Vec<String>) {
    let mut sane = entry.clone();
    let mut unknown = Vec::new();

    for column in referenced_columns(pattern) {
        match sane.get_mut(&column) {
            Some(value) => *value = sanitize(value),
            None => {
                if !unknown.contains(&column) {
                    unknown.push(column);
                }
            }
        }
    }

    (sane, unknown)
}

/// Destination of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    pub path: PathBuf,
    /// Pattern columns missing from the entry; their tokens stay in the path
    pub unknown_columns: Vec<String>,
}

/// Expand the output pattern for one entry.
///
/// Sanitized values go through the same token pass as the template, so they
/// are XML-escaped too (`&` becomes `&amp;`).
pub fn build_output_path(pattern: &str, entry: &Entry) -> OutputPath {
    let (sane, unknown_columns) = sanitize_for_file(entry, pattern);
    let expanded = expand_vars(pattern, &sane);
    OutputPath {
        path: expand_home(Path::new(&expanded)),
        unknown_columns,
    }
}
