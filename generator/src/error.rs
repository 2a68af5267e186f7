//! Error types for the inkgen generation pipeline.
//!
//! Errors are split by the layer that raises them:
//!
//! - [`DatasetError`] - CSV loading errors (fatal)
//! - [`RuleError`] - extra-vars configuration errors (fatal)
//! - [`TemplateError`] - template reading and XML parsing errors
//! - [`ExportError`] - exporter collaborator failures
//! - [`RowError`] - problems confined to a single row
//! - [`GenerateError`] - top-level errors that abort a run
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Dataset Errors
// =============================================================================

/// Errors while loading the CSV dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The data file could not be opened or read.
    #[error("Cannot read \"{}\": {}", .path.display(), .source)]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Named columns were requested but the file holds no header.
    #[error("Data file \"{}\" contains no data", .path.display())]
    Empty { path: PathBuf },

    /// A record could not be parsed.
    #[error("Invalid CSV in \"{}\": {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

// =============================================================================
// Extra-vars Rule Errors
// =============================================================================

/// Errors in the extra replacement rules. Both abort the whole run.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule is not of the form `literal=>column`.
    #[error("Unrecognized replacement string \"{0}\"")]
    MalformedRule(String),

    /// A rule points at a column the dataset does not have.
    #[error("Wrong column \"{column}\" in replacement rule \"{literal}=>{column}\"")]
    UnknownColumn { literal: String, column: String },
}

// =============================================================================
// Template Errors
// =============================================================================

/// Errors while reading or parsing the SVG template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template file could not be read.
    #[error("Cannot read template \"{}\": {}", .path.display(), .source)]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rendered text is not well-formed XML.
    #[error("Invalid SVG at byte {position}: {message}")]
    Parse { position: u64, message: String },
}

// =============================================================================
// Exporter Errors
// =============================================================================

/// Failures reported by an [`crate::export::Exporter`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// The converter program could not be started.
    #[error("Cannot run \"{program}\": {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The converter exited with a failure status.
    #[error("\"{program}\" exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The converter cannot produce this format.
    #[error("\"{program}\" cannot export {format}")]
    Unsupported { program: String, format: String },

    /// The converter reported success but wrote nothing.
    #[error("\"{}\" did not create \"{}\"", .program, .path.display())]
    MissingOutput { program: String, path: PathBuf },

    /// Filesystem error while exporting.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Row Errors
// =============================================================================

/// Where a per-row unknown column was referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSite {
    /// An `%IF_…%` / `%UNLESS_…%` marker in a layer label.
    Marker,
    /// A `%VAR_…%` token in the output pattern.
    OutputPattern,
}

impl std::fmt::Display for ColumnSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnSite::Marker => write!(f, "layer label"),
            ColumnSite::OutputPattern => write!(f, "output pattern"),
        }
    }
}

/// An error confined to one dataset row. The run carries on.
#[derive(Debug, Error)]
pub enum RowError {
    /// A marker or the output pattern names a missing column.
    #[error("Column \"{column}\" not in the csv file (referenced by {site})")]
    UnknownColumn { column: String, site: ColumnSite },

    /// The rendered document is not valid XML.
    #[error("Rendered template is invalid: {0}")]
    Template(#[from] TemplateError),

    /// The temporary SVG could not be written.
    #[error("Cannot open \"{}\" for writing: {}", .path.display(), .source)]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination directory could not be created.
    #[error("Cannot create directory \"{}\": {}", .path.display(), .source)]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving the SVG to its destination failed.
    #[error("Cannot create \"{}\": {}", .path.display(), .source)]
    Move {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An earlier row of the same run already produced this file.
    #[error("\"{}\" was already written by row {}", .path.display(), .row + 1)]
    DuplicateOutput { path: PathBuf, row: usize },

    /// The exporter collaborator failed.
    #[error("Export to \"{}\" failed: {}", .path.display(), .source)]
    Export {
        path: PathBuf,
        #[source]
        source: ExportError,
    },
}

impl RowError {
    /// Unknown columns are reported but do not fail the row.
    pub fn is_warning(&self) -> bool {
        matches!(self, RowError::UnknownColumn { .. })
    }
}

// =============================================================================
// Generate Errors (top-level)
// =============================================================================

/// Errors that abort a whole generation run.
///
/// This is the error type returned by [`crate::pipeline::Generator::run`].
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Dataset loading error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Extra-vars configuration error.
    #[error("Configuration error: {0}")]
    Rule(#[from] RuleError),

    /// Template could not be read.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Unsupported output format name.
    #[error("Unsupported output format \"{0}\"")]
    InvalidFormat(String),

    /// The temporary working directory could not be created or removed.
    #[error("Working directory error: {0}")]
    WorkDir(#[source] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Result type for rule parsing and expansion.
pub type RuleResult<T> = Result<T, RuleError>;

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for exporter operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for a whole run.
pub type GenerateResult<T> = Result<T, GenerateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // RuleError -> GenerateError
        let rule_err = RuleError::MalformedRule("name=name".into());
        let err: GenerateError = rule_err.into();
        assert!(err.to_string().contains("name=name"));

        // DatasetError -> GenerateError
        let dataset_err = DatasetError::Empty { path: "data.csv".into() };
        let err: GenerateError = dataset_err.into();
        assert!(err.to_string().contains("contains no data"));
    }

    #[test]
    fn test_unknown_column_names_the_column() {
        let err = RowError::UnknownColumn {
            column: "phone".into(),
            site: ColumnSite::OutputPattern,
        };
        let msg = err.to_string();
        assert!(msg.contains("phone"));
        assert!(msg.contains("output pattern"));
        assert!(err.is_warning());
    }

    #[test]
    fn test_rule_unknown_column_format() {
        let err = RuleError::UnknownColumn {
            literal: "Jane Doe".into(),
            column: "name".into(),
        };
        assert_eq!(
            err.to_string(),
            "Wrong column \"name\" in replacement rule \"Jane Doe=>name\""
        );
    }
}
