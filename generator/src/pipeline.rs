//! Batch generation: one exported file per dataset row.
//!
//! Each row goes through the same stages, strictly one row after the other:
//!
//! ```text
//! Loaded → Rendered → StructurallyFiltered → ArtifactWritten → PathComputed → Exported
//!                                                                          ↘ Failed
//! ```
//!
//! Configuration errors (bad extra-vars rules) abort the run before any file
//! is written. Anything else only affects the row it happened on and is
//! recorded in the [`BatchReport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use inkgen::pipeline::{generate, GenerateOptions};
//!
//! let options = GenerateOptions {
//!     data_file: "guests.csv".into(),
//!     output_pattern: "badges/%VAR_name%.pdf".into(),
//!     ..Default::default()
//! };
//! let report = generate("badge.svg".as_ref(), &options)?;
//! println!("{}", report.summary());
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tempfile::TempDir;
use uuid::Uuid;

use crate::dataset::{load_dataset, ColumnMode, Dataset, Entry};
use crate::error::{ColumnSite, GenerateError, GenerateResult, RowError, RuleResult};
use crate::export::{ExportRequest, Exporter, ExporterConfig};
use crate::logs::{
    log_error, log_error_indent, log_info, log_info_indent, log_success, log_warning,
    log_warning_indent,
};
use crate::output::{build_output_path, downgrade_path, OutputFormat};
use crate::preview::open_preview;
use crate::template::{structure, ExtraRules, Template};

/// Prefix of the per-run working directory
const WORK_DIR_PREFIX: &str = "ink-generator";

// =============================================================================
// Options
// =============================================================================

/// Options for a generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// CSV data file
    pub data_file: PathBuf,

    /// Address columns by header name or by index
    pub var_type: ColumnMode,

    /// Output format name (`pdf`, `png`, `svg`, …), case-insensitive
    pub format: String,

    /// Resolution for bitmap output
    pub dpi: f64,

    /// Output path with `%VAR_…%` tokens
    pub output_pattern: String,

    /// Extra replacements, `literal1=>column1|literal2=>column2`
    pub extra_vars: String,

    /// Open the first generated file when done
    pub preview: bool,

    /// Converter used for non-SVG formats
    pub exporter: ExporterConfig,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data.csv"),
            var_type: ColumnMode::Name,
            format: "pdf".to_string(),
            dpi: 96.0,
            output_pattern: "%VAR_name%.pdf".to_string(),
            extra_vars: String::new(),
            preview: false,
            exporter: ExporterConfig::default(),
        }
    }
}

impl GenerateOptions {
    /// Load options from a JSON job file. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn output_format(&self) -> GenerateResult<OutputFormat> {
        self.format
            .parse()
            .map_err(GenerateError::InvalidFormat)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Where a row got to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    Loaded,
    Rendered,
    StructurallyFiltered,
    ArtifactWritten,
    PathComputed,
    Exported,
    Failed,
}

/// Outcome of one row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    /// Zero-based row index in the dataset
    pub row: usize,
    pub stage: RowStage,
    pub destination: Option<PathBuf>,
    #[serde(serialize_with = "error_messages")]
    pub errors: Vec<RowError>,
}

fn error_messages<S: Serializer>(errors: &[RowError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}

impl RowOutcome {
    fn new(row: usize) -> Self {
        Self {
            row,
            stage: RowStage::Loaded,
            destination: None,
            errors: Vec::new(),
        }
    }

    fn warn(&mut self, error: RowError) {
        log_warning_indent(error.to_string(), 1);
        self.errors.push(error);
    }

    fn fail(mut self, error: RowError) -> Self {
        log_error_indent(error.to_string(), 1);
        self.errors.push(error);
        self.stage = RowStage::Failed;
        self
    }

    pub fn is_exported(&self) -> bool {
        self.stage == RowStage::Exported
    }

    /// Errors that did not stop the row.
    pub fn warnings(&self) -> impl Iterator<Item = &RowError> {
        self.errors.iter().filter(|e| e.is_warning())
    }
}

/// Result of a generation run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub format: OutputFormat,
    pub rows: Vec<RowOutcome>,
    /// Whether the working directory was removed at the end
    pub work_dir_removed: bool,
}

impl BatchReport {
    pub fn exported(&self) -> usize {
        self.rows.iter().filter(|r| r.is_exported()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.iter().filter(|r| r.stage == RowStage::Failed).count()
    }

    pub fn warnings(&self) -> usize {
        self.rows.iter().map(|r| r.warnings().count()).sum()
    }

    /// Files written, in row order.
    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        self.rows
            .iter()
            .filter(|r| r.is_exported())
            .filter_map(|r| r.destination.as_deref())
    }

    pub fn summary(&self) -> String {
        format!(
            "Generated {} of {} files ({}), {} failed, {} warnings",
            self.exported(),
            self.rows.len(),
            self.format,
            self.failed(),
            self.warnings()
        )
    }
}

// =============================================================================
// Generator
// =============================================================================

/// One generation run. Owns the temporary working directory, which is
/// removed when the run ends or the generator is dropped.
pub struct Generator {
    template: Template,
    rules: ExtraRules,
    format: OutputFormat,
    dpi: f64,
    output_pattern: String,
    exporter: Box<dyn Exporter>,
    work_dir: TempDir,
}

impl Generator {
    /// Prepare a run. Rule syntax and the format are checked here, before
    /// any row is touched.
    pub fn new(
        template: Template,
        options: &GenerateOptions,
        exporter: Box<dyn Exporter>,
    ) -> GenerateResult<Self> {
        let rules = ExtraRules::parse(&options.extra_vars)?;
        let format = options.output_format()?;
        let work_dir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir()
            .map_err(GenerateError::WorkDir)?;

        Ok(Self {
            template,
            rules,
            format,
            dpi: options.dpi,
            output_pattern: options.output_pattern.clone(),
            exporter,
            work_dir,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Process every entry in order.
    ///
    /// All rows are expanded before the first one is filtered or exported, so
    /// a replacement rule that fails on any row aborts the run with no output.
    pub fn run(self, dataset: &Dataset) -> GenerateResult<BatchReport> {
        let started_at = Utc::now();
        if self.format.is_legacy() {
            log_warning(format!(
                "{} export is not available, writing {} instead",
                self.format,
                self.format.effective()
            ));
        }

        let rendered = self.render_all(dataset)?;

        log_info(format!(
            "⚙️  Generating {} {} file(s) with {}",
            dataset.len(),
            self.format.effective(),
            if self.format.is_native() { "no conversion" } else { self.exporter.name() }
        ));

        let mut written = HashMap::new();
        let mut rows = Vec::with_capacity(dataset.len());
        for (row, (entry, text)) in dataset.entries.iter().zip(&rendered).enumerate() {
            rows.push(self.process_row(row, entry, text, &mut written));
        }

        let work_dir = self.work_dir.path().to_path_buf();
        let work_dir_removed = match self.work_dir.close() {
            Ok(()) => true,
            Err(e) => {
                log_warning(format!("Cannot remove \"{}\": {}", work_dir.display(), e));
                false
            }
        };

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            format: self.format,
            rows,
            work_dir_removed,
        };
        if report.failed() == 0 {
            log_success(report.summary());
        } else {
            log_error(report.summary());
        }
        Ok(report)
    }

    /// Expanded template text of every entry, in order.
    fn render_all(&self, dataset: &Dataset) -> RuleResult<Vec<String>> {
        dataset
            .entries
            .iter()
            .map(|entry| self.template.expand(entry, &self.rules))
            .collect()
    }

    /// Filter, write and export one expanded row. `written` maps the
    /// destinations produced so far to their row.
    fn process_row(
        &self,
        row: usize,
        entry: &Entry,
        text: &str,
        written: &mut HashMap<PathBuf, usize>,
    ) -> RowOutcome {
        let mut outcome = RowOutcome::new(row);
        log_info(format!("Row {}", row + 1));
        outcome.stage = RowStage::Rendered;

        let filtered = match structure(text, entry) {
            Ok(filtered) => filtered,
            Err(e) => return outcome.fail(e.into()),
        };
        for column in filtered.unknown_columns {
            outcome.warn(RowError::UnknownColumn {
                column,
                site: ColumnSite::Marker,
            });
        }
        outcome.stage = RowStage::StructurallyFiltered;

        let artifact = self.artifact_path();
        if let Err(source) = fs::write(&artifact, filtered.document.to_xml_string()) {
            return outcome.fail(RowError::ArtifactWrite {
                path: artifact,
                source,
            });
        }
        outcome.stage = RowStage::ArtifactWritten;

        let output = build_output_path(&self.output_pattern, entry);
        for column in output.unknown_columns {
            outcome.warn(RowError::UnknownColumn {
                column,
                site: ColumnSite::OutputPattern,
            });
        }
        let destination = downgrade_path(&output.path, self.format);
        if let Some(&first) = written.get(&destination) {
            discard(&artifact);
            return outcome.fail(RowError::DuplicateOutput {
                path: destination,
                row: first,
            });
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(source) = fs::create_dir_all(parent) {
                discard(&artifact);
                return outcome.fail(RowError::OutputDir {
                    path: parent.to_path_buf(),
                    source,
                });
            }
        }
        outcome.destination = Some(destination.clone());
        outcome.stage = RowStage::PathComputed;

        let exported = if self.format.is_native() {
            let result = move_file(&artifact, &destination);
            if result.is_err() {
                discard(&artifact);
            }
            result.map_err(|source| RowError::Move {
                path: destination.clone(),
                source,
            })
        } else {
            let request = ExportRequest {
                source: &artifact,
                format: self.format.effective(),
                dpi: self.dpi,
                destination: &destination,
            };
            let result = self.exporter.export(&request);
            discard(&artifact);
            result.map_err(|source| RowError::Export {
                path: destination.clone(),
                source,
            })
        };

        match exported {
            Ok(()) => {
                log_info_indent(format!("→ {}", destination.display()), 1);
                written.insert(destination, row);
                outcome.stage = RowStage::Exported;
                outcome
            }
            Err(e) => outcome.fail(e),
        }
    }

    fn artifact_path(&self) -> PathBuf {
        self.work_dir
            .path()
            .join(format!("{}.svg", Uuid::new_v4()))
    }
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

fn discard(artifact: &Path) {
    if let Err(e) = fs::remove_file(artifact) {
        log_warning(format!("Cannot remove \"{}\": {}", artifact.display(), e));
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Generate one file per row of `options.data_file`.
///
/// This is the main entry point. It:
/// 1. Checks the extra-vars rules and the output format
/// 2. Loads the dataset and the template
/// 3. Renders, filters and exports every row
/// 4. Opens the first output when `options.preview` is set
pub fn generate(template_path: &Path, options: &GenerateOptions) -> GenerateResult<BatchReport> {
    generate_with_exporter(template_path, options, options.exporter.build())
}

/// Same as [`generate`] with a caller-provided exporter.
pub fn generate_with_exporter(
    template_path: &Path,
    options: &GenerateOptions,
    exporter: Box<dyn Exporter>,
) -> GenerateResult<BatchReport> {
    // Fail on configuration before reading anything
    ExtraRules::parse(&options.extra_vars)?;
    options.output_format()?;

    log_info(format!("📖 Reading {}", options.data_file.display()));
    let dataset = load_dataset(&options.data_file, options.var_type)?;
    log_success(format!("Encoding: {}", dataset.encoding));
    log_success(format!("Read {} rows", dataset.len()));
    log_info(format!("📋 {} columns: {}", dataset.columns.len(), dataset.columns.join(", ")));

    let template = Template::load(template_path)?;
    log_success(format!("Template: {}", template.source().display()));

    let generator = Generator::new(template, options, exporter)?;
    let report = generator.run(&dataset)?;

    if options.preview {
        if let Some(first) = report.outputs().next() {
            if let Err(e) = open_preview(first) {
                log_error(format!("Error opening preview file: {}", e));
            }
        }
    }

    Ok(report)
}
