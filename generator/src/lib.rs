//! # inkgen - batch generation of documents from an SVG template
//!
//! inkgen fills one master SVG (badges, certificates, labels) with every row of
//! a CSV file and exports one finished file per row.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│   Dataset   │────▶│   Expand    │────▶│   Filter    │────▶│   Export    │
//! │  (ISO/UTF8) │     │  (entries)  │     │ (%VAR_…%)   │     │ (%IF_…%)    │     │ (pdf, png…) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                ▲
//!                                          SVG template
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use inkgen::{generate, GenerateOptions};
//!
//! let options = GenerateOptions {
//!     data_file: "guests.csv".into(),
//!     format: "png".into(),
//!     output_pattern: "out/%VAR_name%.png".into(),
//!     ..Default::default()
//! };
//! let report = generate("badge.svg".as_ref(), &options).unwrap();
//! println!("{}", report.summary());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Progress log broadcasting
//! - [`dataset`] - CSV loading with encoding detection
//! - [`template`] - Token expansion, SVG tree, layer filtering
//! - [`output`] - Output formats and file names
//! - [`export`] - Converter programs
//! - [`pipeline`] - Per-row orchestration and run report
//! - [`preview`] - Opening the first result

// Core modules
pub mod error;
pub mod logs;

// Input
pub mod dataset;
pub mod template;

// Output
pub mod export;
pub mod output;

// Orchestration
pub mod pipeline;
pub mod preview;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ColumnSite,
    DatasetError,
    ExportError,
    GenerateError,
    RowError,
    RuleError,
    TemplateError,
};

// =============================================================================
// Re-exports - Dataset
// =============================================================================

pub use dataset::{
    load_dataset,
    parse_dataset_bytes,
    parse_dataset_str,
    detect_encoding,
    decode_content,
    ColumnMode,
    Dataset,
    Entry,
};

// =============================================================================
// Re-exports - Template
// =============================================================================

pub use template::{
    structure,
    Document,
    ExtraRules,
    FilterOutcome,
    Template,
};

// =============================================================================
// Re-exports - Output & Export
// =============================================================================

pub use output::{build_output_path, OutputFormat, OutputPath};
pub use export::{Exporter, ExporterConfig, ExporterKind, ExportRequest, InkscapeExporter, RsvgExporter};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    generate,
    generate_with_exporter,
    BatchReport,
    GenerateOptions,
    Generator,
    RowOutcome,
    RowStage,
};
