//! Exporters: conversion of a rendered SVG into the requested format.
//!
//! The pipeline only talks to the [`Exporter`] trait. Two command-line
//! converters are provided:
//!
//! | Exporter             | Program        | Formats                       |
//! |----------------------|----------------|-------------------------------|
//! | [`InkscapeExporter`] | `inkscape`     | png, pdf, ps, eps, emf, wmf   |
//! | [`RsvgExporter`]     | `rsvg-convert` | png, pdf, ps, eps             |
//!
//! Both block until the converter exits.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};
use crate::output::OutputFormat;

/// One conversion job
#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    /// Rendered SVG
    pub source: &'a Path,
    pub format: OutputFormat,
    /// Resolution for bitmap output
    pub dpi: f64,
    /// File to create
    pub destination: &'a Path,
}

/// Converts a rendered SVG into a final file.
pub trait Exporter {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Write `request.destination`, or fail.
    fn export(&self, request: &ExportRequest<'_>) -> ExportResult<()>;
}

// =============================================================================
// Inkscape
// =============================================================================

/// Exports through `inkscape --export-type=…` (Inkscape 1.x command line)
#[derive(Debug, Clone)]
pub struct InkscapeExporter {
    program: PathBuf,
}

impl InkscapeExporter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn args(&self, request: &ExportRequest<'_>) -> Vec<OsString> {
        let mut filename = OsString::from("--export-filename=");
        filename.push(request.destination);
        vec![
            format!("--export-dpi={}", request.dpi).into(),
            format!("--export-type={}", request.format).into(),
            filename,
            request.source.as_os_str().to_os_string(),
        ]
    }
}

impl Default for InkscapeExporter {
    fn default() -> Self {
        Self::new("inkscape")
    }
}

impl Exporter for InkscapeExporter {
    fn name(&self) -> &str {
        "inkscape"
    }

    fn export(&self, request: &ExportRequest<'_>) -> ExportResult<()> {
        run_converter(&self.program, &self.args(request), request.destination)
    }
}

// =============================================================================
// rsvg-convert
// =============================================================================

/// Exports through librsvg's `rsvg-convert`
#[derive(Debug, Clone)]
pub struct RsvgExporter {
    program: PathBuf,
}

impl RsvgExporter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn supports(format: OutputFormat) -> bool {
        matches!(
            format,
            OutputFormat::Png | OutputFormat::Pdf | OutputFormat::Ps | OutputFormat::Eps | OutputFormat::Svg
        )
    }

    /// Files saved by Inkscape 1.x need a 72/96 scale to keep their page size.
    pub fn args(&self, request: &ExportRequest<'_>) -> Vec<OsString> {
        let dpi = request.dpi * 72.0 / 96.0;
        let mut output = OsString::from("--output=");
        output.push(request.destination);
        vec![
            format!("--dpi-x={}", dpi).into(),
            format!("--dpi-y={}", dpi).into(),
            format!("--format={}", request.format).into(),
            output,
            request.source.as_os_str().to_os_string(),
        ]
    }
}

impl Default for RsvgExporter {
    fn default() -> Self {
        Self::new("rsvg-convert")
    }
}

impl Exporter for RsvgExporter {
    fn name(&self) -> &str {
        "rsvg-convert"
    }

    fn export(&self, request: &ExportRequest<'_>) -> ExportResult<()> {
        if !Self::supports(request.format) {
            return Err(ExportError::Unsupported {
                program: self.program.display().to_string(),
                format: request.format.to_string(),
            });
        }
        run_converter(&self.program, &self.args(request), request.destination)
    }
}

/// Run a converter to completion and check it produced `destination`.
fn run_converter(program: &Path, args: &[OsString], destination: &Path) -> ExportResult<()> {
    let name = program.display().to_string();
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ExportError::Spawn {
            program: name.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExportError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    if !destination.exists() {
        return Err(ExportError::MissingOutput {
            program: name,
            path: destination.to_path_buf(),
        });
    }

    Ok(())
}

// =============================================================================
// Selection
// =============================================================================

/// Available exporter backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    #[default]
    Inkscape,
    Rsvg,
}

impl FromStr for ExporterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inkscape" => Ok(ExporterKind::Inkscape),
            "rsvg" | "rsvg-convert" => Ok(ExporterKind::Rsvg),
            other => Err(format!("unknown exporter \"{}\" (expected inkscape or rsvg)", other)),
        }
    }
}

/// Which exporter to use and, optionally, where its program lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    pub kind: ExporterKind,
    #[serde(default)]
    pub program: Option<PathBuf>,
}

impl ExporterConfig {
    pub fn build(&self) -> Box<dyn Exporter> {
        match (self.kind, &self.program) {
            (ExporterKind::Inkscape, Some(p)) => Box::new(InkscapeExporter::new(p)),
            (ExporterKind::Inkscape, None) => Box::new(InkscapeExporter::default()),
            (ExporterKind::Rsvg, Some(p)) => Box::new(RsvgExporter::new(p)),
            (ExporterKind::Rsvg, None) => Box::new(RsvgExporter::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(source: &'a Path, destination: &'a Path, format: OutputFormat) -> ExportRequest<'a> {
        ExportRequest {
            source,
            format,
            dpi: 96.0,
            destination,
        }
    }

    #[test]
    fn test_inkscape_args() {
        let req = request(Path::new("/tmp/a.svg"), Path::new("out/Ana.pdf"), OutputFormat::Pdf);
        let args = InkscapeExporter::default().args(&req);

        assert_eq!(
            args,
            vec![
                OsString::from("--export-dpi=96"),
                OsString::from("--export-type=pdf"),
                OsString::from("--export-filename=out/Ana.pdf"),
                OsString::from("/tmp/a.svg"),
            ]
        );
    }

    #[test]
    fn test_rsvg_args_scale_dpi() {
        let req = request(Path::new("a.svg"), Path::new("b.png"), OutputFormat::Png);
        let args = RsvgExporter::default().args(&req);

        assert_eq!(args[0], OsString::from("--dpi-x=72"));
        assert_eq!(args[2], OsString::from("--format=png"));
        assert_eq!(args[3], OsString::from("--output=b.png"));
    }

    #[test]
    fn test_rsvg_rejects_emf() {
        let req = request(Path::new("a.svg"), Path::new("b.emf"), OutputFormat::Emf);
        let err = RsvgExporter::default().export(&req).unwrap_err();
        assert!(matches!(err, ExportError::Unsupported { .. }));
    }

    #[test]
    fn test_missing_program() {
        let req = request(Path::new("a.svg"), Path::new("b.pdf"), OutputFormat::Pdf);
        let err = InkscapeExporter::new("/no/such/inkscape-binary").export(&req).unwrap_err();

        assert!(matches!(err, ExportError::Spawn { .. }));
        assert!(err.to_string().contains("inkscape-binary"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program() {
        let req = request(Path::new("a.svg"), Path::new("b.pdf"), OutputFormat::Pdf);
        let err = InkscapeExporter::new("false").export(&req).unwrap_err();
        assert!(matches!(err, ExportError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_success_without_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("b.pdf");
        let req = request(Path::new("a.svg"), &dest, OutputFormat::Pdf);

        let err = InkscapeExporter::new("true").export(&req).unwrap_err();
        assert!(matches!(err, ExportError::MissingOutput { .. }));
    }

    #[test]
    fn test_exporter_kind() {
        assert_eq!("RSVG".parse::<ExporterKind>().unwrap(), ExporterKind::Rsvg);
        assert_eq!("inkscape".parse::<ExporterKind>().unwrap(), ExporterKind::Inkscape);
        assert!("gimp".parse::<ExporterKind>().is_err());

        let config = ExporterConfig {
            kind: ExporterKind::Rsvg,
            program: None,
        };
        assert_eq!(config.build().name(), "rsvg-convert");
    }
}
