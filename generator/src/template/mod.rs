//! SVG template rendering.
//!
//! This module handles one row's trip through the template:
//! - Expand: extra rules and `%VAR_…%` tokens over the raw text
//! - Document: parse the expanded text into a tree
//! - Filter: apply `%IF_…%` / `%UNLESS_…%` layer markers
//!
//! ```text
//! raw SVG text ──expand(entry)──▶ text ──parse──▶ Document ──filter(entry)──▶ Document
//! ```
//!
//! The raw text is never modified; every row starts again from it.

pub mod document;
pub mod expand;
pub mod filter;

use std::path::{Path, PathBuf};

pub use document::{Attribute, Document, Element, Node, XML_DECLARATION};
pub use expand::{escape_markup, expand, expand_extra_vars, expand_vars, var_token, ExtraRule, ExtraRules};
pub use filter::{filter_layers, is_truthy, resolve_label, FilterOutcome, Visibility, INKSCAPE_NS, SVG_NS};

use crate::dataset::Entry;
use crate::error::{RuleResult, TemplateError, TemplateResult};
use crate::output::expand_home;

/// The master SVG, read once per run
#[derive(Debug, Clone)]
pub struct Template {
    source: PathBuf,
    text: String,
}

impl Template {
    /// Read a template file. A leading `~` in the path is expanded.
    pub fn load<P: AsRef<Path>>(path: P) -> TemplateResult<Self> {
        let source = expand_home(path.as_ref());
        let text = std::fs::read_to_string(&source).map_err(|e| TemplateError::Unreadable {
            path: source.clone(),
            source: e,
        })?;
        Ok(Self { source, text })
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        Self {
            source: PathBuf::from("<memory>"),
            text: text.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitute the entry into the raw text.
    pub fn expand(&self, entry: &Entry, rules: &ExtraRules) -> RuleResult<String> {
        expand(&self.text, entry, rules)
    }
}

/// Parse expanded text and apply the layer markers.
pub fn structure(rendered: &str, entry: &Entry) -> TemplateResult<FilterOutcome> {
    let document = Document::parse(rendered)?;
    Ok(filter_layers(document, entry))
}
