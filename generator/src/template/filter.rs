//! Conditional layers.
//!
//! An Inkscape layer (an SVG `g` carrying `inkscape:label`) whose label holds
//! `%IF_<column>%` is kept only when the column value is truthy;
//! `%UNLESS_<column>%` keeps it only when the value is falsy. A kept layer
//! loses its inline `style` so a layer hidden in the editor still renders.
//! A dropped layer is emptied: children and attributes go, only its tag and
//! `id` remain.
//!
//! When a label holds both markers, `UNLESS` is evaluated after `IF` and its
//! outcome overrides it.

use once_cell::sync::Lazy;
use regex::Regex;

use super::document::{Document, Element, Node};
use crate::dataset::Entry;

/// SVG namespace
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Inkscape namespace, owner of the `label` attribute
pub const INKSCAPE_NS: &str = "http://www.inkscape.org/namespaces/inkscape";

// Greedy prefix: the last marker of a kind in the label is the one used.
static IF_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*%IF_([^%]*)%").expect("IF marker pattern is valid"));
static UNLESS_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*%UNLESS_([^%]*)%").expect("UNLESS marker pattern is valid"));

/// What happens to a labeled layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Keep content, drop the inline style
    Show,
    /// Remove content and attributes
    Clear,
}

/// Result of filtering one document
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub document: Document,
    /// Columns referenced by markers but missing from the entry
    pub unknown_columns: Vec<String>,
    pub shown: usize,
    pub cleared: usize,
}

/// `false` for an empty value or, ignoring case, `0`, `false` and `no`.
pub fn is_truthy(value: &str) -> bool {
    !value.is_empty() && !matches!(value.to_lowercase().as_str(), "0" | "false" | "no")
}

/// Decide the visibility of a layer from its label.
///
/// `Ok(None)` when the label carries no marker. `Err(column)` when a marker
/// names a column absent from the entry; the layer must then be left alone.
pub fn resolve_label(label: &str, entry: &Entry) -> Result<Option<Visibility>, String> {
    let mut decision = None;

    if let Some(column) = marker_column(&IF_MARKER, label) {
        let value = entry.get(column).ok_or_else(|| column.to_string())?;
        decision = Some(if is_truthy(value) { Visibility::Show } else { Visibility::Clear });
    }

    if let Some(column) = marker_column(&UNLESS_MARKER, label) {
        let value = entry.get(column).ok_or_else(|| column.to_string())?;
        decision = Some(if is_truthy(value) { Visibility::Clear } else { Visibility::Show });
    }

    Ok(decision)
}

fn marker_column<'a>(marker: &Regex, label: &'a str) -> Option<&'a str> {
    marker
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Apply the conditional markers of every layer for one entry.
pub fn filter_layers(mut document: Document, entry: &Entry) -> FilterOutcome {
    let mut outcome = FilterOutcome {
        document: Document { nodes: Vec::new() },
        unknown_columns: Vec::new(),
        shown: 0,
        cleared: 0,
    };

    if let Some(root) = document.root_mut() {
        let scope = Namespaces::default().enter(root);
        for child in root.children.iter_mut() {
            if let Node::Element(element) = child {
                visit(element, &scope, entry, &mut outcome);
            }
        }
    }

    outcome.document = document;
    outcome
}

fn visit(element: &mut Element, parent: &Namespaces, entry: &Entry, outcome: &mut FilterOutcome) {
    let scope = parent.enter(element);

    if let Some(label) = layer_label(element, &scope) {
        if label.contains('%') {
            match resolve_label(&label, entry) {
                Ok(Some(Visibility::Show)) => {
                    element.remove_attribute("style");
                    outcome.shown += 1;
                }
                Ok(Some(Visibility::Clear)) => {
                    clear(element);
                    outcome.cleared += 1;
                }
                Ok(None) => {}
                Err(column) => {
                    if !outcome.unknown_columns.contains(&column) {
                        outcome.unknown_columns.push(column);
                    }
                }
            }
        }
    }

    for child in element.children.iter_mut() {
        if let Node::Element(child) = child {
            visit(child, &scope, entry, outcome);
        }
    }
}

/// Label of an SVG `g` element, if it has an Inkscape label.
fn layer_label(element: &Element, scope: &Namespaces) -> Option<String> {
    if element.local_name() != "g" || scope.resolve(element.prefix().unwrap_or("")) != Some(SVG_NS) {
        return None;
    }

    element.attributes.iter().find_map(|attr| {
        let (prefix, local) = attr.name.split_once(':')?;
        if local == "label" && scope.resolve(prefix) == Some(INKSCAPE_NS) {
            Some(attr.unescaped_value().into_owned())
        } else {
            None
        }
    })
}

fn clear(element: &mut Element) {
    element.children.clear();
    element.attributes.retain(|a| a.name == "id");
}

/// In-scope namespace declarations, innermost last
#[derive(Debug, Clone, Default)]
struct Namespaces(Vec<(String, String)>);

impl Namespaces {
    fn enter(&self, element: &Element) -> Namespaces {
        let mut scope = self.clone();
        for (prefix, uri) in element.namespace_declarations() {
            scope.0.push((prefix.to_string(), uri.to_string()));
        }
        scope
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, &str)]) -> Entry {
        pairs.iter().copied().collect()
    }

    fn svg(body: &str) -> Document {
        Document::parse(&format!(
            r#"<svg xmlns="{}" xmlns:inkscape="{}">{}</svg>"#,
            SVG_NS, INKSCAPE_NS, body
        ))
        .unwrap()
    }

    fn layer(doc: &Document) -> &Element {
        doc.root().unwrap().child_elements().next().unwrap()
    }

    const PAID_LAYER: &str = r#"<g id="l1" inkscape:label="Section %IF_paid%" inkscape:groupmode="layer" style="display:none"><text>Paid</text></g>"#;

    #[test]
    fn test_truthiness() {
        for value in ["yes", "1", "true", "x", " "] {
            assert!(is_truthy(value), "{:?} should be truthy", value);
        }
        for value in ["", "0", "false", "FALSE", "No", "no"] {
            assert!(!is_truthy(value), "{:?} should be falsy", value);
        }
    }

    #[test]
    fn test_if_falsy_clears_layer() {
        let out = filter_layers(svg(PAID_LAYER), &entry(&[("paid", "no")]));
        let g = layer(&out.document);

        assert!(g.children.is_empty());
        assert_eq!(g.attributes.len(), 1);
        assert_eq!(g.attribute("id").unwrap().value, "l1");
        assert_eq!(out.cleared, 1);
    }

    #[test]
    fn test_if_truthy_keeps_layer_and_unhides() {
        let out = filter_layers(svg(PAID_LAYER), &entry(&[("paid", "yes")]));
        let g = layer(&out.document);

        assert_eq!(g.child_elements().count(), 1);
        assert!(g.attribute("style").is_none());
        assert!(g.attribute("inkscape:label").is_some());
        assert_eq!(out.shown, 1);
    }

    #[test]
    fn test_unless_inverts() {
        let body = r#"<g inkscape:label="Unpaid %UNLESS_paid%"><text/></g>"#;

        let out = filter_layers(svg(body), &entry(&[("paid", "yes")]));
        assert!(layer(&out.document).children.is_empty());

        let out = filter_layers(svg(body), &entry(&[("paid", "")]));
        assert_eq!(layer(&out.document).children.len(), 1);
    }

    #[test]
    fn test_unless_overrides_if() {
        let body = r#"<g inkscape:label="Section %IF_paid%%UNLESS_void%"><text/></g>"#;

        let out = filter_layers(svg(body), &entry(&[("paid", "yes"), ("void", "yes")]));
        assert!(layer(&out.document).children.is_empty());

        let out = filter_layers(svg(body), &entry(&[("paid", "no"), ("void", "no")]));
        assert_eq!(layer(&out.document).children.len(), 1);
    }

    #[test]
    fn test_last_marker_of_a_kind_wins() {
        let label = "%IF_a% and %IF_b%";
        let e = entry(&[("a", "no"), ("b", "yes")]);
        assert_eq!(resolve_label(label, &e), Ok(Some(Visibility::Show)));
    }

    #[test]
    fn test_unknown_column_reported_and_layer_untouched() {
        let out = filter_layers(svg(PAID_LAYER), &entry(&[("name", "Ana")]));
        let g = layer(&out.document);

        assert_eq!(out.unknown_columns, vec!["paid".to_string()]);
        assert_eq!(g.attribute("style").unwrap().value, "display:none");
        assert_eq!(g.children.len(), 1);
    }

    #[test]
    fn test_unknown_column_reported_once() {
        let body = format!("{}{}", PAID_LAYER, PAID_LAYER);
        let out = filter_layers(svg(&body), &Entry::new());
        assert_eq!(out.unknown_columns.len(), 1);
    }

    #[test]
    fn test_label_without_marker_untouched() {
        let body = r#"<g inkscape:label="Background 100%" style="display:none"><rect/></g>"#;
        let out = filter_layers(svg(body), &Entry::new());
        let g = layer(&out.document);

        assert_eq!(g.attribute("style").unwrap().value, "display:none");
        assert!(out.unknown_columns.is_empty());
    }

    #[test]
    fn test_label_needs_inkscape_namespace() {
        let body = r#"<g label="%IF_paid%"><rect/></g>"#;
        let out = filter_layers(svg(body), &entry(&[("paid", "no")]));
        assert_eq!(layer(&out.document).children.len(), 1);
    }

    #[test]
    fn test_prefixed_svg_namespace() {
        let doc = Document::parse(&format!(
            r#"<svg:svg xmlns:svg="{}" xmlns:ink="{}"><svg:g ink:label="%IF_paid%"><svg:rect/></svg:g></svg:svg>"#,
            SVG_NS, INKSCAPE_NS
        ))
        .unwrap();

        let out = filter_layers(doc, &entry(&[("paid", "0")]));
        assert!(layer(&out.document).children.is_empty());
    }

    #[test]
    fn test_nested_layers() {
        let body = r#"<g inkscape:label="Outer"><g inkscape:label="Inner %IF_vip%"><text/></g></g>"#;
        let out = filter_layers(svg(body), &entry(&[("vip", "false")]));

        let inner = layer(&out.document).child_elements().next().unwrap();
        assert!(inner.children.is_empty());
    }

    #[test]
    fn test_rows_do_not_share_state() {
        let template = svg(PAID_LAYER);

        let cleared = filter_layers(template.clone(), &entry(&[("paid", "no")]));
        let kept = filter_layers(template.clone(), &entry(&[("paid", "yes")]));

        assert!(layer(&cleared.document).children.is_empty());
        assert_eq!(layer(&kept.document).children.len(), 1);
        assert_eq!(layer(&template).children.len(), 1);
    }
}
