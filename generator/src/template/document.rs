//! Minimal owned XML tree for rendered SVG documents.
//!
//! Built from quick-xml events. Text and attribute values are kept in their
//! escaped source form so that serializing an untouched document gives back
//! the same markup (apart from the XML declaration, which is always rewritten).

use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{TemplateError, TemplateResult};

/// Declaration written at the top of every serialized document
pub const XML_DECLARATION: &str = "<?xml version='1.0' encoding='utf-8'?>\n";

/// An attribute with its escaped value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    /// Value with entity references resolved.
    pub fn unescaped_value(&self) -> Cow<'_, str> {
        quick_xml::escape::unescape(&self.value).unwrap_or(Cow::Borrowed(self.value.as_str()))
    }
}

/// An element and its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written (`svg:g`, `g`, …)
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

/// Any node of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Escaped character data
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Prefix part of the qualified name, if any.
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let idx = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(idx))
    }

    /// Child elements, skipping text and other nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// `xmlns` / `xmlns:prefix` declarations made on this element.
    /// The default namespace is returned with an empty prefix.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|a| {
            if a.name == "xmlns" {
                Some(("", a.value.as_str()))
            } else {
                a.name
                    .strip_prefix("xmlns:")
                    .map(|prefix| (prefix, a.value.as_str()))
            }
        })
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&attr.value.replace('"', "&quot;"));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl Node {
    fn write(&self, out: &mut String) {
        match self {
            Node::Element(e) => e.write(out),
            Node::Text(t) => out.push_str(t),
            Node::CData(t) => {
                out.push_str("<![CDATA[");
                out.push_str(t);
                out.push_str("]]>");
            }
            Node::Comment(t) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            Node::ProcessingInstruction(t) => {
                out.push_str("<?");
                out.push_str(t);
                out.push_str("?>");
            }
            Node::DocType(t) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(t);
                out.push('>');
            }
        }
    }
}

/// A parsed document: top-level nodes with exactly one root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse XML text. The source declaration, if any, is dropped.
    pub fn parse(text: &str) -> TemplateResult<Self> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event().map_err(|e| TemplateError::Parse {
                position,
                message: e.to_string(),
            })?;

            let node = match event {
                Event::Start(start) => {
                    stack.push(element_from(&start, position)?);
                    continue;
                }
                Event::Empty(start) => Node::Element(element_from(&start, position)?),
                Event::End(_) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => {
                        return Err(TemplateError::Parse {
                            position,
                            message: "unexpected closing tag".to_string(),
                        })
                    }
                },
                Event::Text(t) => Node::Text(raw(&t)),
                Event::CData(t) => Node::CData(raw(&t)),
                Event::Comment(t) => Node::Comment(raw(&t)),
                Event::PI(t) => Node::ProcessingInstruction(raw(&t)),
                Event::DocType(t) => Node::DocType(raw(&t)),
                Event::Decl(_) => continue,
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => nodes.push(node),
            }
        }

        if let Some(open) = stack.last() {
            return Err(TemplateError::Parse {
                position: text.len() as u64,
                message: format!("unclosed element <{}>", open.name),
            });
        }

        let roots = nodes.iter().filter(|n| matches!(n, Node::Element(_))).count();
        if roots != 1 {
            return Err(TemplateError::Parse {
                position: 0,
                message: format!("expected one root element, found {}", roots),
            });
        }

        Ok(Self { nodes })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Serialize with a fresh XML declaration.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        for node in &self.nodes {
            // Whitespace between the declaration and the root is not kept.
            if matches!(node, Node::Text(t) if t.trim().is_empty()) {
                continue;
            }
            node.write(&mut out);
        }
        out
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn raw(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn element_from(start: &quick_xml::events::BytesStart<'_>, position: u64) -> TemplateResult<Element> {
    let mut element = Element::new(raw(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| TemplateError::Parse {
            position,
            message: e.to_string(),
        })?;
        element.attributes.push(Attribute {
            name: raw(attr.key.as_ref()),
            value: raw(&attr.value),
        });
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape">
  <!-- layers -->
  <g inkscape:label="Paid %IF_paid%" id="layer1" style="display:none">
    <text>Thanks &amp; welcome</text>
  </g>
  <rect width="10"/>
</svg>
"#;

    #[test]
    fn test_parse_structure() {
        let doc = Document::parse(SVG).unwrap();
        let root = doc.root().unwrap();

        assert_eq!(root.local_name(), "svg");
        let children: Vec<&str> = root.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(children, vec!["g", "rect"]);

        let g = root.child_elements().next().unwrap();
        assert_eq!(g.attribute("inkscape:label").unwrap().value, "Paid %IF_paid%");
    }

    #[test]
    fn test_round_trip_keeps_markup() {
        let doc = Document::parse(SVG).unwrap();
        let xml = doc.to_xml_string();

        assert!(xml.starts_with(XML_DECLARATION));
        assert!(xml.contains("<!-- layers -->"));
        assert!(xml.contains("<text>Thanks &amp; welcome</text>"));
        assert!(xml.contains("<rect width=\"10\" />"));
        assert!(!xml.contains("UTF-8"));

        // Serialized output parses back to the same tree.
        assert_eq!(Document::parse(&xml).unwrap().root(), doc.root());
    }

    #[test]
    fn test_single_quoted_attribute_with_double_quote() {
        let doc = Document::parse(r#"<svg a='say "hi"'/>"#).unwrap();
        let xml = doc.to_xml_string();
        assert!(xml.contains(r#"a="say &quot;hi&quot;""#));
        assert!(Document::parse(&xml).is_ok());
    }

    #[test]
    fn test_namespace_declarations() {
        let doc = Document::parse(SVG).unwrap();
        let decls: Vec<(&str, &str)> = doc.root().unwrap().namespace_declarations().collect();

        assert_eq!(decls[0], ("", "http://www.w3.org/2000/svg"));
        assert_eq!(decls[1].0, "inkscape");
    }

    #[test]
    fn test_unescaped_attribute_value() {
        let attr = Attribute {
            name: "inkscape:label".into(),
            value: "Tom &amp; Jerry".into(),
        };
        assert_eq!(attr.unescaped_value(), "Tom & Jerry");
    }

    #[test]
    fn test_mismatched_tags_rejected() {
        assert!(Document::parse("<svg><g></svg>").is_err());
    }

    #[test]
    fn test_unclosed_root_rejected() {
        assert!(Document::parse("<svg><g/>").is_err());
    }

    #[test]
    fn test_no_root_rejected() {
        assert!(Document::parse("<!-- nothing -->").is_err());
    }

    #[test]
    fn test_attribute_helpers() {
        let mut el = Element::new("svg:g");
        el.set_attribute("style", "display:none");
        el.set_attribute("style", "opacity:1");

        assert_eq!(el.prefix(), Some("svg"));
        assert_eq!(el.local_name(), "g");
        assert_eq!(el.attributes.len(), 1);
        assert_eq!(el.remove_attribute("style").unwrap().value, "opacity:1");
        assert!(el.remove_attribute("style").is_none());
    }
}
