//! Minimal element tree over `quick-xml` events.
//!
//! Schema and data documents are small, flat, and element-only: a root with
//! repeated record elements whose children carry text values. This module
//! builds just enough of a tree to walk those shapes.

use crate::error::{Result, SyncError};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

/// An XML element with its text and child elements. Attributes are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Element tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct child elements, in document order.
    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// First direct child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Concatenated text of this element and all descendants.
    pub fn inner_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.inner_text());
        }
        out
    }

    /// Inner text of the named child, or an empty string when it is absent.
    pub fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.inner_text()).unwrap_or_default()
    }
}

/// A parsed document with exactly one root element.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    origin: String,
    root: XmlElement,
}

impl XmlDocument {
    /// Read and parse a document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::malformed(&origin, format!("cannot read document: {}", e)))?;
        Self::parse_named(&content, origin)
    }

    /// Parse a document held in memory.
    pub fn parse(content: &str) -> Result<Self> {
        Self::parse_named(content, "<inline>")
    }

    /// Parse a document, labelling errors with `origin`.
    pub fn parse_named(content: &str, origin: impl Into<String>) -> Result<Self> {
        let origin = origin.into();
        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                SyncError::malformed(
                    &origin,
                    format!("XML error at byte {}: {}", reader.buffer_position(), e),
                )
            })?;

            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    stack.push(XmlElement::new(name));
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    attach(&mut stack, &mut root, XmlElement::new(name), &origin)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        SyncError::malformed(&origin, "unexpected closing tag")
                    })?;
                    attach(&mut stack, &mut root, element, &origin)?;
                }
                Event::Text(e) => {
                    let text = e
                        .unescape()
                        .map_err(|e| SyncError::malformed(&origin, e.to_string()))?;
                    match stack.last_mut() {
                        Some(top) => top.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(SyncError::malformed(
                                &origin,
                                "text content outside the root element",
                            ))
                        }
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(SyncError::malformed(
                &origin,
                format!("unclosed element <{}>", open.name),
            ));
        }

        let root = root.ok_or_else(|| SyncError::malformed(&origin, "missing root element"))?;
        Ok(Self { origin, root })
    }

    /// The document's root element.
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// Where the document came from (file path or `<inline>`).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Direct children of the root: one per record.
    pub fn records(&self) -> &[XmlElement] {
        self.root.children()
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    origin: &str,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(SyncError::malformed(origin, "multiple root elements")),
    }
    Ok(())
}
