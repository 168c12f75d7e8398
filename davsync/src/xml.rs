// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML utilities for WebDAV/CalDAV/CardDAV processing.
//!
//! Request bodies are written through [`XmlDocument`]; responses are read into a
//! small namespace-resolved element tree (`Node`) that the multistatus parser walks.

use std::io::Cursor;

use quick_xml::escape::{escape, resolve_predefined_entity, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};

use crate::error::DavError;

/// XML namespaces used by the DAV family of protocols.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CalDAV` namespace.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";

    /// `CardDAV` namespace.
    pub const CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";

    /// Apple `CalendarServer` extensions (`getctag`).
    pub const CALENDARSERVER: &str = "http://calendarserver.org/ns/";

    /// Conventional prefix for a well-known namespace.
    #[must_use]
    pub fn prefix_for(namespace: &str) -> Option<&'static str> {
        match namespace {
            DAV => Some("D"),
            CALDAV => Some("C"),
            CARDDAV => Some("CR"),
            CALENDARSERVER => Some("CS"),
            _ => None,
        }
    }
}

/// Element of an outgoing XML document.
///
/// Names are written as given, so they carry their prefix (`D:prop`); the
/// prefixes themselves are declared on the [`XmlDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    content: Vec<XmlContent>,
    explicit_close: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum XmlContent {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    /// Creates an empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            content: Vec::new(),
            explicit_close: false,
        }
    }

    /// Adds an attribute. The value is escaped on output.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.content.push(XmlContent::Element(child));
        self
    }

    /// Appends several child elements.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.content
            .extend(children.into_iter().map(XmlContent::Element));
        self
    }

    /// Appends text content. The text is escaped on output.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.content.push(XmlContent::Text(text.into()));
        self
    }

    /// Forces `<x></x>` instead of `<x/>` when the element has no content.
    #[must_use]
    pub const fn explicit_close(mut self) -> Self {
        self.explicit_close = true;
        self
    }

    fn start(&self) -> BytesStart<'_> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            let escaped = escape(value.as_str());
            start.push_attribute(Attribute::from((key.as_bytes(), escaped.as_bytes())));
        }
        start
    }

    fn write<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
        extra: &[(String, String)],
    ) -> Result<(), DavError> {
        let mut start = self.start();
        for (key, value) in extra {
            let escaped = escape(value.as_str());
            start.push_attribute(Attribute::from((key.as_bytes(), escaped.as_bytes())));
        }

        if self.content.is_empty() && !self.explicit_close {
            writer.write_event(Event::Empty(start)).map_err(write_err)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(write_err)?;
        for content in &self.content {
            match content {
                XmlContent::Element(child) => child.write(writer, &[])?,
                XmlContent::Text(text) => writer
                    .write_event(Event::Text(BytesText::from_escaped(escape(text.as_str()))))
                    .map_err(write_err)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(write_err)?;
        Ok(())
    }
}

/// A complete XML document with its namespace declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    namespaces: Vec<(String, String)>,
    root: XmlElement,
}

impl XmlDocument {
    /// Creates a document around its root element.
    #[must_use]
    pub const fn new(root: XmlElement) -> Self {
        Self {
            namespaces: Vec::new(),
            root,
        }
    }

    /// Declares a namespace on the root element. An empty prefix declares the
    /// default namespace.
    #[must_use]
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    /// Serializes the document with a UTF-8 declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DavError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_err)?;

        let declarations: Vec<(String, String)> = self
            .namespaces
            .iter()
            .map(|(prefix, uri)| {
                let key = if prefix.is_empty() {
                    "xmlns".to_string()
                } else {
                    format!("xmlns:{prefix}")
                };
                (key, uri.clone())
            })
            .collect();
        self.root.write(&mut writer, &declarations)?;

        Ok(writer.into_inner().into_inner())
    }

    /// Serializes the document to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn to_xml_string(&self) -> Result<String, DavError> {
        String::from_utf8(self.to_bytes()?)
            .map_err(|e| DavError::Xml(format!("UTF-8 error: {e}")))
    }
}

fn write_err(e: impl std::fmt::Display) -> DavError {
    DavError::Xml(e.to_string())
}

fn parse_err(e: impl std::fmt::Display) -> DavError {
    DavError::Parsing(e.to_string())
}

/// Parsed element with its resolved namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Node {
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub text: String,
}

impl Node {
    fn from_start(start: &BytesStart<'_>, namespace: Option<String>) -> Result<Self, DavError> {
        let name = std::str::from_utf8(start.name().local_name().into_inner())
            .map_err(|e| DavError::Parsing(format!("UTF-8 error: {e}")))?
            .to_string();

        let mut attributes = Vec::new();
        for attr in start.attributes().with_checks(false) {
            let attr = attr.map_err(parse_err)?;
            let key = std::str::from_utf8(attr.key.local_name().into_inner())
                .map_err(|e| DavError::Parsing(format!("UTF-8 error: {e}")))?;
            let raw = std::str::from_utf8(&attr.value)
                .map_err(|e| DavError::Parsing(format!("UTF-8 error: {e}")))?;
            let value = unescape(raw).map_err(parse_err)?;
            attributes.push((key.to_string(), value.into_owned()));
        }

        Ok(Self {
            namespace,
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    /// Whether this element has the given local name, ignoring its namespace.
    pub fn is(&self, local_name: &str) -> bool {
        self.name == local_name
    }

    /// Direct children with the given local name.
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.is(local_name))
    }

    /// First direct child with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.is(local_name))
    }

    /// Text content with surrounding whitespace removed; `None` if blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Attribute value by local name.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == local_name)
            .map(|(_, v)| v.as_str())
    }
}

/// Reads a whole document into a [`Node`] tree.
///
/// # Errors
///
/// Returns [`DavError::Parsing`] if the input is not well-formed XML or has no
/// root element.
pub(crate) fn parse_document(input: &[u8]) -> Result<Node, DavError> {
    let mut reader = NsReader::from_reader(input);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event().map_err(parse_err)?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
            ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
        };

        match event {
            Event::Start(ref e) => stack.push(Node::from_start(e, namespace)?),
            Event::Empty(ref e) => {
                let node = Node::from_start(e, namespace)?;
                attach(node, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| DavError::Parsing("unbalanced end tag".to_string()))?;
                attach(node, &mut stack, &mut root)?;
            }
            Event::Text(ref t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.decode().map_err(parse_err)?);
                }
            }
            Event::CData(ref c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(c));
                }
            }
            Event::GeneralRef(ref r) => {
                if let Some(top) = stack.last_mut() {
                    if let Some(ch) = r.resolve_char_ref().map_err(parse_err)? {
                        top.text.push(ch);
                    } else {
                        let name = std::str::from_utf8(r)
                            .map_err(|e| DavError::Parsing(format!("UTF-8 error: {e}")))?;
                        let resolved = resolve_predefined_entity(name).ok_or_else(|| {
                            DavError::Parsing(format!("unknown entity reference: &{name};"))
                        })?;
                        top.text.push_str(resolved);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DavError::Parsing("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| DavError::Parsing("document has no root element".to_string()))
}

fn attach(node: Node, stack: &mut [Node], root: &mut Option<Node>) -> Result<(), DavError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        Ok(())
    } else if root.is_none() {
        *root = Some(node);
        Ok(())
    } else {
        Err(DavError::Parsing("multiple root elements".to_string()))
    }
}
