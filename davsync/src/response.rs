// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Multistatus response parsing.
//!
//! Structural elements (`response`, `href`, `propstat`, `status`, `prop`) are
//! matched by local name only; property names keep their namespace URI.

use crate::error::DavError;
use crate::types::{CTag, Collection, ETag, Href, PropName, Property, PropertyMap, SyncToken};
use crate::xml::{Node, parse_document};

/// Parsed `multistatus` document.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// Resources in document order.
    pub responses: Vec<ResourceEntry>,
    /// Top-level `sync-token` element, present on sync-collection responses.
    pub sync_token: Option<SyncToken>,
}

/// One `<response>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Resource href, verbatim.
    pub href: Href,
    /// First 2xx status line seen, either on a `propstat` or on the response
    /// itself. `None` means nothing succeeded for this resource.
    pub status: Option<String>,
    /// Response-level `<status>`, used by RFC 6578 for removed members.
    pub response_status: Option<String>,
    /// Properties from 2xx `propstat` blocks only.
    pub props: PropertyMap,
    /// Properties reported under non-2xx `propstat` blocks, with that status.
    pub failed: Vec<(PropName, Option<u16>)>,
    statuses: Vec<Option<u16>>,
}

/// Extracts the numeric code from a status line (`HTTP/1.1 404 Not Found`).
#[must_use]
pub fn status_code(status_line: &str) -> Option<u16> {
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
}

fn is_success(code: Option<u16>) -> bool {
    code.is_some_and(|c| (200..300).contains(&c))
}

impl ResourceEntry {
    /// Whether at least one status for this resource was 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_some()
    }

    /// Whether every status reported for this resource is 404.
    ///
    /// This is the deletion marker of a sync-collection response, in either
    /// the response-level or the propstat form.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        !self.statuses.is_empty() && self.statuses.iter().all(|s| *s == Some(404))
    }

    /// Numeric response-level status.
    #[must_use]
    pub fn response_code(&self) -> Option<u16> {
        self.response_status.as_deref().and_then(status_code)
    }

    /// `getetag`, if reported.
    #[must_use]
    pub fn etag(&self) -> Option<ETag> {
        self.props.value(&PropName::GET_ETAG).map(ETag::from)
    }

    /// Converts the entry into collection metadata.
    #[must_use]
    pub fn to_collection(&self) -> Collection {
        let resource_types = self.props.tokens(&PropName::RESOURCE_TYPE);
        let description = self
            .props
            .value(&PropName::CALENDAR_DESCRIPTION)
            .or_else(|| self.props.value(&PropName::ADDRESSBOOK_DESCRIPTION));

        Collection {
            href: self.href.clone(),
            is_calendar: resource_types.contains(&"calendar"),
            is_addressbook: resource_types.contains(&"addressbook"),
            display_name: self.props.value(&PropName::DISPLAY_NAME).map(str::to_string),
            description: description.map(str::to_string),
            supported_components: self
                .props
                .tokens(&PropName::SUPPORTED_CALENDAR_COMPONENTS)
                .into_iter()
                .map(str::to_string)
                .collect(),
            supported_reports: self
                .props
                .tokens(&PropName::SUPPORTED_REPORT_SET)
                .into_iter()
                .map(str::to_string)
                .collect(),
            ctag: self.props.value(&PropName::GET_CTAG).map(CTag::from),
            sync_token: self.props.value(&PropName::SYNC_TOKEN).map(SyncToken::from),
        }
    }

    fn from_node(node: &Node) -> Option<Self> {
        let Some(href) = node.child("href").and_then(Node::trimmed_text) else {
            tracing::warn!("skipping multistatus response without href");
            return None;
        };

        let response_status = node
            .child("status")
            .and_then(Node::trimmed_text)
            .map(str::to_string);

        let mut entry = Self {
            href: Href::from(href),
            status: None,
            response_status: None,
            props: PropertyMap::new(),
            failed: Vec::new(),
            statuses: Vec::new(),
        };

        if let Some(line) = &response_status {
            let code = status_code(line);
            entry.statuses.push(code);
            if is_success(code) {
                entry.status = Some(line.clone());
            }
        }
        entry.response_status = response_status;

        for propstat in node.children_named("propstat") {
            let line = propstat.child("status").and_then(Node::trimmed_text);
            let code = line.and_then(status_code);
            entry.statuses.push(code);

            let props = propstat
                .children_named("prop")
                .flat_map(|p| p.children.iter())
                .map(property_from_node);

            if is_success(code) {
                if entry.status.is_none() {
                    entry.status = line.map(str::to_string);
                }
                for property in props {
                    entry.props.insert(property);
                }
            } else {
                tracing::debug!(href, status = ?line, "ignoring non-2xx propstat");
                entry.failed.extend(props.map(|p| (p.name, code)));
            }
        }

        Some(entry)
    }
}

fn property_from_node(node: &Node) -> Property {
    let name = PropName::new(node.namespace.clone().unwrap_or_default(), node.name.clone());
    let value = property_value(node, &name);
    Property { name, value }
}

fn property_value(node: &Node, name: &PropName) -> Option<String> {
    if node.children.is_empty() {
        let text = node.trimmed_text()?;
        // Object payloads are kept byte-exact apart from the blank test above.
        if *name == PropName::CALENDAR_DATA || *name == PropName::ADDRESS_DATA {
            return Some(node.text.clone());
        }
        return Some(text.to_string());
    }

    if let Some(href) = node.child("href") {
        return href.trimmed_text().map(str::to_string);
    }

    let mut tokens = Vec::new();
    collect_leaf_tokens(node, &mut tokens);
    (!tokens.is_empty()).then(|| tokens.join(","))
}

/// Leaf markers, e.g. `<collection/><C:calendar/>` or `<C:comp name="VEVENT"/>`.
fn collect_leaf_tokens(node: &Node, tokens: &mut Vec<String>) {
    for child in &node.children {
        if child.children.is_empty() {
            let token = child.attribute("name").unwrap_or(&child.name);
            tokens.push(token.to_string());
        } else {
            collect_leaf_tokens(child, tokens);
        }
    }
}

impl MultiStatusResponse {
    /// Parses a multistatus document.
    ///
    /// Responses without a usable `href` are dropped instead of failing the
    /// whole document.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Parsing`] if the body is not well-formed XML or the
    /// root element is not `multistatus`.
    pub fn from_xml(xml: &[u8]) -> Result<Self, DavError> {
        let root = parse_document(xml)?;
        if !root.is("multistatus") {
            return Err(DavError::Parsing(format!(
                "expected multistatus root element, found {}",
                root.name
            )));
        }

        let responses = root
            .children_named("response")
            .filter_map(ResourceEntry::from_node)
            .collect();

        let sync_token = root
            .child("sync-token")
            .and_then(Node::trimmed_text)
            .map(SyncToken::from);

        Ok(Self {
            responses,
            sync_token,
        })
    }

    /// First property value with the given name among successful entries.
    #[must_use]
    pub fn find_value(&self, name: &PropName) -> Option<&str> {
        self.responses.iter().find_map(|r| r.props.value(name))
    }
}
