// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request body builders for WebDAV/CalDAV/CardDAV operations.

use crate::error::DavError;
use crate::types::{Href, PropName, SyncToken};
use crate::xml::{XmlDocument, XmlElement, ns};

/// Prefix allocation for the namespaces a request body uses.
///
/// Well-known namespaces keep their conventional prefix; anything else gets a
/// generated `X0`, `X1`, ...
#[derive(Debug, Default)]
struct Prefixes {
    declared: Vec<(String, String)>,
    generated: usize,
}

impl Prefixes {
    fn with(namespaces: &[&str]) -> Self {
        let mut prefixes = Self::default();
        for namespace in namespaces {
            prefixes.prefix(namespace);
        }
        prefixes
    }

    fn prefix(&mut self, namespace: &str) -> String {
        if let Some((prefix, _)) = self.declared.iter().find(|(_, uri)| uri == namespace) {
            return prefix.clone();
        }
        let prefix = ns::prefix_for(namespace).map_or_else(
            || {
                let p = format!("X{}", self.generated);
                self.generated += 1;
                p
            },
            str::to_string,
        );
        self.declared.push((prefix.clone(), namespace.to_string()));
        prefix
    }

    fn element(&mut self, name: &PropName) -> XmlElement {
        let prefix = self.prefix(name.namespace());
        XmlElement::new(format!("{prefix}:{}", name.name()))
    }

    fn prop(&mut self, props: &[PropName]) -> XmlElement {
        XmlElement::new("D:prop").children(props.iter().map(|p| self.element(p)))
    }

    fn into_document(self, root: XmlElement) -> XmlDocument {
        self.declared
            .into_iter()
            .fold(XmlDocument::new(root), |doc, (prefix, uri)| {
                doc.namespace(prefix, uri)
            })
    }
}

fn build(prefixes: Prefixes, root: XmlElement) -> Result<String, DavError> {
    prefixes.into_document(root).to_xml_string()
}

/// PROPFIND request builder.
#[derive(Debug, Clone, Default)]
pub struct PropFindRequest {
    props: Vec<PropName>,
}

impl PropFindRequest {
    /// Creates an empty PROPFIND request.
    #[must_use]
    pub const fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: PropName) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Creates a request for the given properties.
    #[must_use]
    pub fn with_props(props: impl IntoIterator<Item = PropName>) -> Self {
        Self {
            props: props.into_iter().collect(),
        }
    }

    /// Requested properties.
    #[must_use]
    pub fn props(&self) -> &[PropName] {
        &self.props
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut prefixes = Prefixes::with(&[ns::DAV]);
        let root = XmlElement::new("D:propfind").child(prefixes.prop(&self.props));
        build(prefixes, root)
    }
}

/// RFC 6578 `sync-collection` REPORT builder.
#[derive(Debug, Clone)]
pub struct SyncCollectionRequest {
    token: Option<SyncToken>,
    props: Vec<PropName>,
    limit: Option<u32>,
}

impl SyncCollectionRequest {
    /// Creates a request; `None` asks for the initial full listing.
    #[must_use]
    pub fn new(token: Option<SyncToken>) -> Self {
        Self {
            token,
            props: Vec::new(),
            limit: None,
        }
    }

    /// Adds a property to report for each changed member.
    #[must_use]
    pub fn property(mut self, prop: PropName) -> Self {
        self.props.push(prop);
        self
    }

    /// Sets the requested properties.
    #[must_use]
    pub fn props(mut self, props: impl IntoIterator<Item = PropName>) -> Self {
        self.props.extend(props);
        self
    }

    /// Caps the number of results the server returns (`DAV:limit`).
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builds the XML body.
    ///
    /// The token element is always written with explicit open and close tags,
    /// so an initial sync sends `<D:sync-token></D:sync-token>`.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut prefixes = Prefixes::with(&[ns::DAV]);

        let mut token = XmlElement::new("D:sync-token").explicit_close();
        if let Some(t) = &self.token {
            token = token.text(t.as_str());
        }

        let mut root = XmlElement::new("D:sync-collection")
            .child(token)
            .child(XmlElement::new("D:sync-level").text("1"));
        if let Some(limit) = self.limit {
            root = root.child(
                XmlElement::new("D:limit").child(XmlElement::new("D:nresults").text(limit.to_string())),
            );
        }
        let root = root.child(prefixes.prop(&self.props));
        build(prefixes, root)
    }
}

/// Time range filter for calendar queries, in UTC basic format
/// (`20260101T000000Z`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Start date/time.
    pub start: String,
    /// End date/time.
    pub end: Option<String>,
}

/// `calendar-query` REPORT builder.
#[derive(Debug, Clone)]
pub struct CalendarQueryRequest {
    props: Vec<PropName>,
    time_range: Option<TimeRange>,
    component: Option<String>,
}

impl CalendarQueryRequest {
    /// Creates an unrestricted query returning `getetag` and `calendar-data`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            props: vec![PropName::GET_ETAG, PropName::CALENDAR_DATA],
            time_range: None,
            component: None,
        }
    }

    /// Replaces the requested properties.
    #[must_use]
    pub fn props(mut self, props: impl IntoIterator<Item = PropName>) -> Self {
        self.props = props.into_iter().collect();
        self
    }

    /// Sets the time range filter. Only applied together with a component filter.
    #[must_use]
    pub fn time_range(mut self, start: String, end: Option<String>) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    /// Sets the component filter (VEVENT, VTODO, etc.).
    #[must_use]
    pub fn component(mut self, component: String) -> Self {
        self.component = Some(component);
        self
    }

    /// Builds the XML body for the calendar query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut prefixes = Prefixes::with(&[ns::DAV, ns::CALDAV]);

        let mut vcalendar = XmlElement::new("C:comp-filter").attr("name", "VCALENDAR");
        if let Some(component) = &self.component {
            let mut inner = XmlElement::new("C:comp-filter").attr("name", component.as_str());
            if let Some(tr) = &self.time_range {
                let mut range = XmlElement::new("C:time-range").attr("start", tr.start.as_str());
                if let Some(end) = &tr.end {
                    range = range.attr("end", end.as_str());
                }
                inner = inner.child(range);
            }
            vcalendar = vcalendar.child(inner);
        }

        let root = XmlElement::new("C:calendar-query")
            .child(prefixes.prop(&self.props))
            .child(XmlElement::new("C:filter").child(vcalendar));
        build(prefixes, root)
    }
}

impl Default for CalendarQueryRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// `addressbook-query` REPORT builder. The filter is unrestricted and matches
/// every vCard in the collection.
#[derive(Debug, Clone)]
pub struct AddressbookQueryRequest {
    props: Vec<PropName>,
}

impl AddressbookQueryRequest {
    /// Creates a query returning `getetag` and `address-data`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            props: vec![PropName::GET_ETAG, PropName::ADDRESS_DATA],
        }
    }

    /// Builds the XML body.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut prefixes = Prefixes::with(&[ns::DAV, ns::CARDDAV]);
        let root = XmlElement::new("CR:addressbook-query")
            .child(prefixes.prop(&self.props))
            .child(XmlElement::new("CR:filter"));
        build(prefixes, root)
    }
}

impl Default for AddressbookQueryRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of collection a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// `CalDAV` calendar.
    Calendar,
    /// `CardDAV` address book.
    Addressbook,
}

impl CollectionKind {
    /// Property that carries the inline object payload.
    #[must_use]
    pub const fn data_property(self) -> PropName {
        match self {
            Self::Calendar => PropName::CALENDAR_DATA,
            Self::Addressbook => PropName::ADDRESS_DATA,
        }
    }

    /// Property that points at the user's home set for this kind.
    #[must_use]
    pub const fn home_set_property(self) -> PropName {
        match self {
            Self::Calendar => PropName::CALENDAR_HOME_SET,
            Self::Addressbook => PropName::ADDRESSBOOK_HOME_SET,
        }
    }
}

/// `calendar-multiget` / `addressbook-multiget` REPORT builder.
#[derive(Debug, Clone)]
pub struct MultiGetRequest {
    kind: CollectionKind,
    hrefs: Vec<Href>,
}

impl MultiGetRequest {
    /// Creates an empty multiget of the given kind.
    #[must_use]
    pub const fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            hrefs: Vec::new(),
        }
    }

    /// Adds an href to the request.
    pub fn add_href(&mut self, href: Href) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Builds the XML body for the multiget request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let (root_name, namespace) = match self.kind {
            CollectionKind::Calendar => ("C:calendar-multiget", ns::CALDAV),
            CollectionKind::Addressbook => ("CR:addressbook-multiget", ns::CARDDAV),
        };
        let mut prefixes = Prefixes::with(&[ns::DAV, namespace]);
        let props = [PropName::GET_ETAG, self.kind.data_property()];

        let root = XmlElement::new(root_name)
            .child(prefixes.prop(&props))
            .children(
                self.hrefs
                    .iter()
                    .map(|href| XmlElement::new("D:href").text(href.as_str())),
            );
        build(prefixes, root)
    }
}
