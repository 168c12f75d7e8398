// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use crate::xml::ns;

macro_rules! opaque_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw string.
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Returns the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_string! {
    /// Resource href as reported by the server, e.g. `/calendars/user/event1.ics`.
    Href
}

opaque_string! {
    /// Entity tag for optimistic concurrency control.
    ///
    /// Kept verbatim, including the surrounding quotes, because servers compare
    /// `If-Match` byte-for-byte.
    ETag
}

opaque_string! {
    /// Collection-level tag that changes whenever any member changes.
    CTag
}

opaque_string! {
    /// Opaque RFC 6578 sync cursor. Equality is byte equality; `None` means
    /// "initial sync".
    SyncToken
}

/// `WebDAV` Depth header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The target resource only.
    Zero,
    /// The target and its immediate members.
    One,
    /// The whole subtree.
    Infinity,
}

impl Depth {
    /// Header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

/// Namespace-qualified property name.
///
/// Two names are equal iff both the namespace URI and the local name match,
/// so `DAV:getetag` never shadows an extension property of the same local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropName {
    namespace: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl PropName {
    /// `DAV:displayname`
    pub const DISPLAY_NAME: Self = Self::dav("displayname");
    /// `DAV:resourcetype`
    pub const RESOURCE_TYPE: Self = Self::dav("resourcetype");
    /// `DAV:getetag`
    pub const GET_ETAG: Self = Self::dav("getetag");
    /// `DAV:getlastmodified`
    pub const GET_LAST_MODIFIED: Self = Self::dav("getlastmodified");
    /// `DAV:getcontenttype`
    pub const GET_CONTENT_TYPE: Self = Self::dav("getcontenttype");
    /// `DAV:sync-token`
    pub const SYNC_TOKEN: Self = Self::dav("sync-token");
    /// `DAV:current-user-principal`
    pub const CURRENT_USER_PRINCIPAL: Self = Self::dav("current-user-principal");
    /// `DAV:supported-report-set`
    pub const SUPPORTED_REPORT_SET: Self = Self::dav("supported-report-set");
    /// `CS:getctag`
    pub const GET_CTAG: Self = Self::from_static(ns::CALENDARSERVER, "getctag");
    /// `C:calendar-home-set`
    pub const CALENDAR_HOME_SET: Self = Self::from_static(ns::CALDAV, "calendar-home-set");
    /// `C:calendar-data`
    pub const CALENDAR_DATA: Self = Self::from_static(ns::CALDAV, "calendar-data");
    /// `C:calendar-description`
    pub const CALENDAR_DESCRIPTION: Self =
        Self::from_static(ns::CALDAV, "calendar-description");
    /// `C:supported-calendar-component-set`
    pub const SUPPORTED_CALENDAR_COMPONENTS: Self =
        Self::from_static(ns::CALDAV, "supported-calendar-component-set");
    /// `CR:addressbook-home-set`
    pub const ADDRESSBOOK_HOME_SET: Self = Self::from_static(ns::CARDDAV, "addressbook-home-set");
    /// `CR:address-data`
    pub const ADDRESS_DATA: Self = Self::from_static(ns::CARDDAV, "address-data");
    /// `CR:addressbook-description`
    pub const ADDRESSBOOK_DESCRIPTION: Self =
        Self::from_static(ns::CARDDAV, "addressbook-description");

    const fn dav(name: &'static str) -> Self {
        Self::from_static(ns::DAV, name)
    }

    /// Creates a name from static strings, usable in constants.
    #[must_use]
    pub const fn from_static(namespace: &'static str, name: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed(namespace),
            name: Cow::Borrowed(name),
        }
    }

    /// Creates a name for an arbitrary extension property.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Cow::Owned(namespace.into()),
            name: Cow::Owned(name.into()),
        }
    }

    /// Namespace URI.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Local name, without any prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PropName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// A property reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Qualified name.
    pub name: PropName,
    /// String value; `None` for an empty element.
    ///
    /// Nested `href` values are surfaced as their text, and marker-element
    /// values such as `resourcetype` as a comma-joined token list.
    pub value: Option<String>,
}

/// Ordered set of properties keyed by [`PropName`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap(Vec<Property>);

impl PropertyMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts a property; the first occurrence of a name wins.
    pub fn insert(&mut self, property: Property) {
        if !self.contains(&property.name) {
            self.0.push(property);
        }
    }

    /// Looks up a property by qualified name.
    #[must_use]
    pub fn get(&self, name: &PropName) -> Option<&Property> {
        self.0.iter().find(|p| &p.name == name)
    }

    /// Returns the string value of a property, if present and non-empty.
    #[must_use]
    pub fn value(&self, name: &PropName) -> Option<&str> {
        self.get(name).and_then(|p| p.value.as_deref())
    }

    /// Whether the property was reported.
    #[must_use]
    pub fn contains(&self, name: &PropName) -> bool {
        self.get(name).is_some()
    }

    /// Splits a comma-joined token value, e.g. `resourcetype`.
    #[must_use]
    pub fn tokens(&self, name: &PropName) -> Vec<&str> {
        self.value(name)
            .map(|v| v.split(',').filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no property was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }
}

impl FromIterator<Property> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        let mut map = Self::new();
        for property in iter {
            map.insert(property);
        }
        map
    }
}

/// Collection metadata from a depth-1 listing of a home set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// The href of the collection.
    pub href: Href,
    /// Whether `resourcetype` contains `calendar`.
    pub is_calendar: bool,
    /// Whether `resourcetype` contains `addressbook`.
    pub is_addressbook: bool,
    /// The display name of the collection.
    pub display_name: Option<String>,
    /// Calendar or address book description.
    pub description: Option<String>,
    /// Supported component types (VEVENT, VTODO, etc.).
    pub supported_components: Vec<String>,
    /// Supported REPORT names, e.g. `sync-collection`.
    pub supported_reports: Vec<String>,
    /// The collection tag (`CTag`) for change detection.
    pub ctag: Option<CTag>,
    /// Current sync token, if the server reports one in listings.
    pub sync_token: Option<SyncToken>,
}

impl Collection {
    /// Whether the server advertises RFC 6578 for this collection.
    #[must_use]
    pub fn supports_sync_collection(&self) -> bool {
        self.supported_reports.iter().any(|r| r == "sync-collection")
    }
}

/// A calendar object or vCard returned by a query or multiget REPORT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavObject {
    /// Resource href as reported by the server.
    pub href: Href,
    /// Current `ETag`.
    pub etag: Option<ETag>,
    /// Inline `calendar-data` / `address-data`, when requested and returned.
    pub payload: Option<Vec<u8>>,
}
