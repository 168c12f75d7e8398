// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Server capability detection from an OPTIONS response.

use std::collections::BTreeSet;

/// Known server implementations.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFamily {
    /// iCloud / Apple `CalendarServer`.
    Apple,
    /// Google Calendar / Contacts.
    Google,
    /// Nextcloud or ownCloud (`SabreDAV` based).
    Nextcloud,
    /// Plain `SabreDAV`, including Baïkal.
    Sabre,
    /// Radicale.
    Radicale,
    /// Cyrus IMAP, including Fastmail.
    Cyrus,
    /// `DAViCal`.
    Davical,
    /// Zimbra.
    Zimbra,
    /// Anything else.
    Generic,
}

impl ServerFamily {
    /// Guesses the family from the `Server` header and DAV classes.
    #[must_use]
    pub fn detect(server: Option<&str>, classes: &BTreeSet<String>) -> Self {
        let server = server.unwrap_or_default().to_ascii_lowercase();
        let has = |needle: &str| server.contains(needle);

        if has("nextcloud") || has("owncloud") || classes.contains("nc-calendar-search") {
            Self::Nextcloud
        } else if has("calendarserver") || has("icloud") || has("apple") {
            Self::Apple
        } else if has("gse") || has("google") || has("esf") {
            Self::Google
        } else if has("sabre") || has("baikal") {
            Self::Sabre
        } else if has("radicale") {
            Self::Radicale
        } else if has("cyrus") || has("fastmail") {
            Self::Cyrus
        } else if has("davical") {
            Self::Davical
        } else if has("zimbra") {
            Self::Zimbra
        } else {
            Self::Generic
        }
    }

    /// Whether this family is known to implement RFC 6578 sync-collection
    /// even when its DAV header does not say so.
    #[must_use]
    pub const fn implements_sync_collection(self) -> bool {
        matches!(
            self,
            Self::Apple | Self::Google | Self::Nextcloud | Self::Sabre | Self::Radicale | Self::Cyrus
        )
    }
}

/// What the server at a base URL supports. Immutable once detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    /// Detected implementation.
    pub family: ServerFamily,
    /// Raw DAV compliance classes, lower-cased.
    pub classes: BTreeSet<String>,
    /// RFC 6578 `sync-collection` REPORT.
    pub supports_sync_collection: bool,
    /// RFC 4791 `calendar-access`.
    pub supports_calendar_access: bool,
    /// RFC 6352 `addressbook`.
    pub supports_addressbook: bool,
    /// RFC 6638 scheduling.
    pub supports_scheduling: bool,
    /// RFC 5689 extended MKCOL.
    pub supports_extended_mkcol: bool,
}

impl ServerCapabilities {
    /// Derives capabilities from the `DAV` and `Server` response headers.
    #[must_use]
    pub fn from_headers(dav: Option<&str>, server: Option<&str>) -> Self {
        let classes: BTreeSet<String> = dav
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        let family = ServerFamily::detect(server, &classes);

        Self {
            family,
            supports_sync_collection: classes.contains("sync-collection")
                || family.implements_sync_collection(),
            supports_calendar_access: classes.contains("calendar-access"),
            supports_addressbook: classes.contains("addressbook"),
            supports_scheduling: classes.contains("calendar-auto-schedule")
                || classes.contains("calendar-schedule"),
            supports_extended_mkcol: classes.contains("extended-mkcol"),
            classes,
        }
    }
}
