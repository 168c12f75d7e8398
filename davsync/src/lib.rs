// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Delta synchronization engine for `CalDAV` (RFC 4791) and `CardDAV` (RFC 6352)
//! collections.
//!
//! The crate speaks the `WebDAV` side of the protocols: multistatus parsing,
//! request bodies, principal and home-set discovery, RFC 6578
//! `sync-collection`, a `CTag`/`ETag` fallback for servers without it,
//! conditional write-back with conflict resolution, and OAuth2 token refresh.
//! Payloads are passed through as opaque bytes.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod capabilities;
mod client;
mod config;
mod conflict;
mod discovery;
mod error;
mod fallback;
mod http;
mod oauth;
mod request;
mod response;
mod sync;
mod transport;
mod types;
mod xml;

pub use crate::capabilities::{ServerCapabilities, ServerFamily};
pub use crate::client::DavClient;
pub use crate::config::{AuthMethod, DavConfig, OAuth2Config, SyncOptions};
pub use crate::conflict::{
    Conflict, ConflictStrategy, MergeFn, Resolution, Version, WriteOutcome, duplicate_href,
};
pub use crate::discovery::DiscoveryState;
pub use crate::error::DavError;
pub use crate::fallback::{ETagDiff, diff_etags};
pub use crate::http::AuthenticatedTransport;
pub use crate::oauth::{OAuth2TokenManager, REFRESH_BUFFER, TokenState};
pub use crate::request::{
    AddressbookQueryRequest, CalendarQueryRequest, CollectionKind, MultiGetRequest,
    PropFindRequest, SyncCollectionRequest, TimeRange,
};
pub use crate::response::{MultiStatusResponse, ResourceEntry, status_code};
pub use crate::sync::{
    CollectionState, LocalMirror, MirroredResource, SyncChange, SyncMethod, SyncOutcome,
    SyncResult,
};
pub use crate::transport::{DavRequest, DavResponse, HttpTransport, Transport};
pub use crate::types::{
    CTag, Collection, DavObject, Depth, ETag, Href, PropName, Property, PropertyMap, SyncToken,
};
pub use crate::xml::{XmlDocument, XmlElement, ns};
