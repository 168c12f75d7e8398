// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::conflict::Conflict;

/// Errors raised by the DAV protocol layer.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DavError {
    /// No HTTP response was obtained (connection refused, timeout, broken body).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a status code the operation cannot handle.
    #[error("Unexpected status {status} for {method} {url}")]
    Protocol {
        /// Request method.
        method: String,
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The server no longer recognizes the sync token; restart with no token.
    #[error("Sync token expired for {0}, a full resync is required")]
    SyncTokenExpired(String),

    /// A conditional write was rejected with 412.
    #[error("Precondition failed for {}", .0.href)]
    PreconditionFailed(Box<Conflict>),

    /// Authorization was refused after the single refresh-and-retry attempt.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed XML or JSON, or a required property is missing.
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// XML request body could not be written.
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid configuration, URL or header value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DavError {
    /// Builds a [`DavError::Protocol`] from a response that was not expected.
    pub(crate) fn protocol(method: &str, url: &str, status: u16, body: &[u8]) -> Self {
        Self::Protocol {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// Returns the HTTP status carried by a protocol error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Config(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<quick_xml::Error> for DavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Parsing(e.to_string())
    }
}
