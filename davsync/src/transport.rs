// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The HTTP capability consumed by the protocol engine.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};

use crate::config::DavConfig;
use crate::error::DavError;
use crate::types::{Depth, ETag};

/// An outbound request.
#[derive(Debug, Clone)]
pub struct DavRequest {
    /// HTTP method, including extension methods such as PROPFIND.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(&'static str, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl DavRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// PROPFIND with the given depth.
    ///
    /// # Errors
    ///
    /// Returns an error if the method name is rejected.
    pub fn propfind(url: impl Into<String>, depth: Depth) -> Result<Self, DavError> {
        Ok(Self::new(extension_method(b"PROPFIND")?, url).header("Depth", depth.as_str()))
    }

    /// REPORT with the given depth.
    ///
    /// # Errors
    ///
    /// Returns an error if the method name is rejected.
    pub fn report(url: impl Into<String>, depth: Depth) -> Result<Self, DavError> {
        Ok(Self::new(extension_method(b"REPORT")?, url).header("Depth", depth.as_str()))
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Replaces any header with the same name.
    #[must_use]
    pub fn set_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.header(name, value)
    }

    /// Sets an XML body.
    #[must_use]
    pub fn xml_body(self, body: String) -> Self {
        let mut req = self.set_header("Content-Type", "application/xml; charset=utf-8");
        req.body = Some(body.into_bytes());
        req
    }

    /// Sets a body with an explicit content type.
    #[must_use]
    pub fn body(self, content_type: &str, body: Vec<u8>) -> Self {
        let mut req = self.set_header("Content-Type", content_type);
        req.body = Some(body);
        req
    }

    /// Adds If-Match header for conditional updates.
    #[must_use]
    pub fn if_match(self, etag: &ETag) -> Self {
        self.set_header("If-Match", etag.as_str())
    }

    /// Adds `If-None-Match: *` for conditional creation.
    #[must_use]
    pub fn if_none_match_any(self) -> Self {
        self.set_header("If-None-Match", "*")
    }
}

fn extension_method(name: &'static [u8]) -> Result<Method, DavError> {
    Method::from_bytes(name).map_err(|e| DavError::Config(format!("Invalid method: {e}")))
}

/// A received response.
#[derive(Debug, Clone)]
pub struct DavResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Full response body.
    pub body: Vec<u8>,
}

impl DavResponse {
    /// Header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a repeatable header joined with `, `, as RFC 9110
    /// allows for list-valued fields such as `DAV`.
    #[must_use]
    pub fn header_list(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    /// `ETag` response header.
    #[must_use]
    pub fn etag(&self) -> Option<ETag> {
        self.header("ETag").map(ETag::from)
    }

    /// Builds a protocol error describing this response.
    #[must_use]
    pub fn into_error(self, request: &DavRequest) -> DavError {
        DavError::protocol(
            request.method.as_str(),
            &request.url,
            self.status.as_u16(),
            &self.body,
        )
    }
}

/// Sends requests and returns complete responses.
///
/// Implementations return `Ok` for every HTTP status; only failures to obtain
/// a response at all are errors ([`DavError::Network`]).
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs one request.
    async fn send(&self, request: DavRequest) -> Result<DavResponse, DavError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport using the timeout and user agent from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: &DavConfig) -> Result<Self, DavError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DavError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: DavRequest) -> Result<DavResponse, DavError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        tracing::debug!(%status, len = body.len(), "received response");
        Ok(DavResponse {
            status,
            headers,
            body,
        })
    }
}
