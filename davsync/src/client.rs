// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! DAV client: cached per-server state plus the plain request/response
//! operations (listing, queries, conditional writes).

use std::sync::Arc;

use jiff::Timestamp;
use reqwest::{Method, StatusCode, Url};
use tokio::sync::Mutex;

use crate::capabilities::ServerCapabilities;
use crate::config::DavConfig;
use crate::conflict::{Conflict, ConflictStrategy, Resolution, Version, WriteOutcome, duplicate_href};
use crate::discovery::Discovery;
use crate::error::DavError;
use crate::http::AuthenticatedTransport;
use crate::request::{
    AddressbookQueryRequest, CalendarQueryRequest, CollectionKind, MultiGetRequest,
    PropFindRequest,
};
use crate::response::MultiStatusResponse;
use crate::transport::{DavRequest, DavResponse, Transport};
use crate::types::{Collection, DavObject, Depth, ETag, Href, PropName};

/// Per-client cached state. Never locked across a network call.
#[derive(Debug)]
pub(crate) struct ClientState {
    pub base_url: Url,
    /// Bumped whenever `base_url` changes; results computed against an older
    /// generation are not cached.
    pub generation: u64,
    pub discovery: Discovery,
    pub capabilities: Option<(Url, ServerCapabilities)>,
}

/// `WebDAV`/`CalDAV`/`CardDAV` client.
///
/// Cloning is cheap and clones share the transport and cached discovery and
/// capability state.
///
/// # Example
///
/// ```ignore
/// use davsync::{AuthMethod, DavClient, DavConfig, SyncOptions};
///
/// # async fn example() -> Result<(), davsync::DavError> {
/// let client = DavClient::new(DavConfig {
///     base_url: "https://dav.example.com/".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// })?;
///
/// let home = client.discover_home_set(davsync::CollectionKind::Calendar).await?;
/// for collection in client.list_collections(&home.as_str().into()).await? {
///     let result = client.sync(&collection.href, None, &SyncOptions::default()).await?;
///     println!("{}: {} changes", collection.href, result.changes.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DavClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) state: Arc<Mutex<ClientState>>,
}

enum Precondition<'a> {
    None,
    IfMatch(&'a ETag),
    IfNoneMatch,
}

impl DavClient {
    /// Creates a client with an authenticated HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or HTTP client
    /// initialization fails.
    pub fn new(config: DavConfig) -> Result<Self, DavError> {
        let transport = AuthenticatedTransport::new(&config)?;
        Self::with_transport(&config.base_url, Arc::new(transport))
    }

    /// Creates a client over an existing transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Result<Self, DavError> {
        let base_url = parse_url(base_url)?;
        Ok(Self {
            transport,
            state: Arc::new(Mutex::new(ClientState {
                base_url,
                generation: 0,
                discovery: Discovery::default(),
                capabilities: None,
            })),
        })
    }

    /// The transport requests go through.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Current base URL.
    pub async fn base_url(&self) -> Url {
        self.state.lock().await.base_url.clone()
    }

    /// Points the client at a different server root. Discovery results and
    /// detected capabilities are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub async fn set_base_url(&self, base_url: &str) -> Result<(), DavError> {
        let base_url = parse_url(base_url)?;
        let mut state = self.state.lock().await;
        if state.base_url != base_url {
            tracing::info!(from = %state.base_url, to = %base_url, "base URL changed, resetting caches");
            state.base_url = base_url;
            state.generation += 1;
            state.discovery = Discovery::default();
            state.capabilities = None;
        }
        Ok(())
    }

    /// Resolves an absolute or relative href against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Config`] if the href cannot be joined.
    pub async fn resolve(&self, href: &str) -> Result<Url, DavError> {
        let base = self.base_url().await;
        join_url(&base, href)
    }

    /// Runs `apply` on the cached state unless the base URL changed since
    /// `generation` was observed.
    pub(crate) async fn commit(&self, generation: u64, apply: impl FnOnce(&mut ClientState)) {
        let mut state = self.state.lock().await;
        if state.generation == generation {
            apply(&mut state);
        } else {
            tracing::debug!("base URL changed during request, result not cached");
        }
    }

    /// PROPFIND that must answer 207.
    pub(crate) async fn propfind(
        &self,
        url: &Url,
        depth: Depth,
        props: &[PropName],
    ) -> Result<MultiStatusResponse, DavError> {
        let body = PropFindRequest::with_props(props.iter().cloned()).build()?;
        let request = DavRequest::propfind(url.as_str(), depth)?.xml_body(body);
        self.multistatus(request).await
    }

    /// REPORT that must answer 207.
    pub(crate) async fn report(
        &self,
        url: &Url,
        depth: Depth,
        body: String,
    ) -> Result<MultiStatusResponse, DavError> {
        let request = DavRequest::report(url.as_str(), depth)?.xml_body(body);
        self.multistatus(request).await
    }

    async fn multistatus(&self, request: DavRequest) -> Result<MultiStatusResponse, DavError> {
        let resp = self.transport.send(request.clone()).await?;
        if resp.status != StatusCode::MULTI_STATUS {
            return Err(resp.into_error(&request));
        }
        MultiStatusResponse::from_xml(&resp.body)
    }

    /// Detects what the server supports with an OPTIONS request on the base
    /// URL. The result is cached until the base URL changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the OPTIONS request fails or answers with a non-2xx status.
    #[tracing::instrument(skip(self))]
    pub async fn capabilities(&self) -> Result<ServerCapabilities, DavError> {
        let (base, generation) = {
            let state = self.state.lock().await;
            if let Some((url, caps)) = &state.capabilities {
                if *url == state.base_url {
                    return Ok(caps.clone());
                }
            }
            (state.base_url.clone(), state.generation)
        };

        let request = DavRequest::new(Method::OPTIONS, base.as_str());
        let resp = self.transport.send(request.clone()).await?;
        if !resp.status.is_success() {
            return Err(resp.into_error(&request));
        }

        let dav = resp.header_list("DAV");
        let caps = ServerCapabilities::from_headers(dav.as_deref(), resp.header("Server"));
        tracing::info!(family = ?caps.family, sync_collection = caps.supports_sync_collection, "detected server capabilities");

        let cached = caps.clone();
        self.commit(generation, |state| state.capabilities = Some((base, cached)))
            .await;
        Ok(caps)
    }

    /// Fetches a resource with its `ETag` and `Last-Modified`.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Protocol`] for any non-2xx status, including 404.
    pub async fn get(&self, href: &Href) -> Result<Version, DavError> {
        let url = self.resolve(href).await?;
        let request = DavRequest::new(Method::GET, url.as_str());
        let resp = self.transport.send(request.clone()).await?;
        if !resp.status.is_success() {
            return Err(resp.into_error(&request));
        }

        let last_modified = resp.header("Last-Modified").and_then(parse_http_date);
        Ok(Version {
            etag: resp.etag(),
            last_modified,
            payload: resp.body,
        })
    }

    /// Uploads `version.payload`.
    ///
    /// With an `ETag` the write is conditional on `If-Match`; without one it
    /// is a create guarded by `If-None-Match: *`. Returns the new `ETag` when
    /// the server reports one.
    ///
    /// # Errors
    ///
    /// A 412 is returned as [`DavError::PreconditionFailed`] carrying the local
    /// version and the remote version fetched right after the failure. Other
    /// non-2xx statuses are protocol errors.
    #[tracing::instrument(skip(self, version), fields(href = %href))]
    pub async fn put(
        &self,
        href: &Href,
        version: &Version,
        content_type: &str,
    ) -> Result<Option<ETag>, DavError> {
        let precondition = match &version.etag {
            Some(etag) => Precondition::IfMatch(etag),
            None => Precondition::IfNoneMatch,
        };
        let (request, resp) = self
            .send_put(href, version.payload.clone(), content_type, precondition)
            .await?;

        if resp.status == StatusCode::PRECONDITION_FAILED {
            tracing::info!("precondition failed, fetching remote version");
            let remote = self.get(href).await?;
            return Err(DavError::PreconditionFailed(Box::new(Conflict {
                href: href.clone(),
                local: version.clone(),
                remote,
            })));
        }
        stored_etag(request, resp)
    }

    async fn send_put(
        &self,
        href: &Href,
        payload: Vec<u8>,
        content_type: &str,
        precondition: Precondition<'_>,
    ) -> Result<(DavRequest, DavResponse), DavError> {
        let url = self.resolve(href).await?;
        let mut request = DavRequest::new(Method::PUT, url.as_str()).body(content_type, payload);
        request = match precondition {
            Precondition::None => request,
            Precondition::IfMatch(etag) => request.if_match(etag),
            Precondition::IfNoneMatch => request.if_none_match_any(),
        };
        let resp = self.transport.send(request.clone()).await?;
        Ok((request, resp))
    }

    /// Uploads a local version and settles a 412 with `strategy`.
    ///
    /// The strategy performs at most one further write; a conflict raised by
    /// that write is returned, not retried.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::PreconditionFailed`] for [`ConflictStrategy::Fail`]
    /// or when the follow-up write conflicts again, and any transport or
    /// protocol error.
    #[tracing::instrument(skip(self, local, strategy), fields(href = %href))]
    pub async fn write_back(
        &self,
        href: &Href,
        local: &Version,
        content_type: &str,
        strategy: &ConflictStrategy,
    ) -> Result<WriteOutcome, DavError> {
        let conflict = match self.put(href, local, content_type).await {
            Ok(etag) => {
                return Ok(WriteOutcome::Stored {
                    href: href.clone(),
                    etag,
                });
            }
            Err(DavError::PreconditionFailed(conflict)) => conflict,
            Err(e) => return Err(e),
        };

        tracing::info!(?strategy, "resolving write conflict");
        match strategy.resolve(&conflict) {
            Resolution::Overwrite(payload) => {
                let (request, resp) = self
                    .send_put(href, payload, content_type, Precondition::None)
                    .await?;
                let etag = stored_etag(request, resp)?;
                Ok(WriteOutcome::Stored {
                    href: href.clone(),
                    etag,
                })
            }
            Resolution::AdoptRemote(remote) => Ok(WriteOutcome::AdoptedRemote(remote)),
            Resolution::Duplicate(payload) => {
                let target = duplicate_href(href);
                tracing::info!(duplicate = %target, "storing local version as a duplicate");
                let (request, resp) = self
                    .send_put(&target, payload, content_type, Precondition::IfNoneMatch)
                    .await?;
                let etag = stored_etag(request, resp)?;
                Ok(WriteOutcome::Stored { href: target, etag })
            }
            Resolution::Replace { payload, if_match } => {
                let etag = match if_match {
                    Some(etag) => {
                        let merged = Version::new(Some(etag), payload);
                        self.put(href, &merged, content_type).await?
                    }
                    // No remote ETag to guard on; `If-None-Match: *` would
                    // always fail against the existing resource.
                    None => {
                        let (request, resp) = self
                            .send_put(href, payload, content_type, Precondition::None)
                            .await?;
                        stored_etag(request, resp)?
                    }
                };
                Ok(WriteOutcome::Stored {
                    href: href.clone(),
                    etag,
                })
            }
            Resolution::Fail => Err(DavError::PreconditionFailed(conflict)),
        }
    }

    /// Deletes a resource, optionally guarded by `If-Match`. A 404 means it
    /// is already gone and is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Protocol`] for other non-2xx statuses, including a
    /// 412 when `etag` no longer matches.
    #[tracing::instrument(skip(self), fields(href = %href))]
    pub async fn delete(&self, href: &Href, etag: Option<&ETag>) -> Result<(), DavError> {
        let url = self.resolve(href).await?;
        let mut request = DavRequest::new(Method::DELETE, url.as_str());
        if let Some(etag) = etag {
            request = request.if_match(etag);
        }

        let resp = self.transport.send(request.clone()).await?;
        if resp.status == StatusCode::NOT_FOUND {
            tracing::debug!("resource already absent");
            return Ok(());
        }
        if !resp.status.is_success() {
            return Err(resp.into_error(&request));
        }
        Ok(())
    }

    /// Lists the collections directly under a home set.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    #[tracing::instrument(skip(self), fields(home = %home))]
    pub async fn list_collections(&self, home: &Href) -> Result<Vec<Collection>, DavError> {
        let url = self.resolve(home).await?;
        let props = [
            PropName::RESOURCE_TYPE,
            PropName::DISPLAY_NAME,
            PropName::CALENDAR_DESCRIPTION,
            PropName::ADDRESSBOOK_DESCRIPTION,
            PropName::SUPPORTED_CALENDAR_COMPONENTS,
            PropName::SUPPORTED_REPORT_SET,
            PropName::GET_CTAG,
            PropName::SYNC_TOKEN,
        ];
        let multistatus = self.propfind(&url, Depth::One, &props).await?;

        let collections: Vec<Collection> = multistatus
            .responses
            .iter()
            .filter(|r| r.is_success() && !is_same_resource(&url, &r.href))
            .filter(|r| r.props.tokens(&PropName::RESOURCE_TYPE).contains(&"collection"))
            .map(crate::response::ResourceEntry::to_collection)
            .collect();

        tracing::debug!(count = collections.len(), "listed collections");
        Ok(collections)
    }

    /// Runs a `calendar-query` REPORT against a calendar collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn calendar_query(
        &self,
        collection: &Href,
        query: &CalendarQueryRequest,
    ) -> Result<Vec<DavObject>, DavError> {
        let url = self.resolve(collection).await?;
        let multistatus = self.report(&url, Depth::One, query.build()?).await?;
        Ok(objects(&url, multistatus, &PropName::CALENDAR_DATA))
    }

    /// Fetches every vCard of an address book with an unrestricted
    /// `addressbook-query` REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn addressbook_query(&self, collection: &Href) -> Result<Vec<DavObject>, DavError> {
        let url = self.resolve(collection).await?;
        let body = AddressbookQueryRequest::new().build()?;
        let multistatus = self.report(&url, Depth::One, body).await?;
        Ok(objects(&url, multistatus, &PropName::ADDRESS_DATA))
    }

    /// Fetches several members of a collection in one multiget REPORT.
    /// Members the server reports as missing are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn multiget(
        &self,
        collection: &Href,
        kind: CollectionKind,
        hrefs: impl IntoIterator<Item = Href>,
    ) -> Result<Vec<DavObject>, DavError> {
        let url = self.resolve(collection).await?;
        let mut request = MultiGetRequest::new(kind);
        for href in hrefs {
            request.add_href(href);
        }
        let multistatus = self.report(&url, Depth::One, request.build()?).await?;
        Ok(objects(&url, multistatus, &kind.data_property()))
    }
}

fn objects(collection: &Url, multistatus: MultiStatusResponse, data: &PropName) -> Vec<DavObject> {
    multistatus
        .responses
        .into_iter()
        .filter(|r| !is_same_resource(collection, &r.href))
        .filter_map(|r| {
            if !r.is_success() {
                tracing::debug!(href = %r.href, status = ?r.response_status, "skipping unavailable member");
                return None;
            }
            Some(DavObject {
                etag: r.etag(),
                payload: r.props.value(data).map(|v| v.as_bytes().to_vec()),
                href: r.href,
            })
        })
        .collect()
}

fn stored_etag(request: DavRequest, resp: DavResponse) -> Result<Option<ETag>, DavError> {
    if !resp.status.is_success() {
        return Err(resp.into_error(&request));
    }
    Ok(resp.etag())
}

fn parse_url(url: &str) -> Result<Url, DavError> {
    Url::parse(url).map_err(|e| DavError::Config(format!("Invalid URL {url:?}: {e}")))
}

/// Joins an absolute or relative href onto `base`.
pub(crate) fn join_url(base: &Url, href: &str) -> Result<Url, DavError> {
    base.join(href)
        .map_err(|e| DavError::Config(format!("Cannot resolve {href:?} against {base}: {e}")))
}

/// Whether `href` names the resource at `url`, ignoring a trailing slash.
pub(crate) fn is_same_resource(url: &Url, href: &Href) -> bool {
    join_url(url, href).is_ok_and(|other| {
        other.host_str() == url.host_str()
            && other.path().trim_end_matches('/') == url.path().trim_end_matches('/')
    })
}

/// Parses an HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`).
fn parse_http_date(value: &str) -> Option<Timestamp> {
    match jiff::fmt::rfc2822::parse(value) {
        Ok(zoned) => Some(zoned.timestamp()),
        Err(e) => {
            tracing::debug!(value, error = %e, "ignoring unparsable Last-Modified");
            None
        }
    }
}
