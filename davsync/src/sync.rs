// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Delta synchronization with RFC 6578 `sync-collection`, and strategy
//! selection between it and the `CTag`/`ETag` fallback.

use std::collections::{BTreeMap, HashMap};

use reqwest::StatusCode;

use crate::client::{DavClient, is_same_resource};
use crate::config::SyncOptions;
use crate::error::DavError;
use crate::request::SyncCollectionRequest;
use crate::response::{MultiStatusResponse, ResourceEntry};
use crate::transport::DavRequest;
use crate::types::{CTag, Depth, ETag, Href, PropName, SyncToken};

/// One change to a collection member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncChange {
    /// Member that is new since the previous token, or any member on an
    /// initial sync.
    Added {
        /// Member href.
        href: Href,
        /// Current `ETag`.
        etag: Option<ETag>,
        /// Object payload, when fetched.
        payload: Option<Vec<u8>>,
    },
    /// Member that changed since the previous token.
    Modified {
        /// Member href.
        href: Href,
        /// Current `ETag`.
        etag: Option<ETag>,
        /// Object payload, when fetched.
        payload: Option<Vec<u8>>,
    },
    /// Member that no longer exists.
    Deleted {
        /// Member href.
        href: Href,
    },
}

impl SyncChange {
    /// Href of the affected member.
    #[must_use]
    pub const fn href(&self) -> &Href {
        match self {
            Self::Added { href, .. } | Self::Modified { href, .. } | Self::Deleted { href } => href,
        }
    }

    /// `ETag` carried by an addition or modification.
    #[must_use]
    pub const fn etag(&self) -> Option<&ETag> {
        match self {
            Self::Added { etag, .. } | Self::Modified { etag, .. } => etag.as_ref(),
            Self::Deleted { .. } => None,
        }
    }

    /// Payload carried by an addition or modification.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Added { payload, .. } | Self::Modified { payload, .. } => payload.as_deref(),
            Self::Deleted { .. } => None,
        }
    }

    /// Whether this is a deletion.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

/// Result of one `sync-collection` REPORT.
///
/// The token describes the collection after *every* listed change; apply the
/// whole result or none of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// Token to persist for the next call.
    pub token: SyncToken,
    /// Changes in server order.
    pub changes: Vec<SyncChange>,
    /// Whether the request carried no token.
    pub initial: bool,
    /// The server capped the result (507 on the collection itself); sync
    /// again with `token` to get the rest.
    pub truncated: bool,
}

fn classify(entry: ResourceEntry, initial: bool, data_property: Option<&PropName>) -> SyncChange {
    if entry.is_not_found() {
        return SyncChange::Deleted { href: entry.href };
    }

    let etag = entry.etag();
    let payload = data_property
        .and_then(|p| entry.props.value(p))
        .map(|v| v.as_bytes().to_vec());
    if initial {
        SyncChange::Added {
            href: entry.href,
            etag,
            payload,
        }
    } else {
        SyncChange::Modified {
            href: entry.href,
            etag,
            payload,
        }
    }
}

impl DavClient {
    /// Runs a `sync-collection` REPORT (`sync-level` 1, `Depth: 0`) against
    /// a collection.
    ///
    /// `token` is the value persisted from the previous call; `None` requests
    /// a full listing. With [`SyncOptions::fetch_full_data`] every added or
    /// modified member gets its payload, inline when the server returns the
    /// data property and by GET otherwise. A member whose GET answers 404 was
    /// deleted while the batch was being read and is reported as deleted.
    ///
    /// # Errors
    ///
    /// - [`DavError::SyncTokenExpired`] on 410 or 403, with or without a
    ///   token; restart with `None`.
    /// - [`DavError::Parsing`] if the 207 body is malformed or has no
    ///   `sync-token`.
    /// - [`DavError::Protocol`] for any other status.
    #[tracing::instrument(skip(self, token, options), fields(collection = %collection))]
    pub async fn sync(
        &self,
        collection: &Href,
        token: Option<&SyncToken>,
        options: &SyncOptions,
    ) -> Result<SyncResult, DavError> {
        let url = self.resolve(collection).await?;
        let initial = token.is_none();

        let mut props = options.props.clone();
        if options.fetch_full_data && !props.contains(&options.data_property) {
            props.push(options.data_property.clone());
        }
        let mut body = SyncCollectionRequest::new(token.cloned()).props(props);
        if let Some(limit) = options.limit {
            body = body.limit(limit);
        }

        let request = DavRequest::report(url.as_str(), Depth::Zero)?.xml_body(body.build()?);
        let resp = self.transport.send(request.clone()).await?;
        match resp.status {
            StatusCode::MULTI_STATUS => {}
            StatusCode::GONE | StatusCode::FORBIDDEN => {
                tracing::warn!(status = %resp.status, initial, "sync token rejected");
                return Err(DavError::SyncTokenExpired(url.to_string()));
            }
            _ => return Err(resp.into_error(&request)),
        }

        let multistatus = MultiStatusResponse::from_xml(&resp.body)?;
        let new_token = multistatus.sync_token.ok_or_else(|| {
            DavError::Parsing(format!("sync-collection response for {url} has no sync-token"))
        })?;

        let data_property = options.fetch_full_data.then_some(&options.data_property);
        let mut truncated = false;
        let mut changes = Vec::with_capacity(multistatus.responses.len());
        for entry in multistatus.responses {
            if is_same_resource(&url, &entry.href) {
                if entry.response_code() == Some(507) {
                    truncated = true;
                }
                continue;
            }
            changes.push(classify(entry, initial, data_property));
        }

        if options.fetch_full_data {
            self.fetch_payloads(&mut changes).await?;
        }

        tracing::info!(
            changes = changes.len(),
            initial,
            truncated,
            "sync-collection completed"
        );
        Ok(SyncResult {
            token: new_token,
            changes,
            initial,
            truncated,
        })
    }

    /// Fills in missing payloads with GET. Members that answer 404 become
    /// deletions; any other failure aborts the whole batch.
    pub(crate) async fn fetch_payloads(&self, changes: &mut [SyncChange]) -> Result<(), DavError> {
        for change in changes.iter_mut() {
            if change.is_deleted() || change.payload().is_some() {
                continue;
            }
            let href = change.href().clone();

            match self.get(&href).await {
                Ok(version) => {
                    if let SyncChange::Added { etag, payload, .. }
                    | SyncChange::Modified { etag, payload, .. } = change
                    {
                        if version.etag.is_some() {
                            *etag = version.etag;
                        }
                        *payload = Some(version.payload);
                    }
                }
                Err(e) if e.status() == Some(404) => {
                    tracing::debug!(%href, "member vanished before it could be fetched");
                    *change = SyncChange::Deleted { href };
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Brings a collection up to date using the best mechanism the server
    /// offers.
    ///
    /// Servers with `sync-collection` get a delta sync from
    /// `state.sync_token`; an expired token restarts the sync once from
    /// scratch. Otherwise an unchanged `CTag` short-circuits, and an `ETag`
    /// listing is diffed against `state.etags`.
    ///
    /// # Errors
    ///
    /// Returns any error of the underlying requests, including a failure of
    /// the restarted sync.
    #[tracing::instrument(skip(self, state, options), fields(collection = %collection))]
    pub async fn synchronize(
        &self,
        collection: &Href,
        state: &CollectionState,
        options: &SyncOptions,
    ) -> Result<SyncOutcome, DavError> {
        let capabilities = self.capabilities().await?;
        if capabilities.supports_sync_collection {
            let result = match self
                .sync(collection, state.sync_token.as_ref(), options)
                .await
            {
                Err(DavError::SyncTokenExpired(url)) if state.sync_token.is_some() => {
                    tracing::warn!(%url, "sync token expired, restarting from scratch");
                    self.sync(collection, None, options).await?
                }
                other => other?,
            };
            return Ok(SyncOutcome::from_delta(state, result));
        }

        let ctag = self.get_collection_tag(collection).await?;
        if ctag.is_some() && ctag == state.ctag {
            tracing::debug!("collection tag unchanged");
            return Ok(SyncOutcome {
                state: state.clone(),
                changes: Vec::new(),
                method: SyncMethod::CTagUnchanged,
                truncated: false,
            });
        }

        let diff = self.diff_by_etag(collection, &state.etags).await?;
        let mut changes = diff.changes;
        if options.fetch_full_data {
            self.fetch_payloads(&mut changes).await?;
        }
        Ok(SyncOutcome {
            state: CollectionState {
                sync_token: None,
                ctag,
                etags: diff.etags,
            },
            changes,
            method: SyncMethod::ETagDiff,
            truncated: false,
        })
    }
}

/// What the caller persists between [`DavClient::synchronize`] calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CollectionState {
    /// Last `sync-collection` token.
    #[serde(default)]
    pub sync_token: Option<SyncToken>,
    /// Last collection tag.
    #[serde(default)]
    pub ctag: Option<CTag>,
    /// Known member `ETag`s.
    #[serde(default)]
    pub etags: HashMap<Href, ETag>,
}

/// Mechanism [`DavClient::synchronize`] used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMethod {
    /// RFC 6578 delta sync.
    SyncCollection,
    /// Collection tag unchanged; nothing was listed.
    CTagUnchanged,
    /// Full `ETag` listing diffed against the known map.
    ETagDiff,
}

/// Result of [`DavClient::synchronize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// State to persist once `changes` have been applied.
    pub state: CollectionState,
    /// Changes to apply, as one batch.
    pub changes: Vec<SyncChange>,
    /// How the changes were obtained.
    pub method: SyncMethod,
    /// More changes are pending on the server.
    pub truncated: bool,
}

impl SyncOutcome {
    fn from_delta(previous: &CollectionState, result: SyncResult) -> Self {
        let mut etags = if result.initial {
            HashMap::new()
        } else {
            previous.etags.clone()
        };
        for change in &result.changes {
            match change.etag() {
                Some(etag) if !change.is_deleted() => {
                    etags.insert(change.href().clone(), etag.clone());
                }
                _ => {
                    etags.remove(change.href());
                }
            }
        }

        Self {
            state: CollectionState {
                sync_token: Some(result.token),
                ctag: previous.ctag.clone(),
                etags,
            },
            changes: result.changes,
            method: SyncMethod::SyncCollection,
            truncated: result.truncated,
        }
    }
}

/// A member held by a [`LocalMirror`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredResource {
    /// Last known `ETag`.
    pub etag: Option<ETag>,
    /// Last known payload.
    pub payload: Option<Vec<u8>>,
}

/// In-memory copy of a collection, updated one whole batch at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMirror {
    token: Option<SyncToken>,
    resources: BTreeMap<Href, MirroredResource>,
}

impl LocalMirror {
    /// Creates an empty mirror with no token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the mirror is current as of.
    #[must_use]
    pub const fn token(&self) -> Option<&SyncToken> {
        self.token.as_ref()
    }

    /// Mirrored members by href.
    #[must_use]
    pub const fn resources(&self) -> &BTreeMap<Href, MirroredResource> {
        &self.resources
    }

    /// Applies a sync result. An initial result replaces the whole mirror.
    pub fn apply(&mut self, result: &SyncResult) {
        if result.initial {
            self.resources.clear();
        }
        self.apply_changes(&result.changes);
        self.token = Some(result.token.clone());
    }

    /// Applies a batch of changes in order.
    pub fn apply_changes(&mut self, changes: &[SyncChange]) {
        for change in changes {
            match change {
                SyncChange::Added {
                    href,
                    etag,
                    payload,
                }
                | SyncChange::Modified {
                    href,
                    etag,
                    payload,
                } => {
                    self.resources.insert(
                        href.clone(),
                        MirroredResource {
                            etag: etag.clone(),
                            payload: payload.clone(),
                        },
                    );
                }
                SyncChange::Deleted { href } => {
                    self.resources.remove(href);
                }
            }
        }
    }
}
