// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Change detection for servers without `sync-collection`: a `CTag` check
//! followed by an `ETag` listing diff.

use std::collections::HashMap;

use crate::client::{DavClient, is_same_resource};
use crate::error::DavError;
use crate::sync::SyncChange;
use crate::types::{CTag, Depth, ETag, Href, PropName};

/// Result of [`DavClient::diff_by_etag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETagDiff {
    /// Additions, modifications and deletions, ordered by href.
    pub changes: Vec<SyncChange>,
    /// The current listing, to persist as the next known map.
    pub etags: HashMap<Href, ETag>,
}

/// Compares a known `ETag` map with the current listing.
///
/// Both maps are walked once; the changes are then sorted by href, so the
/// result does not depend on listing order.
#[must_use]
pub fn diff_etags(known: &HashMap<Href, ETag>, current: &HashMap<Href, ETag>) -> Vec<SyncChange> {
    let mut changes: Vec<SyncChange> = current
        .iter()
        .filter_map(|(href, etag)| match known.get(href) {
            None => Some(SyncChange::Added {
                href: href.clone(),
                etag: Some(etag.clone()),
                payload: None,
            }),
            Some(old) if old != etag => Some(SyncChange::Modified {
                href: href.clone(),
                etag: Some(etag.clone()),
                payload: None,
            }),
            Some(_) => None,
        })
        .collect();

    changes.extend(
        known
            .keys()
            .filter(|href| !current.contains_key(*href))
            .map(|href| SyncChange::Deleted { href: href.clone() }),
    );
    changes.sort_by(|a, b| a.href().cmp(b.href()));
    changes
}

impl DavClient {
    /// Reads the collection tag with a depth-0 PROPFIND for `getctag`.
    ///
    /// `None` means the server does not offer one; treat the collection as
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    #[tracing::instrument(skip(self), fields(collection = %collection))]
    pub async fn get_collection_tag(&self, collection: &Href) -> Result<Option<CTag>, DavError> {
        let url = self.resolve(collection).await?;
        let multistatus = self
            .propfind(&url, Depth::Zero, &[PropName::GET_CTAG])
            .await?;

        let ctag = multistatus.find_value(&PropName::GET_CTAG).map(CTag::from);
        if ctag.is_none() {
            tracing::warn!("server reports no collection tag, assuming changed");
        }
        Ok(ctag)
    }

    /// Lists every member `ETag` with a depth-1 PROPFIND and diffs the
    /// listing against `known`.
    ///
    /// The collection itself and child collections are left out. A member
    /// listed without an `ETag` is still present: it keeps its known `ETag`
    /// if it has one, and is reported as added with no `ETag` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    #[tracing::instrument(skip(self, known), fields(collection = %collection, known = known.len()))]
    pub async fn diff_by_etag(
        &self,
        collection: &Href,
        known: &HashMap<Href, ETag>,
    ) -> Result<ETagDiff, DavError> {
        let url = self.resolve(collection).await?;
        let multistatus = self
            .propfind(&url, Depth::One, &[PropName::GET_ETAG, PropName::RESOURCE_TYPE])
            .await?;

        let mut current = HashMap::with_capacity(multistatus.responses.len());
        let mut untagged = Vec::new();
        for entry in multistatus.responses {
            if is_same_resource(&url, &entry.href)
                || entry.props.tokens(&PropName::RESOURCE_TYPE).contains(&"collection")
            {
                continue;
            }
            match entry.etag() {
                Some(etag) => {
                    current.insert(entry.href, etag);
                }
                None => {
                    tracing::debug!(href = %entry.href, "member listed without an etag");
                    match known.get(&entry.href) {
                        Some(etag) => {
                            current.insert(entry.href, etag.clone());
                        }
                        None => untagged.push(entry.href),
                    }
                }
            }
        }

        let mut changes = diff_etags(known, &current);
        if !untagged.is_empty() {
            changes.extend(untagged.into_iter().map(|href| SyncChange::Added {
                href,
                etag: None,
                payload: None,
            }));
            changes.sort_by(|a, b| a.href().cmp(b.href()));
        }
        tracing::info!(changes = changes.len(), members = current.len(), "etag diff completed");
        Ok(ETagDiff {
            changes,
            etags: current,
        })
    }
}
