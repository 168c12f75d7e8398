// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Conflict detection and resolution for conditional write-back.

use std::fmt;
use std::sync::Arc;

use jiff::Timestamp;

use crate::types::{ETag, Href};

/// One side of a conflict: a payload and the `ETag` it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// `ETag` the payload corresponds to; `None` for a never-uploaded object.
    pub etag: Option<ETag>,
    /// Raw iCalendar/vCard bytes.
    pub payload: Vec<u8>,
    /// Last modification instant, if known.
    pub last_modified: Option<Timestamp>,
}

impl Version {
    /// Creates a version without a modification time.
    #[must_use]
    pub const fn new(etag: Option<ETag>, payload: Vec<u8>) -> Self {
        Self {
            etag,
            payload,
            last_modified: None,
        }
    }

    /// Sets the modification time.
    #[must_use]
    pub fn modified_at(mut self, at: Timestamp) -> Self {
        self.last_modified = Some(at);
        self
    }
}

/// A write-back whose precondition failed, with the pending local version and
/// a freshly fetched remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Resource the write targeted.
    pub href: Href,
    /// Version the caller tried to upload.
    pub local: Version,
    /// Version currently stored on the server.
    pub remote: Version,
}

/// Caller-supplied merge of `(local, remote)` into a new payload.
pub type MergeFn = Arc<dyn Fn(&Version, &Version) -> Vec<u8> + Send + Sync>;

/// How a [`Conflict`] is settled. There is no default; one strategy is chosen
/// per sync session.
#[derive(Clone)]
pub enum ConflictStrategy {
    /// Re-upload the local version without `If-Match`, overwriting the remote.
    UseLocal,
    /// Drop the local change and adopt the remote version.
    UseRemote,
    /// Keep whichever side has the later `last_modified`; the remote wins when
    /// either timestamp is missing or they are equal.
    UseNewest,
    /// Upload the local version under a new resource and keep the remote one.
    CreateDuplicate,
    /// Upload `merge(local, remote)`, conditional on the remote `ETag`.
    Merge(MergeFn),
    /// Report the conflict without touching the server.
    Fail,
}

impl fmt::Debug for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseLocal => f.write_str("UseLocal"),
            Self::UseRemote => f.write_str("UseRemote"),
            Self::UseNewest => f.write_str("UseNewest"),
            Self::CreateDuplicate => f.write_str("CreateDuplicate"),
            Self::Merge(_) => f.write_str("Merge(..)"),
            Self::Fail => f.write_str("Fail"),
        }
    }
}

/// Server action decided for a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// PUT `payload` to the original href with no precondition.
    Overwrite(Vec<u8>),
    /// Nothing to upload; the remote version is authoritative.
    AdoptRemote(Version),
    /// PUT `payload` to a fresh href with `If-None-Match: *`.
    Duplicate(Vec<u8>),
    /// PUT `payload` to the original href with `If-Match: etag`.
    Replace {
        /// Merged payload.
        payload: Vec<u8>,
        /// Remote `ETag` the merge was based on.
        if_match: Option<ETag>,
    },
    /// Leave the server untouched and surface the conflict.
    Fail,
}

/// Outcome of a write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The payload was stored at `href`.
    Stored {
        /// Where the payload now lives (differs from the target for duplicates).
        href: Href,
        /// New `ETag`, when the server returned one.
        etag: Option<ETag>,
    },
    /// The remote version was kept; the caller should replace its local copy.
    AdoptedRemote(Version),
}

impl ConflictStrategy {
    /// Decides what to do about `conflict`. Pure: no I/O and no retries.
    #[must_use]
    pub fn resolve(&self, conflict: &Conflict) -> Resolution {
        match self {
            Self::UseLocal => Resolution::Overwrite(conflict.local.payload.clone()),
            Self::UseRemote => Resolution::AdoptRemote(conflict.remote.clone()),
            Self::UseNewest => match (conflict.local.last_modified, conflict.remote.last_modified) {
                (Some(local), Some(remote)) if local > remote => {
                    Resolution::Overwrite(conflict.local.payload.clone())
                }
                _ => Resolution::AdoptRemote(conflict.remote.clone()),
            },
            Self::CreateDuplicate => Resolution::Duplicate(conflict.local.payload.clone()),
            Self::Merge(merge) => Resolution::Replace {
                payload: merge(&conflict.local, &conflict.remote),
                if_match: conflict.remote.etag.clone(),
            },
            Self::Fail => Resolution::Fail,
        }
    }
}

/// Derives a sibling href for a duplicate, keeping the file extension:
/// `/cal/event.ics` becomes `/cal/<uuid>.ics`.
#[must_use]
pub fn duplicate_href(href: &Href) -> Href {
    let (dir, file) = match href.as_str().rsplit_once('/') {
        Some((dir, file)) => (format!("{dir}/"), file),
        None => (String::new(), href.as_str()),
    };
    let extension = file
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{ext}"))
        .unwrap_or_default();
    Href::new(format!("{dir}{}{extension}", uuid::Uuid::new_v4()))
}
