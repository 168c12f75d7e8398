// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Principal and home-set discovery (RFC 5397, RFC 4791 §6.2.1, RFC 6352 §7.1.1).

use reqwest::Url;

use crate::client::{DavClient, join_url};
use crate::error::DavError;
use crate::request::CollectionKind;
use crate::types::{Depth, PropName};

/// How far discovery has progressed for the current base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Nothing resolved yet.
    Unresolved,
    /// `current-user-principal` is known.
    PrincipalResolved,
    /// At least one home set is known.
    HomeSetResolved,
}

/// Resolved URLs, cached on the client.
#[derive(Debug, Clone, Default)]
pub(crate) struct Discovery {
    principal: Option<Url>,
    calendar_home: Option<Url>,
    addressbook_home: Option<Url>,
}

impl Discovery {
    fn state(&self) -> DiscoveryState {
        match (&self.principal, &self.calendar_home, &self.addressbook_home) {
            (None, _, _) => DiscoveryState::Unresolved,
            (Some(_), None, None) => DiscoveryState::PrincipalResolved,
            (Some(_), _, _) => DiscoveryState::HomeSetResolved,
        }
    }

    const fn home(&self, kind: CollectionKind) -> Option<&Url> {
        match kind {
            CollectionKind::Calendar => self.calendar_home.as_ref(),
            CollectionKind::Addressbook => self.addressbook_home.as_ref(),
        }
    }

    fn set_home(&mut self, kind: CollectionKind, url: Url) {
        match kind {
            CollectionKind::Calendar => self.calendar_home = Some(url),
            CollectionKind::Addressbook => self.addressbook_home = Some(url),
        }
    }
}

impl DavClient {
    /// Current discovery progress.
    pub async fn discovery_state(&self) -> DiscoveryState {
        self.state.lock().await.discovery.state()
    }

    /// Resolves the authenticated user's principal URL with a depth-0
    /// PROPFIND for `current-user-principal` on the base URL.
    ///
    /// The result is cached; later calls return it without a request.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Protocol`] for a non-207 answer,
    /// [`DavError::Authentication`] if the server reports the request as
    /// unauthenticated, and [`DavError::Parsing`] if the property is missing.
    #[tracing::instrument(skip(self))]
    pub async fn discover_principal(&self) -> Result<Url, DavError> {
        let (base, generation) = {
            let state = self.state.lock().await;
            if let Some(principal) = &state.discovery.principal {
                return Ok(principal.clone());
            }
            (state.base_url.clone(), state.generation)
        };

        let multistatus = self
            .propfind(&base, Depth::Zero, &[PropName::CURRENT_USER_PRINCIPAL])
            .await?;
        let href = match multistatus.find_value(&PropName::CURRENT_USER_PRINCIPAL) {
            Some("unauthenticated") => {
                return Err(DavError::Authentication(
                    "server reports the principal as unauthenticated".to_string(),
                ));
            }
            Some(href) => href,
            None => {
                return Err(DavError::Parsing(format!(
                    "current-user-principal missing from {base}"
                )));
            }
        };

        let principal = join_url(&base, href)?;
        tracing::info!(%principal, "resolved principal");

        let cached = principal.clone();
        self.commit(generation, |state| state.discovery.principal = Some(cached))
            .await;
        Ok(principal)
    }

    /// Resolves the calendar or address book home set, discovering the
    /// principal first when needed.
    ///
    /// The result is cached per kind; later calls return it without a request.
    ///
    /// # Errors
    ///
    /// Same as [`DavClient::discover_principal`], for either request.
    #[tracing::instrument(skip(self))]
    pub async fn discover_home_set(&self, kind: CollectionKind) -> Result<Url, DavError> {
        let generation = {
            let state = self.state.lock().await;
            if let Some(home) = state.discovery.home(kind) {
                return Ok(home.clone());
            }
            state.generation
        };

        let principal = self.discover_principal().await?;

        let property = kind.home_set_property();
        let multistatus = self
            .propfind(&principal, Depth::Zero, std::slice::from_ref(&property))
            .await?;
        let href = multistatus.find_value(&property).ok_or_else(|| {
            DavError::Parsing(format!("{} missing from {principal}", property.name()))
        })?;

        let home = join_url(&principal, href)?;
        tracing::info!(%home, "resolved home set");

        let cached = home.clone();
        self.commit(generation, |state| state.discovery.set_home(kind, cached))
            .await;
        Ok(home)
    }
}
