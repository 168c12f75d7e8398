// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! OAuth2 access-token lifecycle.
//!
//! The token state lives behind one async mutex that is held for the whole
//! refresh exchange, so concurrent callers queue behind a single in-flight
//! refresh and then reuse its result. State is replaced only after the token
//! endpoint's answer has been fully read and validated; dropping a pending
//! call leaves the previous state intact.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jiff::{SignedDuration, Timestamp};
use reqwest::Method;
use tokio::sync::Mutex;

use crate::config::OAuth2Config;
use crate::error::DavError;
use crate::transport::{DavRequest, Transport};

/// Tokens closer than this to expiry are refreshed before use.
pub const REFRESH_BUFFER: SignedDuration = SignedDuration::from_secs(5 * 60);

/// Current OAuth2 tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenState {
    /// Access token sent as `Authorization: Bearer`.
    pub access_token: String,
    /// Refresh token, if any.
    pub refresh_token: Option<String>,
    /// Access token expiry; `None` means unknown.
    pub expires_at: Option<Timestamp>,
}

impl TokenState {
    /// Whether the access token is usable at `now` without refreshing.
    #[must_use]
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.expires_at
            .is_some_and(|at| at.duration_since(now) > REFRESH_BUFFER)
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Owns the token state and performs refresh exchanges.
#[derive(Debug)]
pub struct OAuth2TokenManager {
    transport: Arc<dyn Transport>,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    state: Mutex<TokenState>,
    refreshes: AtomicU64,
}

impl OAuth2TokenManager {
    /// Creates a manager from configuration. The transport is used unauthenticated.
    #[must_use]
    pub fn new(config: &OAuth2Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            state: Mutex::new(TokenState {
                access_token: config.access_token.clone(),
                refresh_token: config.refresh_token.clone(),
                expires_at: config.expires_at,
            }),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current tokens, e.g. for persisting them.
    pub async fn state(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    /// Number of completed refresh exchanges.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Acquire)
    }

    /// Returns an access token that is valid for at least [`REFRESH_BUFFER`],
    /// refreshing first when needed.
    ///
    /// A token with unknown expiry is presumed expired. Without a refresh
    /// token the current access token is returned as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh exchange fails.
    #[tracing::instrument(skip(self))]
    pub async fn get_valid_access_token(&self) -> Result<String, DavError> {
        let observed = self.refresh_count();
        let mut state = self.state.lock().await;

        if self.refresh_count() != observed {
            tracing::debug!("reusing token refreshed by a concurrent caller");
            return Ok(state.access_token.clone());
        }
        if state.is_fresh(Timestamp::now()) {
            return Ok(state.access_token.clone());
        }
        if state.refresh_token.is_none() {
            tracing::warn!("access token may be expired but no refresh token is available");
            return Ok(state.access_token.clone());
        }

        self.refresh_locked(&mut state).await
    }

    /// Refreshes after the server rejected `rejected`, bypassing the expiry
    /// check. If another caller already replaced that token, the replacement
    /// is returned without a new exchange.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Authentication`] if no refresh token is available
    /// or the token endpoint refuses the grant.
    #[tracing::instrument(skip_all)]
    pub async fn force_refresh(&self, rejected: &str) -> Result<String, DavError> {
        let mut state = self.state.lock().await;
        if state.access_token != rejected {
            return Ok(state.access_token.clone());
        }
        self.refresh_locked(&mut state).await
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> Result<String, DavError> {
        let refresh_token = state
            .refresh_token
            .clone()
            .ok_or_else(|| DavError::Authentication("no refresh token available".to_string()))?;

        // The serializer is not `Send`; it must be gone before the first await.
        let body = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            form.append_pair("grant_type", "refresh_token")
                .append_pair("refresh_token", &refresh_token)
                .append_pair("client_id", &self.client_id);
            if let Some(secret) = &self.client_secret {
                form.append_pair("client_secret", secret);
            }
            form.finish()
        };

        let request = DavRequest::new(Method::POST, &self.token_url)
            .header("Accept", "application/json")
            .body("application/x-www-form-urlencoded", body.into_bytes());

        tracing::info!(url = %self.token_url, "refreshing OAuth2 access token");
        let resp = self.transport.send(request.clone()).await?;

        if resp.status.is_client_error() {
            return Err(DavError::Authentication(format!(
                "token endpoint returned {}: {}",
                resp.status,
                String::from_utf8_lossy(&resp.body)
            )));
        }
        if !resp.status.is_success() {
            return Err(resp.into_error(&request));
        }

        let token: TokenResponse = serde_json::from_slice(&resp.body)
            .map_err(|e| DavError::Parsing(format!("invalid token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(DavError::Parsing(
                "token response has an empty access_token".to_string(),
            ));
        }

        let expires_at = token
            .expires_in
            .map(|secs| Timestamp::now().checked_add(SignedDuration::from_secs(secs)))
            .transpose()
            .map_err(|e| DavError::Parsing(format!("invalid expires_in: {e}")))?;

        // Commit point: everything above is validated.
        *state = TokenState {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at,
        };
        self.refreshes.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(?expires_at, "access token refreshed");

        Ok(state.access_token.clone())
    }
}
