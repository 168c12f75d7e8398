// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Authenticating wrapper around a [`Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;

use crate::config::{AuthMethod, DavConfig};
use crate::error::DavError;
use crate::oauth::OAuth2TokenManager;
use crate::transport::{DavRequest, DavResponse, HttpTransport, Transport};

#[derive(Debug)]
enum Credentials {
    None,
    Static(String),
    OAuth2(Arc<OAuth2TokenManager>),
}

/// Applies authorization to every request.
///
/// With OAuth2, a 401 forces one token refresh and one retry; a second 401 is
/// reported as [`DavError::Authentication`]. Other methods fail on the first 401.
#[derive(Debug)]
pub struct AuthenticatedTransport {
    inner: Arc<dyn Transport>,
    credentials: Credentials,
}

impl AuthenticatedTransport {
    /// Creates an HTTP transport for `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: &DavConfig) -> Result<Self, DavError> {
        let inner: Arc<dyn Transport> = Arc::new(HttpTransport::new(config)?);
        Ok(Self::with_transport(&config.auth, inner))
    }

    /// Wraps an existing transport.
    #[must_use]
    pub fn with_transport(auth: &AuthMethod, inner: Arc<dyn Transport>) -> Self {
        let credentials = match auth {
            AuthMethod::None => Credentials::None,
            AuthMethod::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                Credentials::Static(format!("Basic {encoded}"))
            }
            AuthMethod::Bearer { token } => Credentials::Static(format!("Bearer {token}")),
            AuthMethod::OAuth2(oauth) => Credentials::OAuth2(Arc::new(OAuth2TokenManager::new(
                oauth,
                Arc::clone(&inner),
            ))),
        };
        Self { inner, credentials }
    }

    /// The token manager, when OAuth2 is configured.
    #[must_use]
    pub fn token_manager(&self) -> Option<&Arc<OAuth2TokenManager>> {
        match &self.credentials {
            Credentials::OAuth2(manager) => Some(manager),
            _ => None,
        }
    }

    async fn send_with(
        &self,
        request: &DavRequest,
        authorization: Option<&str>,
    ) -> Result<DavResponse, DavError> {
        let request = match authorization {
            Some(value) => request.clone().set_header("Authorization", value),
            None => request.clone(),
        };
        self.inner.send(request).await
    }
}

#[async_trait]
impl Transport for AuthenticatedTransport {
    async fn send(&self, request: DavRequest) -> Result<DavResponse, DavError> {
        match &self.credentials {
            Credentials::None => {
                let resp = self.send_with(&request, None).await?;
                reject_unauthorized(resp, &request)
            }
            Credentials::Static(value) => {
                let resp = self.send_with(&request, Some(value)).await?;
                reject_unauthorized(resp, &request)
            }
            Credentials::OAuth2(manager) => {
                let token = manager.get_valid_access_token().await?;
                let resp = self
                    .send_with(&request, Some(&format!("Bearer {token}")))
                    .await?;
                if resp.status != StatusCode::UNAUTHORIZED {
                    return Ok(resp);
                }

                tracing::info!(url = %request.url, "401 received, refreshing token and retrying once");
                let token = manager.force_refresh(&token).await?;
                let resp = self
                    .send_with(&request, Some(&format!("Bearer {token}")))
                    .await?;
                if resp.status == StatusCode::UNAUTHORIZED {
                    return Err(DavError::Authentication(format!(
                        "{} {} still unauthorized after token refresh",
                        request.method, request.url
                    )));
                }
                Ok(resp)
            }
        }
    }
}

fn reject_unauthorized(resp: DavResponse, request: &DavRequest) -> Result<DavResponse, DavError> {
    if resp.status == StatusCode::UNAUTHORIZED {
        return Err(DavError::Authentication(format!(
            "{} {} unauthorized",
            request.method, request.url
        )));
    }
    Ok(resp)
}
