// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use jiff::Timestamp;

use crate::types::PropName;

/// Authentication method.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    /// No authentication.
    #[serde(rename = "none")]
    #[default]
    None,
    /// Basic authentication (username/password).
    #[serde(rename = "basic")]
    Basic {
        /// Username for authentication.
        username: String,
        /// Password for authentication.
        password: String,
    },
    /// Static bearer token.
    #[serde(rename = "bearer")]
    Bearer {
        /// Bearer token.
        token: String,
    },
    /// OAuth2 bearer token with refresh support.
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Config),
}

/// OAuth2 client registration and initial token state.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2Config {
    /// Token endpoint used for `grant_type=refresh_token`.
    pub token_url: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret, for confidential clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Current access token.
    pub access_token: String,
    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of the access token. Unknown expiry forces a refresh first.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

/// DAV server configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DavConfig {
    /// Base URL of the server, used to resolve relative hrefs and as the
    /// starting point of principal discovery.
    pub base_url: String,
    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("davsync/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for DavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Options for a sync-collection call.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Properties requested for every changed member.
    pub props: Vec<PropName>,
    /// Resolve each added/modified payload, inline or by follow-up GET.
    pub fetch_full_data: bool,
    /// Property carrying inline payloads (`calendar-data` or `address-data`).
    pub data_property: PropName,
    /// Optional `DAV:limit` on the number of results.
    pub limit: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            props: vec![PropName::GET_ETAG],
            fetch_full_data: false,
            data_property: PropName::CALENDAR_DATA,
            limit: None,
        }
    }
}

impl SyncOptions {
    /// Requests payloads eagerly, inline when the server includes them.
    #[must_use]
    pub fn with_full_data(mut self) -> Self {
        self.fetch_full_data = true;
        self
    }

    /// Switches the inline payload property, e.g. to `address-data`.
    #[must_use]
    pub fn data_property(mut self, prop: PropName) -> Self {
        self.data_property = prop;
        self
    }
}
