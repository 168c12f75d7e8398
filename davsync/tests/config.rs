// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration parsing tests.

use davsync::{AuthMethod, DavConfig};

#[test]
fn config_defaults_apply() {
    let config: DavConfig = toml::from_str(r#"base_url = "https://dav.example.com/""#)
        .expect("Failed to parse config");

    assert_eq!(config.base_url, "https://dav.example.com/");
    assert!(matches!(config.auth, AuthMethod::None));
    assert_eq!(config.timeout_secs, 30);
    assert!(config.user_agent.starts_with("davsync/"));
}

#[test]
fn config_basic_auth() {
    let config: DavConfig = toml::from_str(
        r#"
base_url = "https://dav.example.com/"
timeout_secs = 5
user_agent = "custom/1.0"

[auth]
type = "basic"
username = "alice"
password = "secret"
"#,
    )
    .expect("Failed to parse config");

    assert_eq!(config.timeout_secs, 5);
    assert_eq!(config.user_agent, "custom/1.0");
    match config.auth {
        AuthMethod::Basic { username, password } => {
            assert_eq!(username, "alice");
            assert_eq!(password, "secret");
        }
        other => panic!("unexpected auth: {other:?}"),
    }
}

#[test]
fn config_bearer_auth() {
    let config: DavConfig = toml::from_str(
        r#"
base_url = "https://dav.example.com/"
auth = { type = "bearer", token = "abc" }
"#,
    )
    .expect("Failed to parse config");

    assert!(matches!(config.auth, AuthMethod::Bearer { ref token } if token == "abc"));
}

#[test]
fn config_oauth2_auth() {
    let config: DavConfig = toml::from_str(
        r#"
base_url = "https://dav.example.com/"

[auth]
type = "oauth2"
token_url = "https://auth.example.com/token"
client_id = "davsync"
access_token = "at"
refresh_token = "rt"
expires_at = "2026-01-01T00:00:00Z"
"#,
    )
    .expect("Failed to parse config");

    let AuthMethod::OAuth2(oauth) = config.auth else {
        panic!("expected oauth2 auth");
    };
    assert_eq!(oauth.token_url, "https://auth.example.com/token");
    assert_eq!(oauth.client_id, "davsync");
    assert!(oauth.client_secret.is_none());
    assert_eq!(oauth.access_token, "at");
    assert_eq!(oauth.refresh_token.as_deref(), Some("rt"));
    assert_eq!(
        oauth.expires_at.map(|t| t.as_second()),
        Some(1_767_225_600)
    );
}

#[test]
fn config_unknown_auth_type_is_rejected() {
    let result = toml::from_str::<DavConfig>(
        r#"
base_url = "https://dav.example.com/"
auth = { type = "kerberos" }
"#,
    );
    assert!(result.is_err());
}
