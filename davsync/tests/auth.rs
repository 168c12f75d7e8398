// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Authentication and OAuth2 refresh tests with wiremock.

use std::sync::Arc;

use davsync::{
    AuthMethod, AuthenticatedTransport, DavClient, DavConfig, DavError, Href, HttpTransport,
    OAuth2Config, Transport,
};
use jiff::{SignedDuration, Timestamp};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn oauth2(server: &MockServer, expires_at: Option<Timestamp>) -> AuthMethod {
    AuthMethod::OAuth2(OAuth2Config {
        token_url: format!("{}/token", server.uri()),
        client_id: "davsync-test".to_string(),
        client_secret: Some("s3cret".to_string()),
        access_token: "old".to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_at,
    })
}

fn transport(server: &MockServer, auth: AuthMethod) -> Arc<AuthenticatedTransport> {
    let config = DavConfig {
        base_url: server.uri(),
        auth,
        ..Default::default()
    };
    let inner: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&config).expect("Failed to create transport"));
    Arc::new(AuthenticatedTransport::with_transport(&config.auth, inner))
}

fn client(server: &MockServer, transport: Arc<AuthenticatedTransport>) -> DavClient {
    DavClient::with_transport(&server.uri(), transport).expect("Failed to create client")
}

fn in_one_hour() -> Timestamp {
    Timestamp::now()
        .checked_add(SignedDuration::from_secs(3600))
        .unwrap()
}

async fn mount_token_endpoint(server: &MockServer, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .and(body_string_contains("client_id=davsync-test"))
        .and(body_string_contains("client_secret=s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"access_token":"new","token_type":"Bearer","expires_in":3600}"#,
            "application/json",
        ))
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn auth_basic_header_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cal/a.ics"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DavClient::new(DavConfig {
        base_url: mock_server.uri(),
        auth: AuthMethod::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        },
        ..Default::default()
    })
    .unwrap();
    client.get(&Href::from("/cal/a.ics")).await.expect("Failed to get");
}

#[tokio::test]
async fn auth_static_401_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = transport(
        &mock_server,
        AuthMethod::Bearer {
            token: "t".to_string(),
        },
    );
    let err = client(&mock_server, transport)
        .get(&Href::from("/cal/a.ics"))
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::Authentication(_)), "{err:?}");
}

#[tokio::test]
async fn auth_fresh_token_is_reused_without_refresh() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 0).await;

    let transport = transport(&mock_server, oauth2(&mock_server, Some(in_one_hour())));
    let manager = transport.token_manager().expect("OAuth2 configured");

    assert_eq!(manager.get_valid_access_token().await.unwrap(), "old");
    assert_eq!(manager.get_valid_access_token().await.unwrap(), "old");
    assert_eq!(manager.refresh_count(), 0);
}

#[tokio::test]
async fn auth_unknown_expiry_refreshes_exactly_once() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;

    let transport = transport(&mock_server, oauth2(&mock_server, None));
    let manager = transport.token_manager().expect("OAuth2 configured");

    assert_eq!(manager.get_valid_access_token().await.unwrap(), "new");
    assert_eq!(manager.get_valid_access_token().await.unwrap(), "new");
    assert_eq!(manager.refresh_count(), 1);

    let state = manager.state().await;
    assert_eq!(state.access_token, "new");
    assert_eq!(state.refresh_token.as_deref(), Some("refresh-1"));
    assert!(state.expires_at.is_some());
}

#[tokio::test]
async fn auth_concurrent_callers_share_one_refresh() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;

    let transport = transport(&mock_server, oauth2(&mock_server, None));
    let manager = transport.token_manager().expect("OAuth2 configured");

    let (a, b, c) = tokio::join!(
        manager.get_valid_access_token(),
        manager.get_valid_access_token(),
        manager.get_valid_access_token(),
    );
    assert_eq!(a.unwrap(), "new");
    assert_eq!(b.unwrap(), "new");
    assert_eq!(c.unwrap(), "new");
    assert_eq!(manager.refresh_count(), 1);
}

#[tokio::test]
async fn auth_401_forces_refresh_and_retries_once() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;

    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = transport(&mock_server, oauth2(&mock_server, Some(in_one_hour())));
    let version = client(&mock_server, transport)
        .get(&Href::from("/cal/a.ics"))
        .await
        .expect("retry should succeed");
    assert_eq!(version.payload, b"ok");
}

#[tokio::test]
async fn auth_second_401_is_terminal() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&mock_server)
        .await;

    let transport = transport(&mock_server, oauth2(&mock_server, Some(in_one_hour())));
    let err = client(&mock_server, transport)
        .get(&Href::from("/cal/a.ics"))
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::Authentication(_)), "{err:?}");
}

#[tokio::test]
async fn auth_rejected_refresh_keeps_previous_state() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_raw(r#"{"error":"invalid_grant"}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let transport = transport(&mock_server, oauth2(&mock_server, None));
    let manager = transport.token_manager().expect("OAuth2 configured");

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, DavError::Authentication(_)), "{err:?}");
    assert_eq!(manager.state().await.access_token, "old");
    assert_eq!(manager.refresh_count(), 0);
}

#[tokio::test]
async fn auth_malformed_token_response_is_not_committed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"token_type":"Bearer"}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;

    let transport = transport(&mock_server, oauth2(&mock_server, None));
    let manager = transport.token_manager().expect("OAuth2 configured");

    let err = manager.get_valid_access_token().await.unwrap_err();
    assert!(matches!(err, DavError::Parsing(_)), "{err:?}");
    assert_eq!(manager.state().await.access_token, "old");
}
