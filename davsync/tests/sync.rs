// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Delta sync and fallback sync tests with wiremock.

use std::collections::HashMap;

use davsync::{
    CTag, CollectionState, DavClient, DavConfig, DavError, ETag, Href, LocalMirror, SyncChange,
    SyncMethod, SyncOptions, SyncToken,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> DavClient {
    DavClient::new(DavConfig {
        base_url: server.uri(),
        ..Default::default()
    })
    .expect("Failed to create client")
}

fn multistatus(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(207).set_body_raw(body.to_string(), "application/xml; charset=utf-8")
}

const INITIAL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/cal/work/a.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"a1"</D:getetag>
        <C:calendar-data>BEGIN:VCALENDAR
UID:a
END:VCALENDAR
</C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/work/b.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"b1"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/work/c.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"c1"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/work/</D:href>
    <D:status>HTTP/1.1 507 Insufficient Storage</D:status>
  </D:response>
  <D:sync-token>http://example.com/sync/10</D:sync-token>
</D:multistatus>"#;

#[tokio::test]
async fn sync_initial_with_full_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .and(path("/cal/work/"))
        .and(header("Depth", "0"))
        .and(body_string_contains("<D:sync-token></D:sync-token>"))
        .and(body_string_contains("<D:sync-level>1</D:sync-level>"))
        .and(body_string_contains("<C:calendar-data/>"))
        .respond_with(multistatus(INITIAL))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cal/work/b.ics"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"b1\"")
                .set_body_string("BEGIN:VCALENDAR\nUID:b\nEND:VCALENDAR\n"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    // Deleted between the REPORT and the GET.
    Mock::given(method("GET"))
        .and(path("/cal/work/c.ics"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = client(&mock_server)
        .sync(
            &Href::from("/cal/work/"),
            None,
            &SyncOptions::default().with_full_data(),
        )
        .await
        .expect("Failed to sync");

    assert!(result.initial);
    assert!(result.truncated);
    assert_eq!(result.token, SyncToken::from("http://example.com/sync/10"));
    assert_eq!(result.changes.len(), 3);

    assert!(matches!(&result.changes[0], SyncChange::Added { .. }));
    assert_eq!(
        result.changes[0].payload(),
        Some(b"BEGIN:VCALENDAR\nUID:a\nEND:VCALENDAR\n".as_slice())
    );
    assert_eq!(
        result.changes[1].payload(),
        Some(b"BEGIN:VCALENDAR\nUID:b\nEND:VCALENDAR\n".as_slice())
    );
    assert_eq!(result.changes[1].etag(), Some(&ETag::from("\"b1\"")));
    assert_eq!(
        result.changes[2],
        SyncChange::Deleted {
            href: Href::from("/cal/work/c.ics")
        }
    );
}

#[tokio::test]
async fn sync_incremental_reports_modifications_and_deletions() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .and(path("/cal/work/"))
        .and(body_string_contains(
            "<D:sync-token>http://example.com/sync/10</D:sync-token>",
        ))
        .respond_with(multistatus(
            r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/cal/work/a.ics</d:href>
    <d:propstat>
      <d:prop><d:getetag>"a2"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/cal/work/b.ics</d:href>
    <d:status>HTTP/1.1 404 Not Found</d:status>
  </d:response>
  <d:sync-token>http://example.com/sync/11</d:sync-token>
</d:multistatus>"#,
        ))
        .mount(&mock_server)
        .await;

    let token = SyncToken::from("http://example.com/sync/10");
    let result = client(&mock_server)
        .sync(&Href::from("/cal/work/"), Some(&token), &SyncOptions::default())
        .await
        .expect("Failed to sync");

    assert!(!result.initial);
    assert!(!result.truncated);
    assert_eq!(result.token.as_str(), "http://example.com/sync/11");
    assert_eq!(
        result.changes,
        vec![
            SyncChange::Modified {
                href: Href::from("/cal/work/a.ics"),
                etag: Some(ETag::from("\"a2\"")),
                payload: None,
            },
            SyncChange::Deleted {
                href: Href::from("/cal/work/b.ics")
            },
        ]
    );
}

#[tokio::test]
async fn sync_gone_signals_expired_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&mock_server)
        .await;

    let token = SyncToken::from("stale");
    let err = client(&mock_server)
        .sync(&Href::from("/cal/work/"), Some(&token), &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::SyncTokenExpired(_)), "{err:?}");
    assert_eq!(token.as_str(), "stale");
}

#[tokio::test]
async fn sync_forbidden_signals_expired_token_with_or_without_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let err = client
        .sync(
            &Href::from("/cal/work/"),
            Some(&SyncToken::from("old")),
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::SyncTokenExpired(_)));

    let err = client
        .sync(&Href::from("/cal/work/"), None, &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::SyncTokenExpired(_)), "{err:?}");
}

#[tokio::test]
async fn sync_gone_without_token_is_expired() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .sync(&Href::from("/cal/work/"), None, &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::SyncTokenExpired(_)), "{err:?}");
}

#[tokio::test]
async fn sync_without_token_in_response_is_a_parsing_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(multistatus(
            r#"<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/cal/work/a.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"a1"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
        ))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .sync(&Href::from("/cal/work/"), None, &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::Parsing(_)), "{err:?}");
}

#[tokio::test]
async fn sync_other_status_is_a_protocol_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .sync(&Href::from("/cal/work/"), None, &SyncOptions::default())
        .await
        .unwrap_err();
    let DavError::Protocol { status, body, .. } = err else {
        panic!("expected a protocol error, got {err:?}");
    };
    assert_eq!(status, 500);
    assert_eq!(body, "boom");
}

#[tokio::test]
async fn sync_failed_fetch_discards_whole_batch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .respond_with(multistatus(INITIAL))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .sync(
            &Href::from("/cal/work/"),
            None,
            &SyncOptions::default().with_full_data(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

async fn mount_sync_capable(mock_server: &MockServer) {
    Mock::given(method("OPTIONS"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("DAV", "1, 2, 3, calendar-access, sync-collection")
                .insert_header("Server", "nginx"),
        )
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn synchronize_restarts_once_after_expired_token() {
    let mock_server = MockServer::start().await;
    mount_sync_capable(&mock_server).await;

    Mock::given(method("REPORT"))
        .and(body_string_contains("<D:sync-token>old</D:sync-token>"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("REPORT"))
        .and(body_string_contains("<D:sync-token></D:sync-token>"))
        .respond_with(multistatus(
            r#"<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/cal/work/a.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"a5"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:sync-token>new</D:sync-token>
</D:multistatus>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = CollectionState {
        sync_token: Some(SyncToken::from("old")),
        ctag: None,
        etags: HashMap::from([(Href::from("/cal/work/zombie.ics"), ETag::from("\"z\""))]),
    };
    let outcome = client(&mock_server)
        .synchronize(&Href::from("/cal/work/"), &state, &SyncOptions::default())
        .await
        .expect("Failed to synchronize");

    assert_eq!(outcome.method, SyncMethod::SyncCollection);
    assert_eq!(outcome.state.sync_token, Some(SyncToken::from("new")));
    assert_eq!(
        outcome.state.etags,
        HashMap::from([(Href::from("/cal/work/a.ics"), ETag::from("\"a5\""))])
    );
    assert!(matches!(&outcome.changes[..], [SyncChange::Added { .. }]));
}

#[tokio::test]
async fn synchronize_propagates_failed_restart() {
    let mock_server = MockServer::start().await;
    mount_sync_capable(&mock_server).await;

    Mock::given(method("REPORT"))
        .and(body_string_contains("<D:sync-token>old</D:sync-token>"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&mock_server)
        .await;
    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let state = CollectionState {
        sync_token: Some(SyncToken::from("old")),
        ..Default::default()
    };
    let err = client(&mock_server)
        .synchronize(&Href::from("/cal/work/"), &state, &SyncOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn synchronize_without_token_does_not_restart() {
    let mock_server = MockServer::start().await;
    mount_sync_capable(&mock_server).await;

    Mock::given(method("REPORT"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .synchronize(
            &Href::from("/cal/work/"),
            &CollectionState::default(),
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DavError::SyncTokenExpired(_)), "{err:?}");
}

async fn mount_legacy_server(mock_server: &MockServer, ctag: &str) {
    Mock::given(method("OPTIONS"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("DAV", "1, 2, calendar-access")
                .insert_header("Server", "Apache"),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("PROPFIND"))
        .and(path("/cal/work/"))
        .and(header("Depth", "0"))
        .and(body_string_contains("getctag"))
        .respond_with(multistatus(&format!(
            r#"<D:multistatus xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/cal/work/</D:href>
    <D:propstat>
      <D:prop><CS:getctag>{ctag}</CS:getctag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#
        )))
        .mount(mock_server)
        .await;
}

const LISTING: &str = r#"<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/cal/work/</D:href>
    <D:propstat>
      <D:prop><D:getetag>"coll"</D:getetag><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/work/b.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"b2"</D:getetag><D:resourcetype/></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/work/c.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"c1"</D:getetag><D:resourcetype/></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

#[tokio::test]
async fn synchronize_falls_back_to_etag_diff() {
    let mock_server = MockServer::start().await;
    mount_legacy_server(&mock_server, "ctag-2").await;

    Mock::given(method("PROPFIND"))
        .and(path("/cal/work/"))
        .and(header("Depth", "1"))
        .respond_with(multistatus(LISTING))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = CollectionState {
        sync_token: None,
        ctag: Some(CTag::from("ctag-1")),
        etags: HashMap::from([
            (Href::from("/cal/work/a.ics"), ETag::from("\"a1\"")),
            (Href::from("/cal/work/b.ics"), ETag::from("\"b1\"")),
        ]),
    };
    let outcome = client(&mock_server)
        .synchronize(&Href::from("/cal/work/"), &state, &SyncOptions::default())
        .await
        .expect("Failed to synchronize");

    assert_eq!(outcome.method, SyncMethod::ETagDiff);
    assert_eq!(outcome.state.ctag, Some(CTag::from("ctag-2")));
    assert_eq!(outcome.state.etags.len(), 2);
    assert_eq!(
        outcome.changes,
        vec![
            SyncChange::Deleted {
                href: Href::from("/cal/work/a.ics")
            },
            SyncChange::Modified {
                href: Href::from("/cal/work/b.ics"),
                etag: Some(ETag::from("\"b2\"")),
                payload: None,
            },
            SyncChange::Added {
                href: Href::from("/cal/work/c.ics"),
                etag: Some(ETag::from("\"c1\"")),
                payload: None,
            },
        ]
    );
}

#[tokio::test]
async fn synchronize_skips_listing_when_ctag_unchanged() {
    let mock_server = MockServer::start().await;
    mount_legacy_server(&mock_server, "ctag-1").await;

    Mock::given(method("PROPFIND"))
        .and(header("Depth", "1"))
        .respond_with(multistatus(LISTING))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = CollectionState {
        sync_token: None,
        ctag: Some(CTag::from("ctag-1")),
        etags: HashMap::new(),
    };
    let outcome = client(&mock_server)
        .synchronize(&Href::from("/cal/work/"), &state, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.method, SyncMethod::CTagUnchanged);
    assert!(outcome.changes.is_empty());
    assert_eq!(outcome.state, state);
}

#[tokio::test]
async fn fallback_missing_ctag_means_unknown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .and(header("Depth", "0"))
        .respond_with(multistatus(
            r#"<D:multistatus xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/cal/work/</D:href>
    <D:propstat>
      <D:prop><CS:getctag/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
        ))
        .mount(&mock_server)
        .await;

    let ctag = client(&mock_server)
        .get_collection_tag(&Href::from("/cal/work/"))
        .await
        .expect("Failed to read ctag");
    assert_eq!(ctag, None);
}

#[tokio::test]
async fn etag_diff_keeps_members_listed_without_etag() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .and(path("/cal/work/"))
        .and(header("Depth", "1"))
        .respond_with(multistatus(
            r#"<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/cal/work/a.ics</D:href>
    <D:propstat>
      <D:prop><D:resourcetype/></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
      <D:prop><D:getetag/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/work/n.ics</D:href>
    <D:propstat>
      <D:prop><D:resourcetype/></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
        ))
        .mount(&mock_server)
        .await;

    let known = HashMap::from([(Href::from("/cal/work/a.ics"), ETag::from("\"1\""))]);
    let diff = client(&mock_server)
        .diff_by_etag(&Href::from("/cal/work/"), &known)
        .await
        .expect("Failed to diff");

    assert_eq!(
        diff.changes,
        vec![SyncChange::Added {
            href: Href::from("/cal/work/n.ics"),
            etag: None,
            payload: None,
        }]
    );
    assert_eq!(diff.etags, known);
}

#[tokio::test]
async fn mirror_converges_across_successive_syncs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .and(body_string_contains("<D:sync-token></D:sync-token>"))
        .respond_with(multistatus(
            r#"<D:multistatus xmlns:D="DAV:">
  <D:response><D:href>/c/a</D:href><D:propstat><D:prop><D:getetag>"1"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
  <D:response><D:href>/c/b</D:href><D:propstat><D:prop><D:getetag>"1"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
  <D:sync-token>t1</D:sync-token>
</D:multistatus>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("REPORT"))
        .and(body_string_contains("<D:sync-token>t1</D:sync-token>"))
        .respond_with(multistatus(
            r#"<D:multistatus xmlns:D="DAV:">
  <D:response><D:href>/c/a</D:href><D:status>HTTP/1.1 404 Not Found</D:status></D:response>
  <D:response><D:href>/c/b</D:href><D:propstat><D:prop><D:getetag>"2"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
  <D:response><D:href>/c/c</D:href><D:propstat><D:prop><D:getetag>"1"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
  <D:sync-token>t2</D:sync-token>
</D:multistatus>"#,
        ))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let collection = Href::from("/c/");
    let options = SyncOptions::default();

    let mut mirror = LocalMirror::new();
    let first = client.sync(&collection, None, &options).await.unwrap();
    mirror.apply(&first);
    let second = client
        .sync(&collection, mirror.token(), &options)
        .await
        .unwrap();
    mirror.apply(&second);

    assert_eq!(mirror.token(), Some(&SyncToken::from("t2")));
    let hrefs: Vec<&str> = mirror.resources().keys().map(|h| h.as_str()).collect();
    assert_eq!(hrefs, vec!["/c/b", "/c/c"]);
    assert_eq!(
        mirror.resources()[&Href::from("/c/b")].etag,
        Some(ETag::from("\"2\""))
    );
}
