//! Integration tests for the refresh-and-retry policy and teardown

mod common;

use common::{ScriptedTransport, Sent, client, server};
use session_api_client::api::auth::{LOGOUT_PATH, REFRESH_PATH};
use session_api_client::session::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use session_api_client::sync::BroadcastHub;
use session_api_client::{
    ApiError, ApiRequest, ApiResponse, ErrorKind, MemorySessionStore, NoopBus, Profile,
    RefreshMode, SessionEvent, SessionEventBus, SessionStore, TokenPair, Transport,
};
use std::sync::Arc;
use std::time::Duration;

fn logged_in_store(access: &str, refresh: &str) -> MemorySessionStore {
    let store = MemorySessionStore::new();
    store.set(ACCESS_TOKEN_KEY, access, None).unwrap();
    store.set(REFRESH_TOKEN_KEY, refresh, None).unwrap();
    store
}

// ============================================================================
// Single request recovery
// ============================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried_once() {
    let transport = ScriptedTransport::new(server("new", 200));
    let store = logged_in_store("old", "r");
    let client = client(
        transport.clone(),
        Arc::new(store.clone()),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let item = client.content().get("42").await.unwrap();
    assert_eq!(item.id, "42");

    let content_calls: Vec<Sent> = transport
        .sent()
        .into_iter()
        .filter(|sent| sent.path == "/content/42")
        .collect();
    assert_eq!(
        content_calls,
        vec![
            Sent {
                path: "/content/42".into(),
                bearer: Some("old".into())
            },
            Sent {
                path: "/content/42".into(),
                bearer: Some("new".into())
            },
        ]
    );
    assert_eq!(transport.refresh_calls(), 1);
    assert_eq!(transport.logout_calls(), 0);

    // New access token is live everywhere; refresh token untouched
    assert_eq!(client.session().access_token().as_deref(), Some("new"));
    assert_eq!(client.session().refresh_token().as_deref(), Some("r"));
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("new"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r"));
    client.dispose().await;
}

#[tokio::test]
async fn test_refresh_exchange_sends_stored_refresh_token() {
    let transport = ScriptedTransport::new(|request, bearer| {
        if request.path() == REFRESH_PATH {
            assert_eq!(
                request.body(),
                Some(&serde_json::json!({"refreshToken": "r-stored"}))
            );
            return Ok(ApiResponse::new(
                200,
                r#"{"accessToken":"new","refreshToken":"r-rotated"}"#,
            ));
        }
        match bearer {
            Some("new") => Ok(ApiResponse::new(200, r#"{"id":"1","title":"t"}"#)),
            _ => Ok(ApiResponse::new(401, "")),
        }
    });
    let store = logged_in_store("old", "r-stored");
    let client = client(
        transport.clone(),
        Arc::new(store.clone()),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    client.content().get("1").await.unwrap();

    // Rotated refresh token replaces the stored one
    assert_eq!(client.session().refresh_token().as_deref(), Some("r-rotated"));
    assert_eq!(
        store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("r-rotated")
    );
    client.dispose().await;
}

#[tokio::test]
async fn test_error_from_retry_is_returned_without_teardown() {
    let transport = ScriptedTransport::new(|request, bearer| {
        if request.path() == REFRESH_PATH {
            return Ok(ApiResponse::new(200, r#"{"accessToken":"new"}"#));
        }
        match bearer {
            Some("new") => Ok(ApiResponse::new(404, r#"{"error":"not found"}"#)),
            _ => Ok(ApiResponse::new(401, "")),
        }
    });
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("old", "r")),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client.content().get("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(transport.logout_calls(), 0);
    assert_eq!(client.session().access_token().as_deref(), Some("new"));
    client.dispose().await;
}

// ============================================================================
// Teardown paths
// ============================================================================

#[tokio::test]
async fn test_401_after_retry_tears_down_without_second_refresh() {
    // Refresh "works" but the server still rejects the new token
    let transport = ScriptedTransport::new(|request, _bearer| {
        if request.path() == REFRESH_PATH {
            return Ok(ApiResponse::new(200, r#"{"accessToken":"still-bad"}"#));
        }
        Ok(ApiResponse::new(401, r#"{"error":"nope"}"#))
    });
    let store = logged_in_store("old", "r");
    let client = client(
        transport.clone(),
        Arc::new(store.clone()),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client.content().get("42").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.kind(), ErrorKind::AuthInvalid);

    assert_eq!(transport.refresh_calls(), 1);
    assert_eq!(transport.count("/content/42"), 2);
    assert_eq!(transport.logout_calls(), 1);
    assert_eq!(client.session().access_token(), None);
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    client.dispose().await;
}

#[tokio::test]
async fn test_401_without_refresh_token_tears_down() {
    let transport = ScriptedTransport::new(server("valid", 200));
    let store = MemorySessionStore::new();
    store.set(ACCESS_TOKEN_KEY, "old", None).unwrap();
    let client = client(
        transport.clone(),
        Arc::new(store.clone()),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client.content().get("42").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(transport.refresh_calls(), 0);
    assert_eq!(transport.logout_calls(), 1);
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    client.dispose().await;
}

#[tokio::test]
async fn test_403_is_never_refreshed() {
    let transport = ScriptedTransport::new(|request, _bearer| {
        if request.path() == "/content/42" {
            return Ok(ApiResponse::new(403, r#"{"error":"forbidden"}"#));
        }
        Ok(ApiResponse::new(200, "{}"))
    });
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("a", "r")),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client.content().get("42").await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(transport.refresh_calls(), 0);
    assert_eq!(transport.logout_calls(), 1);
    assert!(client.session().refresh_token().is_none());
    client.dispose().await;
}

#[tokio::test]
async fn test_network_error_is_not_retried() {
    let transport = ScriptedTransport::new(|request, _bearer| {
        if request.path() == "/content/42" {
            return Err(ApiError::network("connection refused"));
        }
        Ok(ApiResponse::new(200, "{}"))
    });
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("a", "r")),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client.content().get("42").await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(transport.count("/content/42"), 1);
    assert_eq!(transport.refresh_calls(), 0);
    assert_eq!(transport.logout_calls(), 0);
    assert_eq!(client.session().access_token().as_deref(), Some("a"));
    client.dispose().await;
}

#[tokio::test]
async fn test_other_statuses_pass_through() {
    let transport = ScriptedTransport::new(|_request, _bearer| {
        Ok(ApiResponse::new(500, r#"{"error":"boom"}"#))
    });
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("a", "r")),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client.content().get("42").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(transport.refresh_calls(), 0);
    assert_eq!(transport.logout_calls(), 0);
    client.dispose().await;
}

#[tokio::test]
async fn test_concurrent_teardowns_logout_and_broadcast_once() {
    let hub = BroadcastHub::new();
    let observer = hub.channel("auth");
    let mut events = observer.subscribe();

    let transport = ScriptedTransport::new(|request, _bearer| {
        if request.path().starts_with("/content/") {
            return Ok(ApiResponse::new(403, ""));
        }
        Ok(ApiResponse::new(200, "{}"))
    });
    let client = client(
        transport.clone(),
        Arc::new(MemorySessionStore::new()),
        Arc::new(hub.channel("auth")),
        RefreshMode::SingleFlight,
    );
    client
        .session()
        .login(
            &TokenPair::new("a", "r"),
            Profile::new(serde_json::json!({"id": "u1"})),
        )
        .unwrap();
    // Drop the login event
    assert_eq!(
        common::drain(&mut events, Duration::from_millis(50)).await,
        vec![SessionEvent::Login]
    );

    let content = client.content();
    let (r1, r2, r3, r4, r5) = tokio::join!(
        content.get("1"),
        content.get("2"),
        content.get("3"),
        content.get("4"),
        content.get("5")
    );
    for result in [r1, r2, r3, r4, r5] {
        assert_eq!(result.unwrap_err().status(), Some(403));
    }

    assert_eq!(transport.logout_calls(), 1);
    assert_eq!(
        common::drain(&mut events, Duration::from_millis(100)).await,
        vec![SessionEvent::Logout]
    );
    assert!(!client.is_authenticated());
}

// ============================================================================
// Concurrency: single-flight vs per-request
// ============================================================================

async fn two_concurrent_expired_requests(mode: RefreshMode) -> Arc<ScriptedTransport> {
    let transport = ScriptedTransport::new(server("new", 200));
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("old", "r")),
        Arc::new(NoopBus),
        mode,
    );
    client.hydrate().unwrap();

    let content = client.content();
    let (first, second) = tokio::join!(content.get("1"), content.get("2"));
    assert_eq!(first.unwrap().id, "1");
    assert_eq!(second.unwrap().id, "2");

    assert_eq!(transport.logout_calls(), 0);
    assert_eq!(client.session().access_token().as_deref(), Some("new"));
    client.dispose().await;
    transport
}

#[tokio::test]
async fn test_single_flight_coalesces_concurrent_refreshes() {
    let transport = two_concurrent_expired_requests(RefreshMode::SingleFlight).await;
    assert_eq!(transport.refresh_calls(), 1);
}

#[tokio::test]
async fn test_per_request_refreshes_each_failure() {
    let transport = two_concurrent_expired_requests(RefreshMode::PerRequest).await;
    assert_eq!(transport.refresh_calls(), 2);
}

#[tokio::test]
async fn test_single_flight_waiter_does_not_refresh_after_failed_refresh() {
    let transport = ScriptedTransport::new(server("never", 401));
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("old", "r")),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let content = client.content();
    let (first, second) = tokio::join!(content.get("1"), content.get("2"));
    assert_eq!(first.unwrap_err().status(), Some(401));
    assert_eq!(second.unwrap_err().status(), Some(401));

    assert_eq!(transport.refresh_calls(), 1);
    assert_eq!(transport.logout_calls(), 1);
    client.dispose().await;
}

async fn refresh_racing_a_teardown(mode: RefreshMode) {
    let transport = ScriptedTransport::new(|request: &ApiRequest, bearer: Option<&str>| {
        match (request.path(), bearer) {
            (REFRESH_PATH, _) => Ok(ApiResponse::new(200, r#"{"accessToken":"new"}"#)),
            (LOGOUT_PATH, _) => Ok(ApiResponse::new(200, "{}")),
            ("/content/a", Some("new")) => Ok(ApiResponse::new(200, r#"{"id":"a"}"#)),
            ("/content/a", _) => Ok(ApiResponse::new(401, "")),
            _ => Ok(ApiResponse::new(403, "")),
        }
    });
    transport.slow(REFRESH_PATH, 20);
    let store = logged_in_store("old", "r");
    let client = client(
        transport.clone(),
        Arc::new(store.clone()),
        Arc::new(NoopBus),
        mode,
    );
    client.hydrate().unwrap();

    // "a" starts a slow refresh; "b" is forbidden and tears the session down
    // while that exchange is still in flight
    let content = client.content();
    let (a, b) = tokio::join!(content.get("a"), content.get("b"));
    assert_eq!(a.unwrap_err().status(), Some(401));
    assert_eq!(b.unwrap_err().status(), Some(403));

    assert_eq!(transport.refresh_calls(), 1);
    assert_eq!(transport.logout_calls(), 1);
    assert!(client.session().is_torn_down());
    assert_eq!(client.session().access_token(), None);
    assert_eq!(client.session().refresh_token(), None);
    assert_eq!(client.transport().token(), None);
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
    client.dispose().await;
}

#[tokio::test]
async fn test_refresh_finishing_after_teardown_is_dropped_single_flight() {
    refresh_racing_a_teardown(RefreshMode::SingleFlight).await;
}

#[tokio::test]
async fn test_refresh_finishing_after_teardown_is_dropped_per_request() {
    refresh_racing_a_teardown(RefreshMode::PerRequest).await;
}

// ============================================================================
// Public endpoints
// ============================================================================

#[tokio::test]
async fn test_public_endpoint_401_does_not_touch_session() {
    let transport = ScriptedTransport::new(|_request, _bearer| {
        Ok(ApiResponse::new(401, r#"{"error":"bad credentials"}"#))
    });
    let client = client(
        transport.clone(),
        Arc::new(logged_in_store("a", "r")),
        Arc::new(NoopBus),
        RefreshMode::SingleFlight,
    );
    client.hydrate().unwrap();

    let err = client
        .execute_public(&ApiRequest::post("/auth/login"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(transport.refresh_calls(), 0);
    assert_eq!(transport.logout_calls(), 0);
    assert_eq!(client.session().access_token().as_deref(), Some("a"));
    client.dispose().await;
}
