//! Shared fixtures: a scripted in-memory transport and client factories

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use session_api_client::api::auth::{LOGOUT_PATH, REFRESH_PATH};
use session_api_client::sync::{EventStream, SessionEvent};
use session_api_client::{
    ApiClient, ApiError, ApiRequest, ApiResponse, ClientConfig, RefreshMode, SessionEventBus,
    SessionStore, Transport,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One dispatched request as the server saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub path: String,
    pub bearer: Option<String>,
}

type Script = dyn Fn(&ApiRequest, Option<&str>) -> session_api_client::Result<ApiResponse>
    + Send
    + Sync;

/// Transport whose responses come from a closure over (request, bearer).
///
/// `send` yields once before answering so that concurrently joined
/// requests interleave; [`slow`](Self::slow) adds more yields per path.
pub struct ScriptedTransport {
    token: Mutex<Option<String>>,
    log: Mutex<Vec<Sent>>,
    delays: Mutex<HashMap<String, usize>>,
    script: Box<Script>,
}

impl ScriptedTransport {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest, Option<&str>) -> session_api_client::Result<ApiResponse>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            token: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            script: Box::new(script),
        })
    }

    /// Make requests to `path` yield `yields` extra times before answering
    pub fn slow(&self, path: &str, yields: usize) {
        self.delays.lock().unwrap().insert(path.to_string(), yields);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|sent| sent.path == path)
            .count()
    }

    pub fn refresh_calls(&self) -> usize {
        self.count(REFRESH_PATH)
    }

    pub fn logout_calls(&self) -> usize {
        self.count(LOGOUT_PATH)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> session_api_client::Result<ApiResponse> {
        let bearer = self.token();
        self.log.lock().unwrap().push(Sent {
            path: request.path().to_string(),
            bearer: bearer.clone(),
        });
        let extra = self
            .delays
            .lock()
            .unwrap()
            .get(request.path())
            .copied()
            .unwrap_or(0);
        for _ in 0..=extra {
            tokio::task::yield_now().await;
        }
        (self.script)(request, bearer.as_deref())
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}

/// Server model used by most tests:
///
/// - `valid` is the only accepted access token
/// - `/auth/refresh-token` answers with `refresh_status`, issuing `valid`
/// - `/auth/logout` always succeeds
/// - `/content/{id}` returns an item when authorized
pub fn server(
    valid: &'static str,
    refresh_status: u16,
) -> impl Fn(&ApiRequest, Option<&str>) -> session_api_client::Result<ApiResponse> + Send + Sync
{
    move |request: &ApiRequest, bearer: Option<&str>| {
        let path = request.path();
        if path == LOGOUT_PATH {
            return Ok(ApiResponse::new(200, "{}"));
        }
        if path == REFRESH_PATH {
            if refresh_status == 200 {
                return Ok(ApiResponse::new(
                    200,
                    format!(r#"{{"accessToken":"{valid}"}}"#),
                ));
            }
            return Ok(ApiResponse::new(refresh_status, r#"{"error":"refresh rejected"}"#));
        }
        if bearer != Some(valid) {
            return Ok(ApiResponse::new(401, r#"{"error":"token expired"}"#));
        }
        match path.strip_prefix("/content/") {
            Some(id) => Ok(ApiResponse::new(
                200,
                format!(r#"{{"id":"{id}","title":"Item {id}"}}"#),
            )),
            None => Err(ApiError::network(format!("unscripted path {path}"))),
        }
    }
}

/// Route library logs to the test output; set `RUST_LOG` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(mode: RefreshMode) -> ClientConfig {
    ClientConfig::builder()
        .base_url("https://api.example.com")
        .refresh_mode(mode)
        .build()
}

pub fn client(
    transport: Arc<ScriptedTransport>,
    store: Arc<dyn SessionStore>,
    bus: Arc<dyn SessionEventBus>,
    mode: RefreshMode,
) -> ApiClient {
    init_tracing();
    ApiClient::builder(config(mode))
        .transport(transport)
        .store(store)
        .bus(bus)
        .build()
        .unwrap()
}

/// Collect every event arriving within `window`
pub async fn drain(events: &mut EventStream, window: Duration) -> Vec<SessionEvent> {
    let mut received = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(window, events.next()).await {
        received.push(event);
    }
    received
}

/// Poll `condition` for up to a second
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
