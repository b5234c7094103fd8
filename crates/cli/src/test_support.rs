// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: mock HTTP endpoints, an in-memory secure
//! store, and assertion helpers.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::credential::store::SecureStore;
use crate::provider::Profile;

/// Assert that an expression is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// One scripted HTTP answer.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body: body.to_string(), headers: vec![] }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self { status, body: body.to_owned(), headers: vec![] }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }
}

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, Vec<Reply>>,
    requests: Mutex<Vec<Recorded>>,
}

/// An in-process HTTP server answering each path from a script.
///
/// The n-th request to a path gets the n-th reply; once the script runs out
/// the last reply repeats. Unscripted paths answer 404.
pub struct MockServer {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn start(routes: Vec<(&str, Vec<Reply>)>) -> Self {
        let scripts = routes.into_iter().map(|(path, replies)| (path.to_owned(), replies)).collect();
        let state = Arc::new(MockState { scripts, requests: Mutex::new(vec![]) });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.requests.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn requests(&self, path: &str) -> Vec<Recorded> {
        self.state.requests.lock().iter().filter(|r| r.path == path).cloned().collect()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_owned();
    let seen = {
        let mut requests = state.requests.lock();
        let seen = requests.iter().filter(|r| r.path == path).count();
        requests.push(Recorded {
            method: method.to_string(),
            path: path.clone(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.as_str().to_owned(), v.to_str().unwrap_or("").to_owned()))
                .collect(),
            body,
        });
        seen
    };

    let Some(reply) = state.scripts.get(&path).and_then(|s| s.get(seen).or_else(|| s.last()))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut out = HeaderMap::new();
    out.insert("content-type", HeaderValue::from_static("application/json"));
    for (name, value) in &reply.headers {
        if let (Ok(n), Ok(v)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            out.insert(n, v);
        }
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, out, reply.body.clone()).into_response()
}

/// In-memory [`SecureStore`] with a write log.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn with_entry(service: &str, value: &str) -> Self {
        let store = Self::default();
        store.entries.lock().insert(service.to_owned(), value.to_owned());
        store
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn get(&self, service: &str) -> Option<String> {
        self.entries.lock().get(service).cloned()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }
}

impl SecureStore for MemoryStore {
    fn read<'a>(
        &'a self,
        service: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.get(service)) })
    }

    fn write<'a>(
        &'a self,
        service: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail_writes {
                anyhow::bail!("store is read-only");
            }
            self.writes.lock().push((service.to_owned(), value.to_owned()));
            self.entries.lock().insert(service.to_owned(), value.to_owned());
            Ok(())
        })
    }
}

/// Write `contents` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dirs");
    }
    std::fs::write(&path, contents).expect("write file");
    path
}

/// Install the ring provider for reqwest. Safe to call from every test.
pub fn install_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

pub fn http_client() -> reqwest::Client {
    install_crypto();
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("http client")
}

/// A copy of `profile` with no built-in endpoints, so only overrides are tried.
pub fn offline(profile: &'static Profile) -> &'static Profile {
    Box::leak(Box::new(Profile { token_endpoints: &[], usage_endpoints: &[], ..*profile }))
}
