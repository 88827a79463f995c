//! Test helpers shared by the workspace's integration tests.
//!
//! The main piece is [`StubUpstream`]: a real axum server bound to an ephemeral localhost port
//! that plays back scripted responses and records every request it receives.

use anyhow::Context as _;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse as _, Response};
use axum::routing::any;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Poll an HTTP URL until it returns a success status (2xx/3xx).
///
/// # Errors
///
/// Returns an error if the timeout elapses before the endpoint returns a success status.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

#[derive(Debug, Clone)]
enum StubBody {
    Json(Value),
    Text(String),
}

/// One scripted upstream answer.
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: StatusCode,
    body: StubBody,
    headers: Vec<(String, String)>,
    delay: Option<Duration>,
}

impl StubResponse {
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: StubBody::Json(body),
            headers: Vec::new(),
            delay: None,
        }
    }

    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            body: StubBody::Text(body.into()),
            ..Self::json(status, Value::Null)
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sleep before answering (used to trigger client timeouts).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn into_response(self) -> Response {
        let mut response = match self.body {
            StubBody::Json(v) => (self.status, axum::Json(v)).into_response(),
            StubBody::Text(s) => (self.status, s).into_response(),
        };
        for (name, value) in self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                response.headers_mut().insert(n, v);
            }
        }
        response
    }
}

/// What the stub saw for one request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Raw (still percent-encoded) query string.
    pub query: Option<String>,
    pub authorization: Option<String>,
}

pub type Responder = Arc<dyn Fn(&CapturedRequest) -> StubResponse + Send + Sync>;

struct StubState {
    script: Mutex<VecDeque<StubResponse>>,
    responder: Responder,
    calls: AtomicUsize,
    requests: Mutex<Vec<CapturedRequest>>,
}

/// Scripted upstream server.
///
/// Requests are answered from the script in order; once it is exhausted the responder
/// decides (by default: `200 {"data": []}`). The server shuts down when dropped.
pub struct StubUpstream {
    base_url: String,
    state: Arc<StubState>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl StubUpstream {
    /// Start a stub that plays back `script`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(script: Vec<StubResponse>) -> anyhow::Result<Self> {
        Self::start_with(
            script,
            Arc::new(|_: &CapturedRequest| {
                StubResponse::json(200, serde_json::json!({"data": []}))
            }),
        )
        .await
    }

    /// Start a stub answered by `responder` (after any scripted responses).
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_with(
        script: Vec<StubResponse>,
        responder: Responder,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(StubState {
            script: Mutex::new(script.into()),
            responder,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", any(handle))
            .route("/{*path}", any(handle))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind stub upstream")?;
        let addr = listener.local_addr().context("stub upstream local_addr")?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown: Some(shutdown_tx),
        })
    }

    /// Origin of the stub, e.g. `http://127.0.0.1:41234`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().clone()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.state.requests.lock().last().cloned()
    }
}

impl Drop for StubUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let captured = CapturedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    state.calls.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().push(captured.clone());

    let scripted = state.script.lock().pop_front();
    let response = scripted.unwrap_or_else(|| (state.responder)(&captured));
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }
    response.into_response()
}
