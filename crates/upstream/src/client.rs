//! Upstream client: executes fully-resolved request descriptors with timeout and retry.
//!
//! The client owns a single pooled `reqwest::Client` shared by every tenant. Connections carry
//! no tenant state: credentials only ever travel in the per-request headers of a
//! [`UpstreamRequestDescriptor`], and redirects are never followed.

use crate::error::{Result, UpstreamError};
use crate::pagination::PaginationMeta;
use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy, classify, parse_retry_after};
use crate::safety::{OutboundHttpSafety, redact_url, sanitize_reqwest_error};
use mime::Mime;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A fully-resolved upstream call. Built per request, consumed once.
#[derive(Debug, Clone)]
pub struct UpstreamRequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub payload: Value,
    pub pagination: PaginationMeta,
    /// Attempts it took to obtain this response (1 = no retries).
    pub attempts: u32,
}

impl UpstreamResponse {
    #[must_use]
    pub fn record_count(&self) -> usize {
        crate::pagination::record_count(&self.payload)
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    inner: Arc<UpstreamClientInner>,
}

struct UpstreamClientInner {
    http: reqwest::Client,
    retry: RetryPolicy,
    safety: OutboundHttpSafety,
    requests_sent: AtomicU64,
}

enum AttemptFailure {
    Status {
        status: u16,
        body: Value,
        retry_after: Option<Duration>,
    },
    TimedOut,
    Transport(String),
    Fatal(UpstreamError),
}

impl AttemptFailure {
    fn decision(&self) -> RetryDecision {
        match self {
            Self::Status { status, .. } => classify(AttemptOutcome::Status(*status)),
            Self::TimedOut => classify(AttemptOutcome::TimedOut),
            Self::Transport(_) => classify(AttemptOutcome::Transport),
            Self::Fatal(_) => RetryDecision::GiveUp,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn into_error(self, timeout: Duration, attempts: u32) -> UpstreamError {
        match self {
            Self::Status { status, body, .. } => UpstreamError::Status {
                status,
                body,
                attempts,
            },
            Self::TimedOut => UpstreamError::Timeout { timeout, attempts },
            Self::Transport(message) => UpstreamError::Transport { message, attempts },
            Self::Fatal(e) => e,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Status { status, .. } => format!("status {status}"),
            Self::TimedOut => "timeout".to_string(),
            Self::Transport(m) => m.clone(),
            Self::Fatal(e) => e.to_string(),
        }
    }
}

impl UpstreamClient {
    /// Build a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed (TLS backend
    /// initialisation failure).
    pub fn new(retry: RetryPolicy, safety: OutboundHttpSafety) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| UpstreamError::Transport {
                message: sanitize_reqwest_error(&e),
                attempts: 0,
            })?;

        Ok(Self {
            inner: Arc::new(UpstreamClientInner {
                http,
                retry,
                safety,
                requests_sent: AtomicU64::new(0),
            }),
        })
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Total HTTP attempts made by this client (including retries).
    #[must_use]
    pub fn requests_sent(&self) -> u64 {
        self.inner.requests_sent.load(Ordering::Relaxed)
    }

    /// Execute a descriptor, retrying transient failures per the client's [`RetryPolicy`].
    ///
    /// Dropping the returned future abandons the in-flight HTTP request.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Blocked`] if the URL violates the outbound safety policy (nothing sent)
    /// - [`UpstreamError::Status`] for non-retryable statuses, or retryable ones once attempts
    ///   are exhausted
    /// - [`UpstreamError::Timeout`] / [`UpstreamError::Transport`] once attempts are exhausted
    /// - [`UpstreamError::ResponseTooLarge`] if the body exceeds the safety limit
    pub async fn execute(&self, descriptor: UpstreamRequestDescriptor) -> Result<UpstreamResponse> {
        let UpstreamRequestDescriptor {
            method,
            url,
            headers,
            timeout,
        } = descriptor;

        self.inner.safety.check_url(&url).await?;

        let target = redact_url(&url);
        let max_attempts = self.inner.retry.max_attempts();
        let mut attempt: u32 = 1;
        loop {
            match self.send_once(&method, &url, &headers, timeout).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    debug!(
                        url = %target,
                        status = response.status,
                        attempt,
                        "upstream request succeeded"
                    );
                    return Ok(response);
                }
                Err(failure) => {
                    let retryable = failure.decision() == RetryDecision::Retry;
                    if !retryable || attempt >= max_attempts {
                        debug!(
                            url = %target,
                            attempt,
                            retryable,
                            failure = %failure.describe(),
                            "upstream request failed"
                        );
                        return Err(failure.into_error(timeout, attempt));
                    }

                    let delay = self.inner.retry.delay_after(attempt, failure.retry_after());
                    warn!(
                        url = %target,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        failure = %failure.describe(),
                        "retrying upstream request"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> std::result::Result<UpstreamResponse, AttemptFailure> {
        self.inner.requests_sent.fetch_add(1, Ordering::Relaxed);

        let request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .headers(headers.clone())
            .timeout(timeout);

        let response = request.send().await.map_err(attempt_failure)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = read_body_limited(response, self.inner.safety.max_response_bytes).await?;
        let body = decode_body(&bytes, content_type.as_deref());

        if status.is_success() {
            Ok(UpstreamResponse {
                status: status.as_u16(),
                pagination: PaginationMeta::from_payload(&body),
                payload: body,
                attempts: 0,
            })
        } else {
            Err(AttemptFailure::Status {
                status: status.as_u16(),
                body,
                retry_after,
            })
        }
    }
}

fn attempt_failure(e: reqwest::Error) -> AttemptFailure {
    if e.is_timeout() {
        AttemptFailure::TimedOut
    } else {
        AttemptFailure::Transport(sanitize_reqwest_error(&e))
    }
}

async fn read_body_limited(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> std::result::Result<Vec<u8>, AttemptFailure> {
    let Some(max) = max_bytes else {
        let bytes = response.bytes().await.map_err(attempt_failure)?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(AttemptFailure::Fatal(UpstreamError::ResponseTooLarge {
            limit: max,
        }));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(attempt_failure)? {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(AttemptFailure::Fatal(UpstreamError::ResponseTooLarge {
                limit: max,
            }));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let Ok(m) = ct.parse::<Mime>() else {
        return false;
    };
    m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON)
}

/// JSON bodies become structured values; anything else is kept as text.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    if (is_json_content_type(content_type) || content_type.is_none())
        && let Ok(v) = serde_json::from_slice::<Value>(bytes)
    {
        return v;
    }
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}
