//! Gateway error taxonomy.
//!
//! Every failure a caller can see maps to one [`ErrorKind`] and serialises to an
//! [`ErrorPayload`]. Messages never contain credentials.

use marketplace_upstream::UpstreamError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Validation,
    NotReady,
    NotFound,
    Timeout,
    Upstream,
    Transport,
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::NotReady => "not_ready",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Upstream => "upstream",
            Self::Transport => "transport",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed tenant credential. Raised before any network call.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Invalid request (unknown resource, bad limit, unknown field, bad endpoint, ...).
    /// Raised before any network call.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("documentation cache is not ready yet")]
    NotReady,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("upstream returned HTTP {status}")]
    Upstream {
        status: u16,
        body: Value,
        /// How the caller can fix the request, when the failure is recognised.
        hint: Option<String>,
    },

    #[error("upstream unreachable: {0}")]
    Transport(String),

    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotReady => ErrorKind::NotReady,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the caller may reasonably try the same request again later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotReady | Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Upstream { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Auth(_)
            | Self::Validation { .. }
            | Self::NotFound(_)
            | Self::Cancelled => false,
        }
    }

    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        let (status, details) = match self {
            Self::Validation { details, .. } => (None, details.clone()),
            Self::Upstream { status, body, hint } => {
                let mut details = serde_json::Map::new();
                if !body.is_null() {
                    details.insert("body".to_string(), body.clone());
                }
                if let Some(hint) = hint {
                    details.insert("hint".to_string(), Value::String(hint.clone()));
                }
                (Some(*status), (!details.is_empty()).then_some(Value::Object(details)))
            }
            _ => (None, None),
        };
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            status,
            details,
            retryable: self.is_retryable(),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Timeout { attempts, .. } => Self::Timeout { attempts },
            UpstreamError::Status { status, body, .. } => Self::Upstream {
                status,
                body,
                hint: None,
            },
            UpstreamError::Transport { message, .. } => Self::Transport(message),
            UpstreamError::Blocked(reason) => {
                Self::validation(format!("upstream endpoint rejected: {reason}"))
            }
            e @ UpstreamError::ResponseTooLarge { .. } => Self::Transport(e.to_string()),
            UpstreamError::InvalidRequest(message) => Self::validation(message),
        }
    }
}

/// Serialisable error object returned to tool callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
