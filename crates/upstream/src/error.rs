//! Error types for `marketplace-upstream`.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single upstream execution, after the retry policy has been applied.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Every attempt timed out (or the last retryable attempt did).
    #[error("upstream request timed out after {timeout:?} ({attempts} attempt(s))")]
    Timeout { timeout: Duration, attempts: u32 },

    /// The upstream answered with a non-2xx status.
    #[error("upstream returned {status} after {attempts} attempt(s)")]
    Status {
        status: u16,
        body: Value,
        attempts: u32,
    },

    /// Connect/IO/protocol failure before a response was received.
    #[error("upstream transport error: {message}")]
    Transport { message: String, attempts: u32 },

    /// Rejected by the outbound safety policy; nothing was sent.
    #[error("outbound request blocked: {0}")]
    Blocked(String),

    /// Response body exceeded the configured size limit.
    #[error("upstream response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },

    /// The request descriptor could not be turned into an HTTP request.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Number of HTTP attempts made before giving up (0 when nothing was sent).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. }
            | Self::Status { attempts, .. }
            | Self::Transport { attempts, .. } => *attempts,
            Self::Blocked(_) | Self::ResponseTooLarge { .. } | Self::InvalidRequest(_) => 0,
        }
    }

    /// HTTP status, when the upstream produced one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;
