//! Process configuration: command-line flags with environment fallbacks.

use crate::error::GatewayError;
use crate::tenant::{
    Credential, DEFAULT_ENDPOINT, HeaderTenantResolver, LocalTenantResolver, TenantResolver,
    normalize_endpoint,
};
use clap::{ArgAction, Parser, ValueEnum};
use marketplace_upstream::{OutboundHttpSafety, RetryPolicy};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Credentials and endpoint come from each request's headers.
    Networked,
    /// A single credential and endpoint from configuration serve every request.
    Local,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Networked => "networked",
            Self::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

#[derive(Clone, Parser)]
#[command(name = "marketplace-mcp-gateway")]
#[command(about = "Multi-tenant gateway exposing the Marketplace API as MCP tools")]
#[command(version)]
pub struct GatewayConfig {
    #[arg(long, env = "MARKETPLACE_GATEWAY_MODE", value_enum, default_value_t = Mode::Networked)]
    pub mode: Mode,

    /// Address for the health/readiness listener.
    #[arg(long, env = "MARKETPLACE_GATEWAY_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Upstream used when a request carries no endpoint header (networked mode).
    #[arg(long, env = "MARKETPLACE_DEFAULT_BASE_URL", default_value = DEFAULT_ENDPOINT)]
    pub default_base_url: String,

    /// Upstream for local mode. Falls back to `--default-base-url`.
    #[arg(long, env = "MARKETPLACE_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Credential for local mode.
    #[arg(long, env = "MARKETPLACE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    #[arg(long, env = "MARKETPLACE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "MARKETPLACE_RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,

    #[arg(long, env = "MARKETPLACE_RETRY_INITIAL_BACKOFF_MS", default_value_t = 200)]
    pub retry_initial_backoff_ms: u64,

    #[arg(long, env = "MARKETPLACE_RETRY_MAX_BACKOFF_MS", default_value_t = 2000)]
    pub retry_max_backoff_ms: u64,

    /// YAML docs file. The embedded reference is used when unset.
    #[arg(long, env = "MARKETPLACE_DOCS_PATH")]
    pub docs_path: Option<PathBuf>,

    /// Base URL for browser links to documentation pages.
    #[arg(long, env = "MARKETPLACE_DOCS_PUBLIC_URL")]
    pub docs_public_url: Option<String>,

    /// YAML resource catalog. The built-in catalog is used when unset.
    #[arg(long, env = "MARKETPLACE_CATALOG_PATH")]
    pub catalog_path: Option<PathBuf>,

    #[arg(long, env = "MARKETPLACE_OUTBOUND_ALLOW_PRIVATE_NETWORKS", action = ArgAction::SetTrue)]
    pub outbound_allow_private_networks: bool,

    /// Comma-separated host allowlist for upstream endpoints. Empty allows any public host.
    #[arg(long, env = "MARKETPLACE_OUTBOUND_ALLOWED_HOSTS", value_delimiter = ',')]
    pub outbound_allowed_hosts: Vec<String>,

    #[arg(long, env = "MARKETPLACE_MAX_RESPONSE_BYTES", default_value_t = 8 * 1024 * 1024)]
    pub max_response_bytes: usize,

    #[arg(long, env = "MARKETPLACE_ANALYTICS_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub analytics_enabled: bool,

    #[arg(long, env = "MARKETPLACE_ANALYTICS_QUEUE", default_value_t = 1024)]
    pub analytics_queue: usize,

    #[arg(long, env = "MARKETPLACE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("mode", &self.mode)
            .field("bind", &self.bind)
            .field("default_base_url", &self.default_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("docs_path", &self.docs_path)
            .field("catalog_path", &self.catalog_path)
            .field("outbound_allowed_hosts", &self.outbound_allowed_hosts)
            .field("analytics_enabled", &self.analytics_enabled)
            .finish_non_exhaustive()
    }
}

impl GatewayConfig {
    /// Check the whole configuration and report every problem at once.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] listing each problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if let Err(e) = normalize_endpoint(&self.default_base_url) {
            problems.push(format!("default base URL: {e}"));
        }
        if let Some(url) = &self.api_base_url
            && let Err(e) = normalize_endpoint(url)
        {
            problems.push(format!("API base URL: {e}"));
        }
        if self.mode == Mode::Local {
            match self.api_token.as_deref() {
                None => problems.push(
                    "local mode requires an API token (MARKETPLACE_API_TOKEN)".to_string(),
                ),
                Some(raw) => {
                    if let Err(e) = Credential::parse(raw) {
                        problems.push(format!("API token: {e}"));
                    }
                }
            }
        }
        if self.request_timeout_secs == 0 {
            problems.push("request timeout must be at least 1 second".to_string());
        }
        if self.retry_max_attempts == 0 {
            problems.push("retry max attempts must be at least 1".to_string());
        }
        if self.retry_initial_backoff_ms > self.retry_max_backoff_ms {
            problems.push(format!(
                "retry initial backoff ({} ms) exceeds max backoff ({} ms)",
                self.retry_initial_backoff_ms, self.retry_max_backoff_ms
            ));
        }
        if self.max_response_bytes == 0 {
            problems.push("max response bytes must be positive".to_string());
        }
        if let Some(raw) = &self.docs_public_url
            && Url::parse(raw).is_err()
        {
            problems.push(format!("docs public URL is not a valid URL: {raw}"));
        }
        if self.analytics_enabled && self.analytics_queue == 0 {
            problems.push("analytics queue capacity must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            maximum_attempts: self.retry_max_attempts,
            initial_interval_ms: self.retry_initial_backoff_ms,
            maximum_interval_ms: self.retry_max_backoff_ms,
            ..RetryPolicy::default()
        }
    }

    #[must_use]
    pub fn outbound_safety(&self) -> OutboundHttpSafety {
        let hosts: HashSet<String> = self
            .outbound_allowed_hosts
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        OutboundHttpSafety {
            allowed_hosts: (!hosts.is_empty()).then_some(hosts),
            allow_private_networks: self.outbound_allow_private_networks,
            max_response_bytes: Some(self.max_response_bytes),
        }
    }

    /// # Errors
    ///
    /// Propagates endpoint/credential validation errors.
    pub fn tenant_resolver(&self) -> Result<Arc<dyn TenantResolver>, GatewayError> {
        match self.mode {
            Mode::Networked => Ok(Arc::new(HeaderTenantResolver::new(&self.default_base_url)?)),
            Mode::Local => {
                let token = self
                    .api_token
                    .as_deref()
                    .ok_or_else(|| GatewayError::Auth("missing API credential".to_string()))?;
                let endpoint = self.api_base_url.as_deref().unwrap_or(&self.default_base_url);
                Ok(Arc::new(LocalTenantResolver::new(token, endpoint)?))
            }
        }
    }

    #[must_use]
    pub fn docs_public_url(&self) -> Option<Url> {
        self.docs_public_url.as_deref().and_then(|u| Url::parse(u).ok())
    }
}
