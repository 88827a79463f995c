//! Tenant context resolution.
//!
//! A [`TenantContext`] is built fresh for every request and dropped with it. Nothing here is
//! cached: two concurrent requests never share credential state.

use crate::error::{GatewayError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::Digest as _;
use url::Url;
use zeroize::Zeroizing;

/// Request header carrying the tenant's API credential.
pub const CREDENTIAL_HEADER: &str = "x-mpt-authorization";
/// Request header overriding the upstream endpoint.
pub const ENDPOINT_HEADER: &str = "x-mpt-endpoint";
/// Production endpoint used when a request does not name one.
pub const DEFAULT_ENDPOINT: &str = "https://api.platform.softwareone.com";

/// Opaque bearer credential. The buffer is zeroed on drop and never printed in full.
#[derive(Clone)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    /// Parse a raw header/config value. A leading `Bearer ` is stripped.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] for blank values and values containing whitespace or
    /// control characters.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let token = match trimmed.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
            _ if trimmed.eq_ignore_ascii_case("bearer") => "",
            _ => trimmed,
        };
        if token.is_empty() {
            return Err(GatewayError::Auth("missing API credential".to_string()));
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GatewayError::Auth("malformed API credential".to_string()));
        }
        Ok(Self(Zeroizing::new(token.to_string())))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `…` followed by the last 4 characters; the only form that may be logged.
    #[must_use]
    pub fn redacted(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("…{tail}")
    }

    /// Non-secret identifier for analytics: the `TKN-…` id of `idt:TKN-…:secret` tokens,
    /// otherwise a short SHA-256 fingerprint.
    #[must_use]
    pub fn tenant_hint(&self) -> String {
        let mut parts = self.0.split(':');
        if let (Some("idt"), Some(id), Some(_)) = (parts.next(), parts.next(), parts.next())
            && id.starts_with("TKN-")
        {
            return id.to_string();
        }
        let digest = sha2::Sha256::digest(self.0.as_bytes());
        format!("sha256:{}", &hex::encode(digest)[..12])
    }

    pub(crate) fn authorization_header(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.expose()))
            .map_err(|_| GatewayError::Auth("malformed API credential".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub credential: Credential,
    /// Origin only (`scheme://host[:port]/`).
    pub endpoint: Url,
}

impl TenantContext {
    #[must_use]
    pub fn tenant_hint(&self) -> String {
        self.credential.tenant_hint()
    }
}

/// Per-call metadata (the transport's request headers).
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    headers: HeaderMap,
}

impl RequestMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_headers(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Builder-style insert; invalid names or values are ignored.
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(mut v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            if n.as_str() == CREDENTIAL_HEADER {
                v.set_sensitive(true);
            }
            self.headers.insert(n, v);
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Normalise an endpoint to its origin. `https://host/public/v1` -> `https://host/`.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] for unparsable, non-http(s), host-less URLs and URLs
/// carrying userinfo.
pub fn normalize_endpoint(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| {
        GatewayError::validation_with(
            format!("invalid upstream endpoint: {e}"),
            serde_json::json!({ "header": ENDPOINT_HEADER }),
        )
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(GatewayError::validation(format!(
            "invalid upstream endpoint: unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(GatewayError::validation(
            "invalid upstream endpoint: missing host",
        ));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(GatewayError::validation(
            "invalid upstream endpoint: credentials in URL are not allowed",
        ));
    }
    let origin = url.origin().ascii_serialization();
    Url::parse(&origin)
        .map_err(|e| GatewayError::validation(format!("invalid upstream endpoint: {e}")))
}

pub trait TenantResolver: Send + Sync {
    /// Build the tenant context for one request.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Auth`] when the credential is missing or malformed,
    /// [`GatewayError::Validation`] when the endpoint is malformed.
    fn resolve(&self, metadata: &RequestMetadata) -> Result<TenantContext>;

    fn mode(&self) -> &'static str;
}

/// Networked mode: credential and endpoint come from the request headers.
#[derive(Debug, Clone)]
pub struct HeaderTenantResolver {
    default_endpoint: Url,
}

impl HeaderTenantResolver {
    /// # Errors
    ///
    /// Returns an error if `default_endpoint` is not a valid http(s) origin.
    pub fn new(default_endpoint: &str) -> Result<Self> {
        Ok(Self {
            default_endpoint: normalize_endpoint(default_endpoint)?,
        })
    }
}

impl TenantResolver for HeaderTenantResolver {
    fn resolve(&self, metadata: &RequestMetadata) -> Result<TenantContext> {
        let credential = Credential::parse(metadata.get(CREDENTIAL_HEADER).unwrap_or_default())?;
        let endpoint = match metadata.get(ENDPOINT_HEADER).map(str::trim) {
            Some(raw) if !raw.is_empty() => normalize_endpoint(raw)?,
            _ => self.default_endpoint.clone(),
        };
        Ok(TenantContext {
            credential,
            endpoint,
        })
    }

    fn mode(&self) -> &'static str {
        "networked"
    }
}

/// Local single-tenant mode: one context from process configuration; metadata is ignored.
#[derive(Debug, Clone)]
pub struct LocalTenantResolver {
    context: TenantContext,
}

impl LocalTenantResolver {
    /// # Errors
    ///
    /// Returns an error if the token is blank/malformed or the endpoint is invalid.
    pub fn new(token: &str, endpoint: &str) -> Result<Self> {
        Ok(Self {
            context: TenantContext {
                credential: Credential::parse(token)?,
                endpoint: normalize_endpoint(endpoint)?,
            },
        })
    }
}

impl TenantResolver for LocalTenantResolver {
    fn resolve(&self, _metadata: &RequestMetadata) -> Result<TenantContext> {
        Ok(self.context.clone())
    }

    fn mode(&self) -> &'static str {
        "local"
    }
}
