//! Outbound HTTP safety controls (SSRF protection, limits, redaction).
//!
//! In networked mode the upstream endpoint is chosen by the caller (via request metadata), so
//! every outbound URL is checked before a connection is attempted.

use crate::error::UpstreamError;
use std::collections::HashSet;
use std::net::IpAddr;
use tokio::net::lookup_host;
use url::Url;

#[derive(Debug, Clone)]
pub struct OutboundHttpSafety {
    /// If set, only these hosts are allowed (case-insensitive).
    pub allowed_hosts: Option<HashSet<String>>,
    /// If true, allow private/loopback/link-local/reserved destination IPs.
    pub allow_private_networks: bool,
    /// Maximum response body size (bytes). `None` = unlimited.
    pub max_response_bytes: Option<usize>,
}

impl OutboundHttpSafety {
    /// Policy for local development and tests: any host, any address, no size limit.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_hosts: None,
            allow_private_networks: true,
            max_response_bytes: None,
        }
    }

    /// Default policy for a multi-tenant deployment.
    #[must_use]
    pub fn multi_tenant_default() -> Self {
        Self {
            allowed_hosts: None,
            allow_private_networks: false,
            max_response_bytes: Some(8 * 1024 * 1024), // 8 MiB
        }
    }

    /// Validate a URL before making an outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Blocked`] if the URL is disallowed by the policy (unsupported
    /// scheme, host not in allowlist, or hostname resolves to a disallowed IP range).
    pub async fn check_url(&self, url: &Url) -> Result<(), UpstreamError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(UpstreamError::Blocked(format!(
                "unsupported URL scheme '{scheme}'"
            )));
        }

        let Some(host) = url.host_str() else {
            return Err(UpstreamError::Blocked("missing URL host".to_string()));
        };

        if let Some(allowed) = &self.allowed_hosts
            && !allowed.contains(&host.to_ascii_lowercase())
        {
            return Err(UpstreamError::Blocked(format!(
                "host '{host}' not in allowlist"
            )));
        }

        if self.allow_private_networks {
            return Ok(());
        }

        // IPv6 literals come back bracketed from `host_str`.
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            if !is_public_destination(ip) {
                return Err(UpstreamError::Blocked(format!(
                    "destination IP '{ip}' is not allowed"
                )));
            }
            return Ok(());
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let resolved: Vec<IpAddr> = lookup_host((host, port))
            .await
            .map_err(|e| UpstreamError::Blocked(format!("DNS lookup failed for host '{host}': {e}")))?
            .map(|addr| addr.ip())
            .collect();

        if resolved.is_empty() {
            return Err(UpstreamError::Blocked(format!(
                "DNS lookup returned no addresses for host '{host}'"
            )));
        }
        if let Some(ip) = resolved.into_iter().find(|ip| !is_public_destination(*ip)) {
            return Err(UpstreamError::Blocked(format!(
                "host '{host}' resolved to disallowed IP '{ip}'"
            )));
        }
        Ok(())
    }
}

/// Strip userinfo, query and fragment from a URL so it can be logged.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

/// Whether a Marketplace endpoint may live at `ip`: anything routable on the public
/// internet. Loopback, private, link-local (cloud metadata), CGNAT and reserved ranges are not.
fn is_public_destination(ip: IpAddr) -> bool {
    let v4 = match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4,
            None => {
                return !(v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_multicast()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local());
            }
        },
    };
    let [a, b, ..] = v4.octets();
    let cgnat = a == 100 && (64..=127).contains(&b);
    !(v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
        || v4.is_multicast()
        || cgnat
        || a >= 240)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn multi_tenant_policy_blocks_loopback_and_metadata_ips() {
        let safety = OutboundHttpSafety::multi_tenant_default();
        for raw in [
            "http://127.0.0.1:1234/",
            "http://169.254.169.254/latest/meta-data",
            "http://[::1]:8080/",
            "http://[::ffff:10.0.0.1]/",
        ] {
            let url = Url::parse(raw).expect("url");
            let err = safety.check_url(&url).await.unwrap_err();
            assert!(matches!(err, UpstreamError::Blocked(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn only_publicly_routable_addresses_are_destinations() {
        for blocked in ["100.64.0.1", "240.0.0.1", "255.255.255.255", "0.0.0.0", "fd00::1", "fe80::1"] {
            let ip: IpAddr = blocked.parse().expect("ip");
            assert!(!is_public_destination(ip), "{blocked}");
        }
        for public in ["52.31.10.4", "100.128.0.1", "2a05:d018::1", "::ffff:52.31.10.4"] {
            let ip: IpAddr = public.parse().expect("ip");
            assert!(is_public_destination(ip), "{public}");
        }
    }

    #[tokio::test]
    async fn public_ip_literal_passes_without_dns() {
        let safety = OutboundHttpSafety::multi_tenant_default();
        let url = Url::parse("https://52.31.10.4/public/v1/catalog/products").expect("url");
        safety.check_url(&url).await.expect("public literal allowed");
    }

    #[tokio::test]
    async fn permissive_policy_allows_loopback() {
        let safety = OutboundHttpSafety::permissive();
        let url = Url::parse("http://127.0.0.1:1234/").expect("url");
        safety.check_url(&url).await.expect("allowed");
    }

    #[tokio::test]
    async fn allowlist_is_case_insensitive_and_rejects_other_hosts() {
        let mut safety = OutboundHttpSafety::permissive();
        safety.allowed_hosts = Some(HashSet::from(["api.example.com".to_string()]));

        let ok = Url::parse("https://API.example.com/public/v1").expect("url");
        safety.check_url(&ok).await.expect("allowlisted");

        let other = Url::parse("https://evil.example.net/").expect("url");
        let err = safety.check_url(&other).await.unwrap_err();
        assert!(err.to_string().contains("allowlist"));
    }

    #[tokio::test]
    async fn non_http_schemes_are_rejected() {
        let safety = OutboundHttpSafety::permissive();
        let url = Url::parse("file:///etc/passwd").expect("url");
        let err = safety.check_url(&url).await.unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn redact_url_drops_query_and_userinfo() {
        let url = Url::parse("https://user:pw@api.example.com/public/v1/orders?eq(id,1)&limit=5")
            .expect("url");
        assert_eq!(redact_url(&url), "https://api.example.com/public/v1/orders");
    }
}
