#![allow(dead_code)]

use marketplace_mcp_gateway::analytics::MemoryEventSink;
use marketplace_mcp_gateway::catalog::Catalog;
use marketplace_mcp_gateway::docs::{DocsCache, EmbeddedDocs};
use marketplace_mcp_gateway::gateway::Gateway;
use marketplace_mcp_gateway::quick_queries::QuickQueries;
use marketplace_mcp_gateway::tenant::{CREDENTIAL_HEADER, HeaderTenantResolver, RequestMetadata};
use marketplace_upstream::{OutboundHttpSafety, RetryPolicy, UpstreamClient};
use std::sync::Arc;
use std::time::Duration;

pub const TOKEN: &str = "idt:TKN-0000-0001:s3cr3t-value";

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        maximum_attempts: 3,
        initial_interval_ms: 5,
        backoff_coefficient: 2.0,
        maximum_interval_ms: 20,
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub events: Arc<MemoryEventSink>,
}

/// Networked-mode gateway whose default endpoint is `base_url`. Docs are not populated.
pub fn harness(base_url: &str) -> anyhow::Result<Harness> {
    let catalog = Arc::new(Catalog::builtin()?);
    let resolver = Arc::new(HeaderTenantResolver::new(base_url)?);
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::permissive())?;
    let docs = Arc::new(DocsCache::new(None));
    let events = Arc::new(MemoryEventSink::default());
    let gateway = Gateway::new(catalog, resolver, client, docs)
        .with_event_sink(events.clone())
        .with_quick_queries(QuickQueries::builtin()?)
        .with_request_timeout(Duration::from_secs(5));
    Ok(Harness { gateway, events })
}

pub async fn populate_docs(gateway: &Gateway) -> anyhow::Result<usize> {
    Ok(gateway.docs().populate(&EmbeddedDocs).await?)
}

pub fn metadata(token: &str) -> RequestMetadata {
    RequestMetadata::new().with(CREDENTIAL_HEADER, token)
}
