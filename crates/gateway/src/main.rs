use anyhow::{Context, Result};
use clap::Parser;
use marketplace_mcp_gateway::analytics::{ChannelEventSink, EventSink, NoopEventSink};
use marketplace_mcp_gateway::catalog::Catalog;
use marketplace_mcp_gateway::config::GatewayConfig;
use marketplace_mcp_gateway::docs::{DocSource, DocsCache, EmbeddedDocs, FileDocs};
use marketplace_mcp_gateway::gateway::Gateway;
use marketplace_mcp_gateway::quick_queries::QuickQueries;
use marketplace_mcp_gateway::{http, telemetry, tools};
use marketplace_upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::parse();
    telemetry::init(config.log_format)?;
    config.validate()?;

    info!(version = VERSION, mode = config.mode.as_str(), bind = %config.bind, "starting marketplace gateway");

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("load catalog {}", path.display()))?,
        None => Catalog::builtin().context("load built-in catalog")?,
    };
    info!(resources = catalog.len(), "resource catalog loaded");

    let client = UpstreamClient::new(config.retry_policy(), config.outbound_safety())
        .context("build upstream client")?;
    let resolver = config
        .tenant_resolver()
        .context("build tenant resolver")?;
    let docs = Arc::new(DocsCache::new(config.docs_public_url()));

    let (events, drain): (Arc<dyn EventSink>, _) = if config.analytics_enabled {
        let (sink, handle) = ChannelEventSink::spawn_logging(config.analytics_queue);
        (Arc::new(sink), Some(handle))
    } else {
        (Arc::new(NoopEventSink), None)
    };

    let templates = QuickQueries::builtin().context("load query templates")?;
    let gateway = Gateway::new(Arc::new(catalog), resolver, client, Arc::clone(&docs))
        .with_event_sink(events)
        .with_quick_queries(templates)
        .with_request_timeout(config.request_timeout());
    info!(tools = tools::tool_definitions().len(), "tool surface ready");

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    info!(addr = %listener.local_addr()?, "health listener bound");

    // Readiness flips once population completes.
    let source: Box<dyn DocSource> = match &config.docs_path {
        Some(path) => Box::new(FileDocs::new(path)),
        None => Box::new(EmbeddedDocs),
    };
    tokio::spawn(async move {
        match docs.populate(source.as_ref()).await {
            Ok(entries) => info!(entries, source = %source.describe(), "documentation cache ready"),
            Err(e) => error!(error = %e, source = %source.describe(), "documentation cache population failed"),
        }
    });

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                signal.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    http::serve(listener, gateway.clone(), shutdown.cancelled_owned())
        .await
        .context("health server")?;

    // Flush queued analytics once the last sink handle is gone.
    drop(gateway);
    if let Some(handle) = drain
        && tokio::time::timeout(Duration::from_secs(5), handle).await.is_err()
    {
        warn!("analytics drain did not finish before shutdown");
    }

    info!("marketplace gateway stopped");
    Ok(())
}
