use marketplace_test_support::{StubResponse, StubUpstream};
use marketplace_upstream::{
    OutboundHttpSafety, RetryPolicy, UpstreamClient, UpstreamError, UpstreamRequestDescriptor,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use std::time::Duration;
use url::Url;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        maximum_attempts: 3,
        initial_interval_ms: 5,
        backoff_coefficient: 2.0,
        maximum_interval_ms: 20,
    }
}

fn descriptor(base: &str, path_and_query: &str, timeout: Duration) -> UpstreamRequestDescriptor {
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_static("Bearer idt:TKN-0000-0001:secret");
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    UpstreamRequestDescriptor {
        method: reqwest::Method::GET,
        url: Url::parse(&format!("{base}{path_and_query}")).expect("url"),
        headers,
        timeout,
    }
}

#[tokio::test]
async fn retries_transient_statuses_until_success() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![
        StubResponse::json(503, json!({"error": "busy"})),
        StubResponse::json(503, json!({"error": "busy"})),
        StubResponse::json(
            200,
            json!({"$meta": {"pagination": {"offset": 0, "limit": 10, "total": 1}}, "data": [{"id": "PRD-1"}]}),
        ),
    ])
    .await?;
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::permissive())?;

    let resp = client
        .execute(descriptor(
            stub.base_url(),
            "/public/v1/catalog/products?limit=10&offset=0",
            Duration::from_secs(5),
        ))
        .await?;

    assert_eq!(stub.calls(), 3);
    assert_eq!(client.requests_sent(), 3);
    assert_eq!(resp.attempts, 3);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.pagination.total, Some(1));
    assert_eq!(resp.record_count(), 1);
    Ok(())
}

#[tokio::test]
async fn client_errors_are_not_retried() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![StubResponse::json(
        404,
        json!({"title": "Not Found"}),
    )])
    .await?;
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::permissive())?;

    let err = client
        .execute(descriptor(stub.base_url(), "/public/v1/commerce/orders/ORD-1", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert_eq!(stub.calls(), 1);
    match err {
        UpstreamError::Status {
            status,
            body,
            attempts,
        } => {
            assert_eq!(status, 404);
            assert_eq!(attempts, 1);
            assert_eq!(body, json!({"title": "Not Found"}));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_status() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![
        StubResponse::text(502, "bad gateway"),
        StubResponse::text(502, "bad gateway"),
        StubResponse::text(502, "bad gateway"),
        StubResponse::json(200, json!({"data": []})),
    ])
    .await?;
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::permissive())?;

    let err = client
        .execute(descriptor(stub.base_url(), "/x", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert_eq!(stub.calls(), 3);
    assert_eq!(err.status(), Some(502));
    assert_eq!(err.attempts(), 3);
    Ok(())
}

#[tokio::test]
async fn slow_upstream_times_out_after_all_attempts() -> anyhow::Result<()> {
    let slow = StubResponse::json(200, json!({"data": []})).with_delay(Duration::from_millis(500));
    let stub = StubUpstream::start(vec![slow.clone(), slow]).await?;
    let policy = RetryPolicy {
        maximum_attempts: 2,
        ..fast_retry()
    };
    let client = UpstreamClient::new(policy, OutboundHttpSafety::permissive())?;

    let err = client
        .execute(descriptor(stub.base_url(), "/slow", Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Timeout { attempts: 2, .. }), "{err}");
    Ok(())
}

#[tokio::test]
async fn retry_after_header_is_honoured() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![
        StubResponse::json(429, json!({"error": "slow down"})).with_header("retry-after", "0"),
        StubResponse::json(200, json!({"data": [1]})),
    ])
    .await?;
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::permissive())?;

    let resp = client
        .execute(descriptor(stub.base_url(), "/limited", Duration::from_secs(5)))
        .await?;
    assert_eq!(resp.attempts, 2);
    assert_eq!(stub.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn credential_travels_only_as_bearer_header() -> anyhow::Result<()> {
    let stub = StubUpstream::start(Vec::new()).await?;
    let client = UpstreamClient::new(RetryPolicy::no_retry(), OutboundHttpSafety::permissive())?;

    client
        .execute(descriptor(stub.base_url(), "/public/v1/catalog/products?limit=1", Duration::from_secs(5)))
        .await?;

    let seen = stub.last_request().expect("request captured");
    assert_eq!(
        seen.authorization.as_deref(),
        Some("Bearer idt:TKN-0000-0001:secret")
    );
    assert_eq!(seen.query.as_deref(), Some("limit=1"));
    Ok(())
}

#[tokio::test]
async fn blocked_destination_sends_nothing() -> anyhow::Result<()> {
    let stub = StubUpstream::start(Vec::new()).await?;
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::multi_tenant_default())?;

    let err = client
        .execute(descriptor(stub.base_url(), "/x", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Blocked(_)));
    assert_eq!(stub.calls(), 0);
    assert_eq!(client.requests_sent(), 0);
    Ok(())
}

#[tokio::test]
async fn oversized_bodies_are_rejected_without_retry() -> anyhow::Result<()> {
    let big = "x".repeat(4096);
    let stub = StubUpstream::start(vec![StubResponse::json(200, json!({"blob": big}))]).await?;
    let mut safety = OutboundHttpSafety::permissive();
    safety.max_response_bytes = Some(1024);
    let client = UpstreamClient::new(fast_retry(), safety)?;

    let err = client
        .execute(descriptor(stub.base_url(), "/big", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::ResponseTooLarge { limit: 1024 }));
    assert_eq!(stub.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn refused_connections_are_retried_then_reported_as_transport() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    let client = UpstreamClient::new(fast_retry(), OutboundHttpSafety::permissive())?;

    let err = client
        .execute(descriptor(
            &format!("http://{addr}"),
            "/public/v1/catalog/products",
            Duration::from_secs(5),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Transport { attempts: 3, .. }), "{err}");
    assert_eq!(client.requests_sent(), 3);
    assert!(!err.to_string().contains("secret"));
    Ok(())
}
