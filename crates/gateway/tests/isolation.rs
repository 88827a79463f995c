mod common;

use common::{harness, metadata};
use marketplace_mcp_gateway::error::ErrorKind;
use marketplace_mcp_gateway::tenant::RequestMetadata;
use marketplace_mcp_gateway::translator::QueryRequest;
use marketplace_test_support::{CapturedRequest, StubResponse, StubUpstream};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
enum TenantCall {
    WithCredential(String),
    Anonymous,
}

fn arb_call() -> impl Strategy<Value = TenantCall> {
    prop_oneof![
        4 => "[0-9]{4}-[0-9]{4}".prop_map(|id| TenantCall::WithCredential(format!("idt:TKN-{id}:secret-{id}"))),
        1 => Just(TenantCall::Anonymous),
    ]
}

async fn run_concurrently(calls: Vec<TenantCall>) -> Result<(), TestCaseError> {
    let echo = Arc::new(|req: &CapturedRequest| {
        StubResponse::json(200, json!({"data": [{"id": "PRD-1", "seen": req.authorization}]}))
    });
    let stub = StubUpstream::start_with(vec![], echo)
        .await
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let h = harness(stub.base_url()).map_err(|e| TestCaseError::fail(e.to_string()))?;

    let mut set = JoinSet::new();
    for (i, call) in calls.iter().cloned().enumerate() {
        let gateway = h.gateway.clone();
        set.spawn(async move {
            let meta = match &call {
                TenantCall::WithCredential(token) => metadata(token),
                TenantCall::Anonymous => RequestMetadata::new(),
            };
            let result = gateway.query(QueryRequest::new("catalog.products"), &meta).await;
            (i, call, result)
        });
    }

    let mut authenticated = 0;
    while let Some(joined) = set.join_next().await {
        let (i, call, result) = joined.map_err(|e| TestCaseError::fail(e.to_string()))?;
        match call {
            TenantCall::WithCredential(token) => {
                authenticated += 1;
                let result = result.map_err(|e| TestCaseError::fail(format!("call {i}: {e}")))?;
                prop_assert_eq!(&result.data[0]["seen"], &json!(format!("Bearer {token}")));
            }
            TenantCall::Anonymous => {
                let err = result.err().map(|e| e.kind());
                prop_assert_eq!(err, Some(ErrorKind::Auth));
            }
        }
    }
    prop_assert_eq!(stub.calls(), authenticated);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Concurrent calls with different credentials only ever see their own.
    #[test]
    fn concurrent_tenants_never_observe_each_others_credentials(
        calls in prop::collection::vec(arb_call(), 2..10)
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("runtime");
        rt.block_on(run_concurrently(calls))?;
    }
}
