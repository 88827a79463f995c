mod common;

use common::{TOKEN, harness, metadata, populate_docs};
use marketplace_mcp_gateway::tools::{self, call_tool};
use marketplace_test_support::{StubResponse, StubUpstream};
use serde_json::{Value, json};
use std::collections::HashSet;

fn structured(result: &rmcp::model::CallToolResult) -> Value {
    result.structured_content.clone().expect("structured content")
}

#[tokio::test]
async fn resources_tool_lists_whole_catalog_once() -> anyhow::Result<()> {
    let h = harness("https://api.example.com")?;

    let result = call_tool(&h.gateway, tools::RESOURCES, json!({}), &metadata(TOKEN)).await;

    assert_eq!(result.is_error, Some(false));
    let body = structured(&result);
    let resources = body["resources"].as_array().expect("array");
    assert_eq!(resources.len(), h.gateway.catalog().len());
    assert_eq!(body["total"], json!(h.gateway.catalog().len()));
    let names: HashSet<&str> = resources.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names.len(), resources.len());
    Ok(())
}

#[tokio::test]
async fn non_integer_or_non_positive_limits_are_rejected() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![]).await?;
    let h = harness(stub.base_url())?;

    for limit in [json!(0), json!(-1), json!(2.5), json!("5"), json!(null)] {
        let result = call_tool(
            &h.gateway,
            tools::QUERY,
            json!({"resource": "catalog.products", "limit": limit}),
            &metadata(TOKEN),
        )
        .await;
        assert_eq!(result.is_error, Some(true), "limit {limit}");
        assert_eq!(structured(&result)["error"]["kind"], json!("validation"));
    }
    assert_eq!(stub.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn query_tool_returns_structured_and_text_content() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![StubResponse::json(
        200,
        json!({"data": [{"id": "PRD-1", "name": "Microsoft 365"}]}),
    )])
    .await?;
    let h = harness(stub.base_url())?;

    let result = call_tool(
        &h.gateway,
        tools::QUERY,
        json!({"resource": "catalog.products", "rql": "eq(status,Published)", "limit": 1}),
        &metadata(TOKEN),
    )
    .await;

    assert_eq!(result.is_error, Some(false));
    let body = structured(&result);
    assert_eq!(body["recordCount"], json!(1));
    assert_eq!(body["data"][0]["id"], json!("PRD-1"));
    assert_eq!(body["pagination"]["hasMore"], json!(true));

    let text = result.content[0].as_text().expect("text content");
    let parsed: Value = serde_json::from_str(&text.text)?;
    assert_eq!(parsed, body);
    Ok(())
}

#[tokio::test]
async fn unknown_parameter_and_tool_get_suggestions() -> anyhow::Result<()> {
    let h = harness("https://api.example.com")?;

    let result = call_tool(
        &h.gateway,
        tools::QUERY,
        json!({"resource": "catalog.products", "limt": 5}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(true));
    let message = structured(&result)["error"]["message"].clone();
    assert_eq!(
        message,
        json!("Invalid params: unknown parameter 'limt' (did you mean 'limit'?)")
    );

    let result = call_tool(&h.gateway, "marketplace_querry", json!({}), &metadata(TOKEN)).await;
    assert_eq!(result.is_error, Some(true));
    let details = structured(&result)["error"]["details"].clone();
    assert_eq!(details["suggestions"][0], json!(tools::QUERY));
    Ok(())
}

#[tokio::test]
async fn docs_tools_report_not_ready_then_serve_pages() -> anyhow::Result<()> {
    let h = harness("https://api.example.com")?;

    let result = call_tool(&h.gateway, tools::DOCS_LIST, Value::Null, &metadata(TOKEN)).await;
    assert_eq!(result.is_error, Some(true));
    let err = structured(&result)["error"].clone();
    assert_eq!(err["kind"], json!("not_ready"));
    assert_eq!(err["retryable"], json!(true));

    let loaded = populate_docs(&h.gateway).await?;

    let result = call_tool(
        &h.gateway,
        tools::DOCS_LIST,
        json!({"section": "rql"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(false));
    let listing = structured(&result);
    assert!(listing["total"].as_u64().unwrap_or_default() >= 1);
    assert!(
        listing["items"]
            .as_array()
            .expect("items")
            .iter()
            .all(|i| i["id"].as_str().unwrap_or_default().starts_with("rql/"))
    );

    let result = call_tool(
        &h.gateway,
        tools::DOCS_GET,
        json!({"id": "getting-started/authentication"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(false));
    assert!(
        structured(&result)["body"]
            .as_str()
            .unwrap_or_default()
            .contains("X-MPT-Authorization")
    );

    let result = call_tool(&h.gateway, tools::DOCS_INDEX, json!({}), &metadata(TOKEN)).await;
    assert_eq!(structured(&result)["total"], json!(loaded));

    let result = call_tool(
        &h.gateway,
        tools::DOCS_GET,
        json!({"id": "does/not-exist"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(structured(&result)["error"]["kind"], json!("not_found"));
    Ok(())
}

#[tokio::test]
async fn resource_info_describes_related_resources() -> anyhow::Result<()> {
    let h = harness("https://api.example.com")?;

    let result = call_tool(
        &h.gateway,
        tools::RESOURCE_INFO,
        json!({"resource": "catalog.products"}),
        &metadata(TOKEN),
    )
    .await;

    assert_eq!(result.is_error, Some(false));
    let info = structured(&result);
    assert_eq!(info["category"], json!("catalog"));
    assert!(
        info["related"]["children"]
            .as_array()
            .expect("children")
            .contains(&json!("catalog.products.by_id"))
    );
    assert!(!info["examples"].as_array().expect("examples").is_empty());
    Ok(())
}

#[tokio::test]
async fn quick_query_templates_run_through_the_query_tool() -> anyhow::Result<()> {
    let stub = StubUpstream::start(vec![]).await?;
    let h = harness(stub.base_url())?;

    let result = call_tool(
        &h.gateway,
        tools::QUICK_QUERIES,
        json!({"category": "subscriptions"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(false));
    let body = structured(&result);
    let categories = body["categories"].as_array().expect("categories");
    assert_eq!(categories.len(), 1);
    let expiring = categories[0]["templates"]
        .as_array()
        .expect("templates")
        .iter()
        .find(|t| t["name"] == json!("Expiring soon"))
        .expect("expiring template")
        .clone();
    assert_eq!(expiring["query"]["order"], json!("+endDate"));
    assert!(!body["tips"]["howToUse"].as_array().expect("tips").is_empty());

    let result = call_tool(
        &h.gateway,
        tools::QUERY,
        expiring["query"].clone(),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(false), "{:?}", result.structured_content);
    let seen = stub.last_request().expect("request");
    assert_eq!(seen.path, "/public/v1/commerce/subscriptions");
    let query = seen.query.expect("query string");
    assert!(query.starts_with("and(eq(status,Active),lt(endDate,2024-12-31))&"), "{query}");
    assert!(query.contains("order=%2BendDate"), "{query}");

    let result = call_tool(
        &h.gateway,
        tools::QUICK_QUERIES,
        json!({"category": "ordrs"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(true));
    let err = structured(&result)["error"].clone();
    assert_eq!(err["kind"], json!("validation"));
    assert_eq!(err["details"]["suggestions"][0], json!("orders"));
    Ok(())
}

#[tokio::test]
async fn audit_fields_tool_lists_events_and_paths() -> anyhow::Result<()> {
    let h = harness("https://api.example.com")?;

    let result = call_tool(
        &h.gateway,
        tools::AUDIT_FIELDS,
        json!({"resource": "commerce.orders"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(false));
    let body = structured(&result);
    assert_eq!(body["resource"], json!("commerce.orders"));
    let paths = body["paths"].as_array().expect("paths");
    assert!(paths.contains(&json!("audit.completed.at")));
    assert!(paths.contains(&json!("audit.failed.by")));
    assert_eq!(paths.len(), body["events"].as_array().expect("events").len() * 2);
    assert!(body.get("hint").is_none());

    let result = call_tool(
        &h.gateway,
        tools::AUDIT_FIELDS,
        json!({"resource": "audit.records"}),
        &metadata(TOKEN),
    )
    .await;
    let body = structured(&result);
    assert_eq!(body["events"], json!([]));
    assert!(body["hint"].is_string());

    let result = call_tool(&h.gateway, tools::AUDIT_FIELDS, json!({}), &metadata(TOKEN)).await;
    let by_resource = structured(&result)["byResource"].clone();
    assert_eq!(by_resource["catalog.products"], json!(["created", "updated"]));
    assert!(by_resource.get("audit.records").is_none());

    let result = call_tool(
        &h.gateway,
        tools::AUDIT_FIELDS,
        json!({"resource": "commerce.ordrs"}),
        &metadata(TOKEN),
    )
    .await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(structured(&result)["error"]["kind"], json!("validation"));
    Ok(())
}
