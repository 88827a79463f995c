//! MCP tool surface over the [`Gateway`] facade.
//!
//! [`tool_definitions`] advertises one read-only tool per gateway operation. [`call_tool`]
//! validates arguments against the advertised schema before dispatching, and maps every
//! outcome to a `CallToolResult` carrying both structured content and JSON text.

use crate::catalog::find_similar_strings;
use crate::docs::DocsFilter;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::tenant::RequestMetadata;
use crate::translator::QueryRequest;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const QUERY: &str = "marketplace_query";
pub const RESOURCES: &str = "marketplace_resources";
pub const RESOURCE_INFO: &str = "marketplace_resource_info";
pub const QUICK_QUERIES: &str = "marketplace_quick_queries";
pub const AUDIT_FIELDS: &str = "marketplace_audit_fields";
pub const DOCS_LIST: &str = "marketplace_docs_list";
pub const DOCS_GET: &str = "marketplace_docs_get";
pub const DOCS_INDEX: &str = "marketplace_docs_index";

pub const TOOL_NAMES: [&str; 8] = [
    QUERY,
    RESOURCES,
    RESOURCE_INFO,
    QUICK_QUERIES,
    AUDIT_FIELDS,
    DOCS_LIST,
    DOCS_GET,
    DOCS_INDEX,
];

fn tool(name: &str, title: &str, description: &str, schema: Value) -> Tool {
    let schema_obj = schema.as_object().cloned().unwrap_or_else(JsonObject::new);
    let mut tool = Tool::new(name.to_string(), description.to_string(), Arc::new(schema_obj));
    tool.annotations = Some(ToolAnnotations {
        title: Some(title.to_string()),
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        // Only data queries leave the process.
        open_world_hint: Some(name == QUERY),
    });
    tool
}

/// Descriptors of every tool, in a stable order.
#[must_use]
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        tool(
            QUERY,
            "Query Marketplace data",
            "Query a Marketplace API resource. Use marketplace_resources to discover resource \
             names and marketplace_resource_info for filterable fields. `rql` is an RQL filter \
             expression such as eq(status,Active) or ilike(name,*Microsoft*).",
            json!({
                "type": "object",
                "properties": {
                    "resource": {"type": "string", "description": "Catalog resource name, e.g. catalog.products"},
                    "rql": {"type": "string", "description": "RQL filter expression"},
                    "limit": {"type": "integer", "minimum": 1, "description": "Page size"},
                    "offset": {"type": "integer", "minimum": 0, "description": "Offset for offset-paginated resources"},
                    "cursor": {"type": "string", "description": "Cursor for cursor-paginated resources"},
                    "fields": {"type": "array", "items": {"type": "string"}, "description": "Fields to select"},
                    "order": {"type": "string", "description": "Comma-separated order fields, '-' prefix for descending"},
                    "path_params": {
                        "type": "object",
                        "additionalProperties": {"type": "string"},
                        "description": "Values for {placeholders} in the resource path"
                    }
                },
                "required": ["resource"],
                "additionalProperties": false
            }),
        ),
        tool(
            RESOURCES,
            "List Marketplace resources",
            "List every queryable Marketplace resource with its category and summary.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        ),
        tool(
            RESOURCE_INFO,
            "Describe a Marketplace resource",
            "Show fields, filterable fields, pagination, related resources and example queries \
             for one resource.",
            json!({
                "type": "object",
                "properties": {
                    "resource": {"type": "string", "description": "Catalog resource name"}
                },
                "required": ["resource"],
                "additionalProperties": false
            }),
        ),
        tool(
            QUICK_QUERIES,
            "Quick query templates",
            "Ready-made marketplace_query arguments for common questions such as recent \
             orders or expiring subscriptions, grouped by category, plus RQL tips.",
            json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string", "description": "Only this category, e.g. orders"}
                },
                "additionalProperties": false
            }),
        ),
        tool(
            AUDIT_FIELDS,
            "Audit fields",
            "List the audit events (audit.<event>.at / audit.<event>.by) a resource records, \
             for filtering and ordering by audit timestamps. Without a resource, lists every \
             audited resource.",
            json!({
                "type": "object",
                "properties": {
                    "resource": {"type": "string", "description": "Catalog resource name"}
                },
                "additionalProperties": false
            }),
        ),
        tool(
            DOCS_LIST,
            "List documentation pages",
            "List Marketplace API documentation pages, optionally filtered by section, tag or \
             a search term.",
            json!({
                "type": "object",
                "properties": {
                    "section": {"type": "string"},
                    "search": {"type": "string"},
                    "tag": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "additionalProperties": false
            }),
        ),
        tool(
            DOCS_GET,
            "Read a documentation page",
            "Return the full markdown body of one documentation page by id.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Page id, e.g. getting-started/authentication"}
                },
                "required": ["id"],
                "additionalProperties": false
            }),
        ),
        tool(
            DOCS_INDEX,
            "Documentation index",
            "Summarize the documentation sections and their page counts.",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        ),
    ]
}

/// Validate tool arguments against the tool's input schema.
///
/// Returns a message plus a structured `validation-errors` object on failure.
pub(crate) fn validate_tool_arguments(tool: &Tool, args: &Value) -> std::result::Result<(), (String, Value)> {
    let schema = Value::Object((*tool.input_schema).clone());
    let props = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let args_obj = args.as_object().cloned().unwrap_or_default();
    let valid_params: Vec<String> = props.keys().cloned().collect();
    let valid_param_refs: Vec<&str> = valid_params.iter().map(String::as_str).collect();

    let mut violations: Vec<Value> = Vec::new();

    for k in args_obj.keys() {
        if props.contains_key(k) {
            continue;
        }
        violations.push(json!({
            "type": "invalid-parameter",
            "parameter": k,
            "suggestions": find_similar_strings(k, &valid_param_refs),
            "validParameters": valid_params,
        }));
    }

    for r in &required {
        if !args_obj.contains_key(r) {
            violations.push(json!({
                "type": "missing-required-parameter",
                "parameter": r,
            }));
        }
    }

    if let Ok(compiled) = jsonschema::validator_for(&schema) {
        for e in compiled.iter_errors(args) {
            // Reported above with a nicer shape.
            if matches!(
                e.kind(),
                jsonschema::error::ValidationErrorKind::Required { .. }
                    | jsonschema::error::ValidationErrorKind::AdditionalProperties { .. }
            ) {
                continue;
            }
            violations.push(json!({
                "type": "constraint-violation",
                "message": e.to_string(),
                "instancePath": e.instance_path().to_string(),
            }));
        }
    }

    if violations.is_empty() {
        return Ok(());
    }

    let first_of = |ty: &str| {
        violations
            .iter()
            .find(|v| v.get("type").and_then(Value::as_str) == Some(ty))
    };
    let msg = if let Some(v) = first_of("invalid-parameter") {
        let p = v.get("parameter").and_then(Value::as_str).unwrap_or("?");
        let suggestion = v
            .get("suggestions")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(Value::as_str);
        match suggestion {
            Some(s) => format!("Invalid params: unknown parameter '{p}' (did you mean '{s}'?)"),
            None => format!("Invalid params: unknown parameter '{p}'"),
        }
    } else if let Some(v) = first_of("missing-required-parameter") {
        let p = v.get("parameter").and_then(Value::as_str).unwrap_or("?");
        format!("Invalid params: missing required parameter '{p}'")
    } else if violations.len() == 1
        && let Some(m) = violations[0].get("message").and_then(Value::as_str)
    {
        let at = violations[0]
            .get("instancePath")
            .and_then(Value::as_str)
            .unwrap_or_default();
        format!("Invalid params: {at}: {m}")
    } else {
        format!(
            "Invalid params: validation failed with {} error(s)",
            violations.len()
        )
    };

    Err((
        msg,
        json!({
            "type": "validation-errors",
            "violations": violations,
        }),
    ))
}

/// Dispatch a tool call. Never fails: errors come back as `is_error` results.
pub async fn call_tool(
    gateway: &Gateway,
    name: &str,
    arguments: Value,
    metadata: &RequestMetadata,
) -> CallToolResult {
    call_tool_cancellable(gateway, name, arguments, metadata, &CancellationToken::new()).await
}

/// Like [`call_tool`], with a cancellation token forwarded to data queries.
pub async fn call_tool_cancellable(
    gateway: &Gateway,
    name: &str,
    arguments: Value,
    metadata: &RequestMetadata,
    cancel: &CancellationToken,
) -> CallToolResult {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    match dispatch(gateway, name, arguments, metadata, cancel).await {
        Ok(v) => success(v),
        Err(e) => {
            debug!(tool = name, kind = %e.kind(), "tool call failed");
            failure(&e)
        }
    }
}

async fn dispatch(
    gateway: &Gateway,
    name: &str,
    arguments: Value,
    metadata: &RequestMetadata,
    cancel: &CancellationToken,
) -> Result<Value> {
    let Some(tool) = tool_definitions().into_iter().find(|t| t.name == name) else {
        let suggestions = find_similar_strings(name, &TOOL_NAMES);
        let message = match suggestions.first() {
            Some(s) => format!("unknown tool '{name}' (did you mean '{s}'?)"),
            None => format!("unknown tool '{name}'"),
        };
        return Err(GatewayError::validation_with(
            message,
            json!({"tool": name, "suggestions": suggestions, "validTools": TOOL_NAMES}),
        ));
    };

    validate_tool_arguments(&tool, &arguments)
        .map_err(|(message, details)| GatewayError::validation_with(message, details))?;

    match name {
        QUERY => {
            let request: QueryRequest = parse_args(arguments)?;
            to_value(
                gateway
                    .query_cancellable(request, metadata, cancel)
                    .await?,
            )
        }
        RESOURCES => to_value(gateway.list_resources()),
        RESOURCE_INFO => {
            let resource = string_arg(&arguments, "resource")?;
            to_value(gateway.resource_info(&resource)?)
        }
        QUICK_QUERIES => {
            let category = optional_string_arg(&arguments, "category");
            to_value(gateway.quick_queries(category.as_deref())?)
        }
        AUDIT_FIELDS => {
            let resource = optional_string_arg(&arguments, "resource");
            to_value(gateway.audit_fields(resource.as_deref())?)
        }
        DOCS_LIST => {
            let filter: DocsFilter = parse_args(arguments)?;
            to_value(gateway.list_docs(&filter)?)
        }
        DOCS_GET => {
            let id = string_arg(&arguments, "id")?;
            to_value(gateway.get_doc(&id)?)
        }
        DOCS_INDEX => to_value(gateway.docs_index()?),
        other => Err(GatewayError::validation(format!("unknown tool '{other}'"))),
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| GatewayError::validation(format!("Invalid params: {e}")))
}

fn string_arg(arguments: &Value, key: &str) -> Result<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::validation(format!("Invalid params: '{key}' must be a string")))
}

fn optional_string_arg(arguments: &Value, key: &str) -> Option<String> {
    arguments.get(key).and_then(Value::as_str).map(str::to_string)
}

fn to_value<T: Serialize>(v: T) -> Result<Value> {
    serde_json::to_value(v).map_err(|e| GatewayError::Transport(format!("failed to encode result: {e}")))
}

fn success(structured: Value) -> CallToolResult {
    // Some MCP clients only render `content`, so the JSON is sent both ways.
    let text = serde_json::to_string(&structured).unwrap_or_else(|_| structured.to_string());
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(structured),
        is_error: Some(false),
        meta: None,
    }
}

fn failure(err: &GatewayError) -> CallToolResult {
    let structured = json!({ "error": err.to_payload() });
    let text = serde_json::to_string(&structured).unwrap_or_else(|_| structured.to_string());
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: Some(structured),
        is_error: Some(true),
        meta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_tool() -> Tool {
        tool_definitions()
            .into_iter()
            .find(|t| t.name == QUERY)
            .expect("query tool")
    }

    #[test]
    fn tool_names_are_unique_and_read_only() {
        let tools = tool_definitions();
        let mut names: Vec<_> = tools.iter().map(|t| t.name.to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TOOL_NAMES.len());
        for t in &tools {
            let a = t.annotations.as_ref().expect("annotations");
            assert_eq!(a.read_only_hint, Some(true));
        }
    }

    #[test]
    fn unknown_parameter_gets_suggestion() {
        let (msg, details) =
            validate_tool_arguments(&query_tool(), &json!({"resource": "x", "limt": 5}))
                .expect_err("should fail");
        assert_eq!(
            msg,
            "Invalid params: unknown parameter 'limt' (did you mean 'limit'?)"
        );
        assert_eq!(details["violations"][0]["type"], json!("invalid-parameter"));
    }

    #[test]
    fn missing_required_is_reported() {
        let (msg, _) = validate_tool_arguments(&query_tool(), &json!({"limit": 5}))
            .expect_err("should fail");
        assert_eq!(msg, "Invalid params: missing required parameter 'resource'");
    }

    #[test]
    fn non_integer_limit_is_a_constraint_violation() {
        for bad in [json!("5"), json!(2.5), json!(0), json!(-1)] {
            let (_, details) =
                validate_tool_arguments(&query_tool(), &json!({"resource": "x", "limit": bad}))
                    .expect_err("should fail");
            assert_eq!(
                details["violations"][0]["type"],
                json!("constraint-violation"),
                "{bad}"
            );
        }
    }

    #[test]
    fn valid_arguments_pass() {
        validate_tool_arguments(
            &query_tool(),
            &json!({
                "resource": "catalog.products",
                "rql": "eq(status,Published)",
                "limit": 5,
                "fields": ["id", "name"],
                "path_params": {"id": "PRD-1"}
            }),
        )
        .expect("valid");
    }

    #[test]
    fn failure_result_carries_error_payload() {
        let r = failure(&GatewayError::NotReady);
        assert_eq!(r.is_error, Some(true));
        let s = r.structured_content.expect("structured");
        assert_eq!(s["error"]["kind"], json!("not_ready"));
        assert_eq!(s["error"]["retryable"], json!(true));
    }
}
