//! Gateway facade: the operations exposed to tool callers.
//!
//! `query` runs Resolver -> Catalog -> Translator -> Upstream Client and fails fast at the
//! first invalid step, so auth and validation errors never reach the network. Catalog and docs
//! operations are pure reads. Every operation records a usage event.

use crate::analytics::{EventSink, NoopEventSink, Outcome, UsageEvent};
use crate::catalog::{
    Catalog, RelatedResources, ResourceDefinition, ResourceSummary, find_similar_strings,
};
use crate::docs::{DocListing, DocPage, DocsCache, DocsFilter, DocsIndex, DocsStatus};
use crate::error::{GatewayError, Result};
use crate::quick_queries::QuickQueries;
use crate::tenant::{RequestMetadata, TenantContext, TenantResolver};
use crate::translator::{PagePosition, QueryRequest, QuerySpec};
use marketplace_upstream::{UpstreamClient, UpstreamResponse};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, info, info_span, warn};
use uuid::Uuid;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub returned: usize,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub request_id: String,
    pub resource: String,
    pub record_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageInfo>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceList {
    pub total: usize,
    pub categories: Vec<String>,
    pub resources: Vec<ResourceSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleQuery {
    pub description: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub resource: ResourceDefinition,
    pub category: String,
    pub path_params: Vec<String>,
    pub related: RelatedResources,
    pub examples: Vec<ExampleQuery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAuditFields {
    pub resource: String,
    pub events: Vec<String>,
    /// `audit.<event>.at` and `audit.<event>.by` for every event.
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AuditFields {
    Resource(ResourceAuditFields),
    All {
        #[serde(rename = "byResource")]
        by_resource: BTreeMap<String, Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub alive: bool,
    pub ready: bool,
    pub mode: &'static str,
    pub resources: usize,
    pub upstream_requests: u64,
    pub docs: DocsStatus,
}

#[derive(Clone)]
pub struct Gateway {
    catalog: Arc<Catalog>,
    resolver: Arc<dyn TenantResolver>,
    client: UpstreamClient,
    docs: Arc<DocsCache>,
    events: Arc<dyn EventSink>,
    quick_queries: Arc<QuickQueries>,
    request_timeout: Duration,
}

impl Gateway {
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        resolver: Arc<dyn TenantResolver>,
        client: UpstreamClient,
        docs: Arc<DocsCache>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            client,
            docs,
            events: Arc::new(NoopEventSink),
            quick_queries: Arc::new(QuickQueries::default()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Serve `templates`, minus those that do not validate against this gateway's catalog.
    #[must_use]
    pub fn with_quick_queries(mut self, templates: QuickQueries) -> Self {
        self.quick_queries = Arc::new(templates.retain_valid(&self.catalog));
        self
    }

    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn docs(&self) -> &DocsCache {
        &self.docs
    }

    #[must_use]
    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    /// Run a data query for the tenant described by `metadata`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Auth`] / [`GatewayError::Validation`] before any network call;
    /// [`GatewayError::Timeout`], [`GatewayError::Upstream`] or [`GatewayError::Transport`]
    /// after the retry policy gave up.
    pub async fn query(&self, request: QueryRequest, metadata: &RequestMetadata) -> Result<QueryResult> {
        self.query_cancellable(request, metadata, &CancellationToken::new())
            .await
    }

    /// Like [`Gateway::query`], but abandons the upstream call as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`Gateway::query`], plus [`GatewayError::Cancelled`].
    pub async fn query_cancellable(
        &self,
        request: QueryRequest,
        metadata: &RequestMetadata,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("query", request_id = %request_id, resource = %request.resource);
        let started = Instant::now();
        let mut tenant_hint = None;

        let result = self
            .run_query(&request, metadata, cancel, &request_id, &mut tenant_hint)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(r) => Outcome::Success {
                result_count: Some(r.record_count),
            },
            Err(e) => Outcome::Failure {
                error_kind: e.kind(),
            },
        };
        self.events.record_event(
            UsageEvent::new(&request_id, "query", started.elapsed(), outcome)
                .with_tenant_hint(tenant_hint)
                .with_resource(Some(request.resource)),
        );
        result
    }

    async fn run_query(
        &self,
        request: &QueryRequest,
        metadata: &RequestMetadata,
        cancel: &CancellationToken,
        request_id: &str,
        tenant_hint: &mut Option<String>,
    ) -> Result<QueryResult> {
        let tenant = self.resolver.resolve(metadata)?;
        *tenant_hint = Some(tenant.tenant_hint());

        let def = self.lookup_resource(&request.resource)?;
        let spec = QuerySpec::build(def, request)?;

        debug!(
            tenant = %tenant.credential.redacted(),
            endpoint = %tenant.endpoint,
            path = %spec.path(),
            limit = spec.limit(),
            "executing upstream query"
        );

        let err = match self.send(&spec, &tenant, cancel).await {
            Ok(response) => return Ok(shape_result(def, &spec, request, response, request_id)),
            Err(err) => err,
        };

        // The upstream rejects `audit` in select for some resources; drop what we added.
        if matches!(err, GatewayError::Upstream { status: 400, .. })
            && let Some(plain) = spec.without_auto_audit()
        {
            warn!(resource = %def.name, "upstream rejected auto-selected 'audit'; retrying without it");
            let response = self.send(&plain, &tenant, cancel).await?;
            let mut result = shape_result(def, &plain, request, response, request_id);
            // A 400 is never retried, so the rejected call was a single attempt.
            result.attempts = result.attempts.saturating_add(1);
            result.notes.push(
                "the upstream rejected the automatically added 'audit' selection; \
                 the query was retried without it"
                    .to_string(),
            );
            return Ok(result);
        }

        Err(with_audit_select_hint(err))
    }

    async fn send(
        &self,
        spec: &QuerySpec,
        tenant: &TenantContext,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let descriptor = spec.to_descriptor(tenant, self.request_timeout)?;
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("query cancelled by caller");
                return Err(GatewayError::Cancelled);
            }
            r = self.client.execute(descriptor) => r,
        };
        response.map_err(|e| redact_credential_echo(e.into(), tenant.credential.expose()))
    }

    fn lookup_resource(&self, name: &str) -> Result<&ResourceDefinition> {
        self.catalog.lookup(name).map_err(|_| {
            let suggestions = self.catalog.suggest(name);
            let message = match suggestions.first() {
                Some(s) => format!("unknown resource '{name}' (did you mean '{s}'?)"),
                None => format!("unknown resource '{name}'"),
            };
            GatewayError::validation_with(
                message,
                json!({
                    "resource": name,
                    "suggestions": suggestions,
                    "categories": self.catalog.categories(),
                    "hint": "use marketplace_resources to list available resources",
                }),
            )
        })
    }

    fn observe<T>(
        &self,
        operation: &str,
        resource: Option<&str>,
        count: impl FnOnce(&T) -> Option<usize>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let request_id = Uuid::new_v4().to_string();
        let _span = info_span!("op", operation, request_id = %request_id).entered();
        let started = Instant::now();
        let result = f();
        let outcome = match &result {
            Ok(v) => Outcome::Success {
                result_count: count(v),
            },
            Err(e) => Outcome::Failure {
                error_kind: e.kind(),
            },
        };
        self.record(&request_id, operation, resource, started, outcome);
        result
    }

    /// Record a usage event for an operation that cannot fail.
    fn record_success(&self, operation: &str, started: Instant, result_count: Option<usize>) {
        let request_id = Uuid::new_v4().to_string();
        self.record(
            &request_id,
            operation,
            None,
            started,
            Outcome::Success { result_count },
        );
    }

    fn record(
        &self,
        request_id: &str,
        operation: &str,
        resource: Option<&str>,
        started: Instant,
        outcome: Outcome,
    ) {
        self.events.record_event(
            UsageEvent::new(request_id, operation, started.elapsed(), outcome)
                .with_resource(resource.map(str::to_string)),
        );
    }

    /// Every resource in the catalog, in catalog order.
    #[must_use]
    pub fn list_resources(&self) -> ResourceList {
        let started = Instant::now();
        let list = ResourceList {
            total: self.catalog.len(),
            categories: self.catalog.categories(),
            resources: self.catalog.summaries(),
        };
        self.record_success("list_resources", started, Some(list.total));
        list
    }

    /// Details, related resources and example queries for one resource.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] (with suggestions) for unknown resources.
    pub fn resource_info(&self, name: &str) -> Result<ResourceInfo> {
        self.observe("resource_info", Some(name), |_| None, || {
            let def = self.lookup_resource(name)?;
            let related = self
                .catalog
                .related(name)
                .map_err(|e| GatewayError::validation(e.to_string()))?;
            Ok(ResourceInfo {
                category: def.category().to_string(),
                path_params: def.path_params().into_iter().map(str::to_string).collect(),
                related,
                examples: example_queries(def),
                resource: def.clone(),
            })
        })
    }

    /// Ready-made query templates, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] for an unknown category.
    pub fn quick_queries(&self, category: Option<&str>) -> Result<QuickQueries> {
        self.observe(
            "quick_queries",
            None,
            |q: &QuickQueries| Some(q.len()),
            || {
                let selected = self.quick_queries.filtered(category);
                if let Some(wanted) = category
                    && selected.categories.is_empty()
                {
                    let known = self.quick_queries.category_names();
                    let refs: Vec<&str> = known.iter().map(String::as_str).collect();
                    return Err(GatewayError::validation_with(
                        format!("unknown template category '{wanted}'"),
                        json!({
                            "category": wanted,
                            "suggestions": find_similar_strings(wanted, &refs),
                            "categories": known,
                        }),
                    ));
                }
                Ok(selected)
            },
        )
    }

    /// Audit event names usable as `audit.<event>.at` / `audit.<event>.by` in filters and
    /// ordering, for one resource or for every audited resource.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Validation`] (with suggestions) for unknown resources.
    pub fn audit_fields(&self, resource: Option<&str>) -> Result<AuditFields> {
        self.observe(
            "audit_fields",
            resource,
            |a: &AuditFields| match a {
                AuditFields::Resource(r) => Some(r.events.len()),
                AuditFields::All { by_resource } => Some(by_resource.len()),
            },
            || {
                let Some(name) = resource else {
                    let by_resource = self
                        .catalog
                        .iter()
                        .map(|def| (def.name.clone(), def.audit_events()))
                        .filter(|(_, events)| !events.is_empty())
                        .collect();
                    return Ok(AuditFields::All { by_resource });
                };
                let def = self.lookup_resource(name)?;
                let events = def.audit_events();
                let paths = events
                    .iter()
                    .flat_map(|e| [format!("audit.{e}.at"), format!("audit.{e}.by")])
                    .collect();
                let hint = events
                    .is_empty()
                    .then(|| "no audit fields are recorded for this resource".to_string());
                Ok(AuditFields::Resource(ResourceAuditFields {
                    resource: def.name.clone(),
                    events,
                    paths,
                    hint,
                }))
            },
        )
    }

    /// # Errors
    ///
    /// [`GatewayError::NotReady`] before the docs cache is populated.
    pub fn list_docs(&self, filter: &DocsFilter) -> Result<DocListing> {
        self.observe(
            "docs_list",
            None,
            |l: &DocListing| Some(l.items.len()),
            || self.docs.list(filter),
        )
    }

    /// # Errors
    ///
    /// [`GatewayError::NotReady`] before the docs cache is populated, [`GatewayError::NotFound`]
    /// for unknown ids.
    pub fn get_doc(&self, id: &str) -> Result<DocPage> {
        self.observe("docs_get", None, |_| Some(1), || self.docs.get(id))
    }

    /// # Errors
    ///
    /// [`GatewayError::NotReady`] before the docs cache is populated.
    pub fn docs_index(&self) -> Result<DocsIndex> {
        self.observe(
            "docs_index",
            None,
            |i: &DocsIndex| Some(i.sections.len()),
            || self.docs.index(),
        )
    }

    #[must_use]
    pub fn health(&self) -> HealthReport {
        let started = Instant::now();
        let report = self.health_report();
        self.record_success("health", started, None);
        report
    }

    /// Health without recording a usage event (for probes).
    pub(crate) fn health_report(&self) -> HealthReport {
        let docs = self.docs.status();
        HealthReport {
            status: "ok",
            alive: true,
            ready: self.docs.is_ready(),
            mode: self.resolver.mode(),
            resources: self.catalog.len(),
            upstream_requests: self.client.requests_sent(),
            docs,
        }
    }
}

fn shape_result(
    def: &ResourceDefinition,
    spec: &QuerySpec,
    request: &QueryRequest,
    response: UpstreamResponse,
    request_id: &str,
) -> QueryResult {
    let UpstreamResponse {
        payload,
        pagination: meta,
        attempts,
        ..
    } = response;
    let mut notes = Vec::new();

    let mut data = if spec.is_paginated() {
        match payload {
            Value::Object(mut m) if m.get("data").is_some_and(Value::is_array) => {
                m.remove("data").unwrap_or(Value::Array(Vec::new()))
            }
            Value::Null => Value::Array(Vec::new()),
            other => other,
        }
    } else {
        payload
    };

    let limit = spec.limit() as usize;
    if spec.is_paginated()
        && let Value::Array(items) = &mut data
        && items.len() > limit
    {
        warn!(
            returned = items.len(),
            limit, "upstream returned more records than requested; truncating"
        );
        items.truncate(limit);
    }

    if def.path.contains("/accounts/api-tokens") {
        redact_token_fields(&mut data);
    }

    let record_count = marketplace_upstream::pagination::record_count(&data);

    if let Some(requested) = request.limit
        && requested > i64::from(spec.limit())
        && spec.is_paginated()
    {
        notes.push(format!(
            "limit {requested} exceeds the maximum page size; clamped to {}",
            spec.limit()
        ));
    }
    if spec.audit_auto_selected() {
        notes.push("'audit' was added to select because the filter or order uses audit fields".to_string());
    }

    let pagination = spec.is_paginated().then(|| {
        let returned = record_count;
        match spec.position() {
            PagePosition::Offset(requested_offset) => {
                let offset = meta.offset.unwrap_or(*requested_offset);
                let end = offset.saturating_add(returned as u64);
                let has_more = match meta.total {
                    Some(total) => returned > 0 && end < total,
                    None => returned >= limit,
                };
                PageInfo {
                    limit: spec.limit(),
                    offset: Some(offset),
                    total: meta.total,
                    returned,
                    has_more,
                    next_offset: has_more.then_some(end),
                    next_cursor: None,
                }
            }
            PagePosition::Cursor(_) => PageInfo {
                limit: spec.limit(),
                offset: None,
                total: meta.total,
                returned,
                has_more: meta.next.is_some(),
                next_offset: None,
                next_cursor: meta.next.clone(),
            },
        }
    });

    QueryResult {
        request_id: request_id.to_string(),
        resource: def.name.clone(),
        record_count,
        pagination,
        attempts,
        notes,
        data,
    }
}

fn example_queries(def: &ResourceDefinition) -> Vec<ExampleQuery> {
    let params = def.path_params();
    let mut base = json!({ "resource": def.name });
    if !params.is_empty() {
        let placeholders: serde_json::Map<String, Value> = params
            .iter()
            .map(|p| ((*p).to_string(), Value::String(format!("<{p}>"))))
            .collect();
        base["path_params"] = Value::Object(placeholders);
    }

    if def.is_single_object() {
        return vec![ExampleQuery {
            description: format!("Fetch one record of {}", def.name),
            arguments: base,
        }];
    }

    let mut out = Vec::new();
    let mut first_page = base.clone();
    first_page["limit"] = json!(def.default_page_size);
    out.push(ExampleQuery {
        description: "First page".to_string(),
        arguments: first_page,
    });
    for rql in &def.examples {
        let mut q = base.clone();
        q["rql"] = json!(rql);
        q["limit"] = json!(def.max_page_size.min(5));
        out.push(ExampleQuery {
            description: format!("Filter: {rql}"),
            arguments: q,
        });
    }
    if def.declares_field("audit") {
        let mut q = base;
        q["order"] = json!("-audit.created.at");
        q["limit"] = json!(def.max_page_size.min(20));
        out.push(ExampleQuery {
            description: "Most recently created first".to_string(),
            arguments: q,
        });
    }
    out
}

/// Replace every non-empty `token` string field with a placeholder.
fn redact_token_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                match v {
                    Value::String(s) if k == "token" && !s.is_empty() => {
                        *s = REDACTED.to_string();
                    }
                    _ => redact_token_fields(v),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_token_fields),
        _ => {}
    }
}

fn redact_secret(value: &mut Value, secret: &str) {
    match value {
        Value::String(s) if s.contains(secret) => *s = s.replace(secret, REDACTED),
        Value::Object(map) => map.values_mut().for_each(|v| redact_secret(v, secret)),
        Value::Array(items) => items.iter_mut().for_each(|v| redact_secret(v, secret)),
        _ => {}
    }
}

const AUDIT_SELECT_HINT: &str = "When filtering or sorting by audit fields (e.g. audit.created.at), \
     'audit' must be selected. Example: fields=['audit'] or fields=['+id', '+name', 'audit']";

/// Attach [`AUDIT_SELECT_HINT`] to a 400 whose `errors` report an unknown audit expression group.
fn with_audit_select_hint(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::Upstream {
            status: 400,
            body,
            hint: None,
        } if reports_unknown_audit_group(&body) => GatewayError::Upstream {
            status: 400,
            body,
            hint: Some(AUDIT_SELECT_HINT.to_string()),
        },
        other => other,
    }
}

/// `{"errors": {"<field>": ["Unknown expression group ..."]}}` mentioning audit in the field
/// name or the message.
fn reports_unknown_audit_group(body: &Value) -> bool {
    let Some(errors) = body.get("errors").and_then(Value::as_object) else {
        return false;
    };
    errors.iter().any(|(field, messages)| {
        let Some(messages) = messages.as_array() else {
            return false;
        };
        let texts: Vec<String> = messages
            .iter()
            .map(|m| m.as_str().map_or_else(|| m.to_string(), str::to_string))
            .collect();
        texts.iter().any(|t| t.contains("Unknown expression group"))
            && (field.to_lowercase().contains("audit")
                || texts.iter().any(|t| t.to_lowercase().contains("audit")))
    })
}

/// Upstreams sometimes echo the Authorization header back in error bodies.
fn redact_credential_echo(err: GatewayError, secret: &str) -> GatewayError {
    match err {
        GatewayError::Upstream {
            status,
            mut body,
            hint,
        } => {
            redact_secret(&mut body, secret);
            GatewayError::Upstream { status, body, hint }
        }
        GatewayError::Transport(message) => {
            GatewayError::Transport(message.replace(secret, REDACTED))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_fields_are_redacted_recursively() {
        let mut v = json!({
            "data": [
                {"id": "TKN-1", "token": "idt:TKN-1:secret", "nested": {"token": "x"}},
                {"id": "TKN-2", "token": ""}
            ]
        });
        redact_token_fields(&mut v);
        assert_eq!(v["data"][0]["token"], json!(REDACTED));
        assert_eq!(v["data"][0]["nested"]["token"], json!(REDACTED));
        assert_eq!(v["data"][1]["token"], json!(""));
        assert_eq!(v["data"][0]["id"], json!("TKN-1"));
    }

    #[test]
    fn credential_echo_is_removed_from_error_bodies() {
        let err = GatewayError::Upstream {
            status: 401,
            body: json!({"detail": "bad token idt:TKN-1:secret", "list": ["idt:TKN-1:secret"]}),
            hint: None,
        };
        let GatewayError::Upstream { body, .. } = redact_credential_echo(err, "idt:TKN-1:secret")
        else {
            panic!("variant changed");
        };
        assert!(!body.to_string().contains("secret"));
        assert_eq!(body["list"][0], json!(REDACTED));
    }

    #[test]
    fn unknown_audit_group_gets_a_select_hint() {
        let body = json!({"errors": {"order": ["Unknown expression group 'audit'."]}});
        let err = with_audit_select_hint(GatewayError::Upstream {
            status: 400,
            body: body.clone(),
            hint: None,
        });
        let GatewayError::Upstream { hint, .. } = err else {
            panic!("variant changed");
        };
        assert_eq!(hint.as_deref(), Some(AUDIT_SELECT_HINT));

        let by_message = json!({"errors": {"rql": ["Unknown expression group: audit.created"]}});
        assert!(reports_unknown_audit_group(&by_message));

        for unrelated in [
            json!({"errors": {"rql": ["Unknown expression group 'price'"]}}),
            json!({"errors": {"audit": ["must not be empty"]}}),
            json!({"title": "Bad Request"}),
            json!("Unknown expression group audit"),
        ] {
            assert!(!reports_unknown_audit_group(&unrelated), "{unrelated}");
        }

        let other_status = with_audit_select_hint(GatewayError::Upstream {
            status: 422,
            body,
            hint: None,
        });
        assert!(matches!(other_status, GatewayError::Upstream { hint: None, .. }));
    }

    #[test]
    fn example_queries_cover_filters_and_path_params() {
        let catalog = Catalog::builtin().expect("builtin");
        let orders = catalog.lookup("commerce.orders").expect("orders");
        let ex = example_queries(orders);
        assert!(ex.iter().any(|e| e.arguments["rql"] == json!("eq(status,Querying)")));
        assert!(ex.iter().any(|e| e.arguments["order"] == json!("-audit.created.at")));

        let by_id = catalog.lookup("commerce.orders.by_id").expect("by_id");
        let ex = example_queries(by_id);
        assert_eq!(ex.len(), 1);
        assert_eq!(ex[0].arguments["path_params"]["id"], json!("<id>"));
    }
}
