//! Query translation: abstract `resource + filter + pagination` requests into upstream calls.
//!
//! Translation happens in two steps so that everything that can be validated without a
//! tenant is validated first:
//! 1. [`QuerySpec::build`] checks a [`QueryRequest`] against its [`ResourceDefinition`].
//! 2. [`QuerySpec::to_descriptor`] binds the spec to a tenant's endpoint and credential.
//!
//! The RQL filter is never parsed or evaluated here. Only the field names it references are
//! extracted and checked; the string itself is forwarded byte-for-byte.

use crate::catalog::{PaginationStyle, ResourceDefinition};
use crate::error::{GatewayError, Result};
use crate::tenant::TenantContext;
use marketplace_upstream::UpstreamRequestDescriptor;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Limits above `max_page_size` but within this factor of it are clamped instead of rejected.
pub const LIMIT_TOLERANCE_FACTOR: i64 = 10;

static RQL_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_.])(?:eq|ne|gt|ge|lt|le|like|ilike|in|out)\(\s*([^,()\s]+)\s*,")
        .expect("valid regex")
});

/// Caller input for a data query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_params: Option<BTreeMap<String, String>>,
}

impl QueryRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rql(mut self, rql: impl Into<String>) -> Self {
        self.rql = Some(rql.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn path_param(mut self, name: &str, value: &str) -> Self {
        self.path_params
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagePosition {
    Offset(u64),
    /// `None` requests the first page.
    Cursor(Option<String>),
}

/// A validated query for one resource. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    resource: String,
    filter: Option<String>,
    limit: u32,
    position: PagePosition,
    select: Vec<String>,
    order: Vec<String>,
    path_segments: Vec<String>,
    paginated: bool,
    audit_auto_selected: bool,
}

impl QuerySpec {
    /// Validate `request` against `def`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] for any invalid limit, page position, filter field,
    /// selected/ordered field or path parameter.
    pub fn build(def: &ResourceDefinition, request: &QueryRequest) -> Result<Self> {
        let limit = resolve_limit(def, request.limit)?;
        let position = resolve_position(def, request.offset, request.cursor.as_deref())?;
        let filter = resolve_filter(def, request.rql.as_deref())?;

        let mut select = parse_field_list(
            def,
            "fields",
            request.fields.iter().flatten().flat_map(|f| f.split(',')),
        )?;
        let order = parse_field_list(def, "order", request.order.iter().flat_map(|o| o.split(',')))?;

        let filter_uses_audit = filter
            .as_deref()
            .is_some_and(|f| referenced_fields(f).iter().any(|p| root_of(p) == "audit"));
        let order_uses_audit = order.iter().any(|o| root_of(o) == "audit");
        let audit_selected = select.iter().any(|s| root_of(s) == "audit");
        let audit_auto_selected = (filter_uses_audit || order_uses_audit)
            && !audit_selected
            && def.declares_field("audit");
        if audit_auto_selected {
            debug!(resource = %def.name, "adding 'audit' to select for audit filter/order");
            select.push("audit".to_string());
        }

        let path_segments = resolve_path(def, request.path_params.as_ref())?;

        Ok(Self {
            resource: def.name.clone(),
            filter,
            limit,
            position,
            select,
            order,
            path_segments,
            paginated: !def.is_single_object(),
            audit_auto_selected,
        })
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn position(&self) -> &PagePosition {
        &self.position
    }

    #[must_use]
    pub fn select(&self) -> &[String] {
        &self.select
    }

    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn is_paginated(&self) -> bool {
        self.paginated
    }

    #[must_use]
    pub fn audit_auto_selected(&self) -> bool {
        self.audit_auto_selected
    }

    /// The same query with the automatically appended `audit` removed from the selection.
    /// Returns `None` when nothing was appended.
    #[must_use]
    pub fn without_auto_audit(&self) -> Option<Self> {
        if !self.audit_auto_selected {
            return None;
        }
        let mut select = self.select.clone();
        if select.last().is_some_and(|s| s == "audit") {
            select.pop();
        }
        Some(Self {
            select,
            audit_auto_selected: false,
            ..self.clone()
        })
    }

    /// Resolved path, e.g. `/public/v1/commerce/orders/ORD-1`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.path_segments.join("/"))
    }

    /// Upstream query string: the raw filter first, then pagination, selection and order.
    #[must_use]
    pub fn query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(f) = &self.filter {
            parts.push(f.clone());
        }
        if self.paginated {
            parts.push(format!("limit={}", self.limit));
            match &self.position {
                PagePosition::Offset(o) => parts.push(format!("offset={o}")),
                PagePosition::Cursor(Some(c)) => parts.push(format!("cursor={}", encode(c))),
                PagePosition::Cursor(None) => {}
            }
        }
        if !self.select.is_empty() {
            parts.push(format!("select={}", encode_list(&self.select)));
        }
        if !self.order.is_empty() {
            parts.push(format!("order={}", encode_list(&self.order)));
        }
        parts.join("&")
    }

    /// Bind this query to a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] if the endpoint cannot carry a path, or
    /// [`GatewayError::Auth`] if the credential cannot be encoded as a header.
    pub fn to_descriptor(
        &self,
        tenant: &TenantContext,
        timeout: Duration,
    ) -> Result<UpstreamRequestDescriptor> {
        let mut url: Url = tenant.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| GatewayError::validation("upstream endpoint cannot carry a path"))?;
            segments.clear();
            for s in &self.path_segments {
                segments.push(s);
            }
        }
        let query = self.query_string();
        url.set_query((!query.is_empty()).then_some(query.as_str()));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, tenant.credential.authorization_header()?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(UpstreamRequestDescriptor {
            method: reqwest::Method::GET,
            url,
            headers,
            timeout,
        })
    }
}

/// Validate and bind in one step.
///
/// # Errors
///
/// See [`QuerySpec::build`] and [`QuerySpec::to_descriptor`].
pub fn translate(
    def: &ResourceDefinition,
    request: &QueryRequest,
    tenant: &TenantContext,
    timeout: Duration,
) -> Result<UpstreamRequestDescriptor> {
    QuerySpec::build(def, request)?.to_descriptor(tenant, timeout)
}

/// Field paths used as the first argument of RQL comparison operators, in order of
/// appearance, without duplicates.
#[must_use]
pub fn referenced_fields(rql: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for cap in RQL_FIELD.captures_iter(rql) {
        if let Some(m) = cap.get(1)
            && !out.iter().any(|f| f == m.as_str())
        {
            out.push(m.as_str().to_string());
        }
    }
    out
}

fn root_of(field: &str) -> &str {
    let bare = field.trim_start_matches(['+', '-']);
    bare.split('.').next().unwrap_or(bare)
}

fn resolve_limit(def: &ResourceDefinition, requested: Option<i64>) -> Result<u32> {
    let max = i64::from(def.max_page_size);
    let Some(limit) = requested else {
        return Ok(def.default_page_size);
    };
    let out_of_range = || {
        GatewayError::validation_with(
            format!(
                "limit must be between 1 and {max} for '{}' (got {limit})",
                def.name
            ),
            json!({ "parameter": "limit", "value": limit, "min": 1, "max": max }),
        )
    };
    if limit < 1 || limit > max.saturating_mul(LIMIT_TOLERANCE_FACTOR) {
        return Err(out_of_range());
    }
    if limit > max {
        debug!(resource = %def.name, requested = limit, max, "clamping limit to max page size");
        return Ok(def.max_page_size);
    }
    u32::try_from(limit).map_err(|_| out_of_range())
}

fn resolve_position(
    def: &ResourceDefinition,
    offset: Option<i64>,
    cursor: Option<&str>,
) -> Result<PagePosition> {
    match def.pagination {
        PaginationStyle::Offset => {
            if cursor.is_some() {
                return Err(GatewayError::validation_with(
                    format!("'{}' uses offset pagination; 'cursor' is not supported", def.name),
                    json!({ "parameter": "cursor", "pagination": "offset" }),
                ));
            }
            let offset = offset.unwrap_or(0);
            u64::try_from(offset)
                .map(PagePosition::Offset)
                .map_err(|_| {
                    GatewayError::validation_with(
                        format!("offset must be a non-negative integer (got {offset})"),
                        json!({ "parameter": "offset", "value": offset }),
                    )
                })
        }
        PaginationStyle::Cursor => {
            if offset.is_some() {
                return Err(GatewayError::validation_with(
                    format!("'{}' uses cursor pagination; use 'cursor' instead of 'offset'", def.name),
                    json!({ "parameter": "offset", "pagination": "cursor" }),
                ));
            }
            match cursor.map(str::trim) {
                Some("") => Err(GatewayError::validation_with(
                    "cursor must not be empty",
                    json!({ "parameter": "cursor" }),
                )),
                Some(c) => Ok(PagePosition::Cursor(Some(c.to_string()))),
                None => Ok(PagePosition::Cursor(None)),
            }
        }
    }
}

fn resolve_filter(def: &ResourceDefinition, rql: Option<&str>) -> Result<Option<String>> {
    let Some(rql) = rql.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if def.filter_fields.is_empty() {
        return Err(GatewayError::validation_with(
            format!("'{}' does not support filtering", def.name),
            json!({ "parameter": "rql" }),
        ));
    }

    let unknown: Vec<String> = referenced_fields(rql)
        .into_iter()
        .filter(|f| !def.is_filterable(f))
        .collect();
    if !unknown.is_empty() {
        let known: Vec<&str> = def.filter_fields.iter().map(String::as_str).collect();
        let suggestions: Vec<String> = unknown
            .iter()
            .flat_map(|u| crate::catalog::find_similar_strings(u, &known))
            .collect();
        return Err(GatewayError::validation_with(
            format!(
                "unknown filter field(s) for '{}': {}",
                def.name,
                unknown.join(", ")
            ),
            json!({
                "parameter": "rql",
                "unknownFields": unknown,
                "suggestions": suggestions,
                "filterableFields": def.filter_fields,
            }),
        ));
    }
    Ok(Some(rql.to_string()))
}

fn parse_field_list<'a>(
    def: &ResourceDefinition,
    parameter: &str,
    items: impl Iterator<Item = &'a str>,
) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();
    for item in items.map(str::trim).filter(|s| !s.is_empty()) {
        if def.declares_field(root_of(item)) {
            if !out.iter().any(|o| o == item) {
                out.push(item.to_string());
            }
        } else {
            unknown.push(item.to_string());
        }
    }
    if unknown.is_empty() {
        return Ok(out);
    }
    Err(GatewayError::validation_with(
        format!(
            "unknown field(s) in '{parameter}' for '{}': {}",
            def.name,
            unknown.join(", ")
        ),
        json!({
            "parameter": parameter,
            "unknownFields": unknown,
            "validFields": def.fields,
        }),
    ))
}

/// Form-encode one value; a leading `+` must reach the upstream as `%2B`, not a space.
fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Encode each item, keeping the separating commas literal.
fn encode_list(items: &[String]) -> String {
    items.iter().map(|i| encode(i)).collect::<Vec<_>>().join(",")
}

fn resolve_path(
    def: &ResourceDefinition,
    params: Option<&BTreeMap<String, String>>,
) -> Result<Vec<String>> {
    let required = def.path_params();
    let empty = BTreeMap::new();
    let params = params.unwrap_or(&empty);

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|p| params.get(*p).is_none_or(|v| v.trim().is_empty()))
        .collect();
    if !missing.is_empty() {
        return Err(GatewayError::validation_with(
            format!(
                "missing path parameter(s) for '{}': {}",
                def.name,
                missing.join(", ")
            ),
            json!({ "parameter": "path_params", "missing": missing, "template": def.path }),
        ));
    }
    let unknown: Vec<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|k| !required.contains(k))
        .collect();
    if !unknown.is_empty() {
        return Err(GatewayError::validation_with(
            format!(
                "unknown path parameter(s) for '{}': {}",
                def.name,
                unknown.join(", ")
            ),
            json!({ "parameter": "path_params", "unknown": unknown, "template": def.path }),
        ));
    }

    // The url crate folds dot segments, which would turn a by-id path into its collection.
    let dotted: Vec<&str> = required
        .iter()
        .copied()
        .filter(|p| params.get(*p).is_some_and(|v| matches!(v.trim(), "." | "..")))
        .collect();
    if !dotted.is_empty() {
        return Err(GatewayError::validation_with(
            format!(
                "invalid path parameter(s) for '{}': {} (dot segments are not allowed)",
                def.name,
                dotted.join(", ")
            ),
            json!({ "parameter": "path_params", "invalid": dotted, "template": def.path }),
        ));
    }

    Ok(def
        .path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            seg.strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .and_then(|name| params.get(name))
                .map_or_else(|| seg.to_string(), |v| v.trim().to_string())
        })
        .collect())
}
