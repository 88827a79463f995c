//! Pagination metadata as reported by the Marketplace API.
//!
//! Collection responses look like `{"$meta": {"pagination": {...}}, "data": [...]}`. Some
//! endpoints put `pagination` at the root instead; both are accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Opaque continuation token for cursor-paginated collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl PaginationMeta {
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        let Some(p) = payload
            .get("$meta")
            .and_then(|m| m.get("pagination"))
            .or_else(|| payload.get("pagination"))
        else {
            return Self::default();
        };

        Self {
            total: p.get("total").and_then(Value::as_u64),
            offset: p.get("offset").and_then(Value::as_u64),
            limit: p.get("limit").and_then(Value::as_u64),
            next: p
                .get("next")
                .or_else(|| p.get("nextCursor"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Number of records carried by a payload.
///
/// Collections count their `data` items (or the items of a bare array); a single object
/// counts as one record.
#[must_use]
pub fn record_count(payload: &Value) -> usize {
    match payload {
        Value::Array(items) => items.len(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Null) => 0,
            _ => 1,
        },
        Value::Null => 0,
        _ => 1,
    }
}
