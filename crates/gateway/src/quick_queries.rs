//! Ready-made query templates for common questions.
//!
//! Each template carries a complete `marketplace_query` argument object. Templates are checked
//! against the catalog when the gateway starts, so a template for a resource the running
//! catalog does not have is dropped instead of being offered.

use crate::catalog::Catalog;
use crate::translator::{QueryRequest, QuerySpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

const BUILTIN_TEMPLATES: &str = include_str!("../catalog/quick_queries.yaml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryTemplate {
    pub name: String,
    pub description: String,
    pub use_case: String,
    pub query: QueryRequest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_statuses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateCategory {
    pub name: String,
    pub description: String,
    pub templates: Vec<QueryTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryTips {
    #[serde(default)]
    pub how_to_use: Vec<String>,
    #[serde(default)]
    pub rql_basics: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickQueries {
    pub categories: Vec<TemplateCategory>,
    #[serde(default)]
    pub tips: QueryTips,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("parse query templates: {0}")]
    Parse(String),
}

impl QuickQueries {
    /// The template set shipped with the binary.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] if the embedded document is malformed.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_yaml_str(BUILTIN_TEMPLATES)
    }

    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for malformed documents.
    pub fn from_yaml_str(raw: &str) -> Result<Self, TemplateError> {
        serde_yaml::from_str(raw).map_err(|e| TemplateError::Parse(e.to_string()))
    }

    /// Keep only templates whose query validates against `catalog`. Categories left empty are
    /// dropped as well.
    #[must_use]
    pub fn retain_valid(mut self, catalog: &Catalog) -> Self {
        for category in &mut self.categories {
            category.templates.retain(|t| {
                let checked = catalog
                    .lookup(&t.query.resource)
                    .map_err(|e| e.to_string())
                    .and_then(|def| QuerySpec::build(def, &t.query).map_err(|e| e.to_string()));
                if let Err(reason) = &checked {
                    warn!(template = %t.name, %reason, "dropping query template");
                }
                checked.is_ok()
            });
        }
        self.categories.retain(|c| !c.templates.is_empty());
        self
    }

    /// Number of templates across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.templates.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Templates of one category (case-insensitive); all categories when `category` is `None`.
    #[must_use]
    pub fn filtered(&self, category: Option<&str>) -> Self {
        let Some(wanted) = category.map(str::trim) else {
            return self.clone();
        };
        Self {
            categories: self
                .categories
                .iter()
                .filter(|c| c.name.eq_ignore_ascii_case(wanted))
                .cloned()
                .collect(),
            tips: self.tips.clone(),
        }
    }

    #[must_use]
    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }
}
