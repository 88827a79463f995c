//! Resource catalog: the immutable table of queryable Marketplace resources.
//!
//! Loaded once at startup (built-in table or a YAML/JSON file), then shared read-only.
//! Lookups are exact: no prefix matching, no case folding.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

const BUILTIN_RESOURCES: &str = include_str!("../catalog/resources.yaml");

static RESOURCE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]*(\.[a-z][a-z0-9_-]*)*$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationStyle {
    #[default]
    Offset,
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceDefinition {
    pub name: String,
    /// Absolute endpoint template, e.g. `/public/v1/commerce/orders/{id}`.
    pub path: String,
    #[serde(default)]
    pub summary: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub filter_fields: Vec<String>,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub pagination: PaginationStyle,
    /// Example RQL filters, surfaced by `resource_info`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    /// Audit event names recorded under `audit.<event>.at` / `audit.<event>.by`. Resources
    /// that declare `audit` without listing events get [`DEFAULT_AUDIT_EVENTS`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit_events: Vec<String>,
}

/// Events every audited Marketplace object carries.
pub const DEFAULT_AUDIT_EVENTS: [&str; 2] = ["created", "updated"];

fn default_page_size() -> u32 {
    10
}

fn default_max_page_size() -> u32 {
    100
}

fn default_id_field() -> String {
    "id".to_string()
}

impl ResourceDefinition {
    /// First dotted segment of the name (`commerce` for `commerce.orders`).
    #[must_use]
    pub fn category(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Names of `{placeholder}` segments in the endpoint template, in order.
    #[must_use]
    pub fn path_params(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .collect()
    }

    #[must_use]
    pub fn declares_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// A dotted path is filterable if it, or one of its dotted prefixes, is a filter field.
    #[must_use]
    pub fn is_filterable(&self, path: &str) -> bool {
        dotted_prefixes(path).any(|p| self.filter_fields.iter().any(|f| f == p))
    }

    /// Audit event names for this resource; empty when it has no `audit` field.
    #[must_use]
    pub fn audit_events(&self) -> Vec<String> {
        if !self.declares_field("audit") {
            return Vec::new();
        }
        if self.audit_events.is_empty() {
            return DEFAULT_AUDIT_EVENTS.iter().map(|e| (*e).to_string()).collect();
        }
        self.audit_events.clone()
    }

    /// Whether the endpoint returns a single object rather than a page of records.
    #[must_use]
    pub fn is_single_object(&self) -> bool {
        self.path.ends_with('}')
    }

    #[must_use]
    pub fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            name: self.name.clone(),
            category: self.category().to_string(),
            summary: self.summary.clone(),
            path: self.path.clone(),
            pagination: self.pagination,
            filter_fields: self.filter_fields.clone(),
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

/// `a.b.c` -> `a.b.c`, `a.b`, `a`.
fn dotted_prefixes(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(path.rmatch_indices('.').map(move |(i, _)| &path[..i]))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub name: String,
    pub category: String,
    pub summary: String,
    pub path: String,
    pub pagination: PaginationStyle,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter_fields: Vec<String>,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub siblings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown resource '{0}'")]
    NotFound(String),

    #[error("read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse catalog: {0}")]
    Parse(String),

    #[error("invalid catalog: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    resources: Vec<ResourceDefinition>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    resources: Vec<ResourceDefinition>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// The built-in resource table shipped with the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded table fails validation.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_RESOURCES)
    }

    /// Parse a catalog document (`resources: [...]`). JSON is accepted as a YAML subset.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] for malformed documents and [`CatalogError::Invalid`]
    /// when the table violates its invariants.
    pub fn from_yaml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_yaml::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_definitions(file.resources)
    }

    /// Load a catalog file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Build a catalog, reporting every invariant violation at once.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] listing all problems found.
    pub fn from_definitions(resources: Vec<ResourceDefinition>) -> Result<Self, CatalogError> {
        let mut problems = Vec::new();
        let mut by_name = HashMap::with_capacity(resources.len());

        if resources.is_empty() {
            problems.push("catalog declares no resources".to_string());
        }

        for (idx, r) in resources.iter().enumerate() {
            if !RESOURCE_NAME.is_match(&r.name) {
                problems.push(format!("resource '{}': invalid name", r.name));
            }
            if by_name.insert(r.name.clone(), idx).is_some() {
                problems.push(format!("resource '{}': duplicate name", r.name));
            }
            if !r.path.starts_with('/') {
                problems.push(format!(
                    "resource '{}': path '{}' must be absolute",
                    r.name, r.path
                ));
            }
            if r.default_page_size == 0 || r.default_page_size > r.max_page_size {
                problems.push(format!(
                    "resource '{}': page sizes must satisfy 1 <= default ({}) <= max ({})",
                    r.name, r.default_page_size, r.max_page_size
                ));
            }
            if r.fields.is_empty() {
                problems.push(format!("resource '{}': no fields declared", r.name));
            }
            if !r.audit_events.is_empty() && !r.declares_field("audit") {
                problems.push(format!(
                    "resource '{}': auditEvents listed but 'audit' is not a declared field",
                    r.name
                ));
            }
            for e in &r.audit_events {
                if e.is_empty() || !e.chars().all(|c| c.is_ascii_alphanumeric()) {
                    problems.push(format!("resource '{}': invalid audit event '{e}'", r.name));
                }
            }
            for f in &r.filter_fields {
                let root = f.split('.').next().unwrap_or(f);
                if !r.declares_field(root) {
                    problems.push(format!(
                        "resource '{}': filter field '{f}' is not a declared field",
                        r.name
                    ));
                }
            }
        }

        if !problems.is_empty() {
            return Err(CatalogError::Invalid(problems));
        }
        Ok(Self { resources, by_name })
    }

    /// Exact-name lookup.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for names not in the table.
    pub fn lookup(&self, name: &str) -> Result<&ResourceDefinition, CatalogError> {
        self.by_name
            .get(name)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.iter()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<ResourceSummary> {
        self.resources
            .iter()
            .map(ResourceDefinition::summary)
            .collect()
    }

    /// Sorted, de-duplicated categories.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        self.resources
            .iter()
            .map(|r| r.category().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Names similar to `unknown`, best match first.
    #[must_use]
    pub fn suggest(&self, unknown: &str) -> Vec<String> {
        let names: Vec<&str> = self.resources.iter().map(|r| r.name.as_str()).collect();
        let mut out = find_similar_strings(unknown, &names);
        out.truncate(5);
        out
    }

    /// Resources related to `name` by dotted name or by path nesting.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if `name` is unknown.
    pub fn related(&self, name: &str) -> Result<RelatedResources, CatalogError> {
        let this = self.lookup(name)?;
        let this_prefix = format!("{}/", this.path);

        let is_child = |r: &ResourceDefinition| {
            r.name != this.name
                && (r.name.starts_with(&format!("{}.", this.name))
                    || r.path.starts_with(&this_prefix))
        };
        let is_ancestor = |r: &ResourceDefinition| {
            r.name != this.name
                && (this.name.starts_with(&format!("{}.", r.name))
                    || this.path.starts_with(&format!("{}/", r.path)))
        };

        // Closest ancestor = the one with the longest path.
        let parent = self
            .resources
            .iter()
            .filter(|r| is_ancestor(r))
            .max_by_key(|r| r.path.len())
            .map(|r| r.name.clone());

        let children = self
            .resources
            .iter()
            .filter(|r| is_child(r))
            .map(|r| r.name.clone())
            .collect();

        let siblings = self
            .resources
            .iter()
            .filter(|r| {
                r.category() == this.category()
                    && r.name != this.name
                    && !is_child(r)
                    && !is_ancestor(r)
                    && !r.is_single_object()
            })
            .map(|r| r.name.clone())
            .collect();

        Ok(RelatedResources {
            parent,
            children,
            siblings,
        })
    }
}

/// Candidates from `known` whose Jaro similarity to `unknown` exceeds 0.7, best first.
pub(crate) fn find_similar_strings(unknown: &str, known: &[&str]) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = Vec::new();
    for k in known {
        let score = strsim::jaro(unknown, k);
        if score > 0.7 {
            candidates.push((score, (*k).to_string()));
        }
    }
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> Catalog {
        Catalog::builtin().expect("builtin catalog is valid")
    }

    #[test]
    fn builtin_catalog_is_valid_and_unique() {
        let catalog = builtin();
        assert!(catalog.len() > 20);
        let names: BTreeSet<_> = catalog.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names.len(), catalog.len());
        assert!(
            catalog
                .iter()
                .any(|r| r.pagination == PaginationStyle::Cursor)
        );
        assert_eq!(
            catalog.categories(),
            vec!["accounts", "audit", "billing", "catalog", "commerce"]
        );
    }

    #[test]
    fn lookup_is_exact() {
        let catalog = builtin();
        assert!(catalog.lookup("catalog.products").is_ok());
        assert!(matches!(
            catalog.lookup("Catalog.Products"),
            Err(CatalogError::NotFound(_))
        ));
        assert!(catalog.lookup("catalog.prod").is_err());
        assert!(catalog.lookup("").is_err());
    }

    #[test]
    fn suggestions_rank_close_names_first() {
        let catalog = builtin();
        let s = catalog.suggest("catalog.prodcts");
        assert_eq!(s.first().map(String::as_str), Some("catalog.products"));
    }

    #[test]
    fn filterable_accepts_dotted_prefixes() {
        let catalog = builtin();
        let orders = catalog.lookup("commerce.orders").expect("orders");
        assert!(orders.is_filterable("status"));
        assert!(orders.is_filterable("product.id"));
        assert!(orders.is_filterable("audit.created.at"));
        assert!(orders.is_filterable("product.name.first"));
        assert!(!orders.is_filterable("client.name.first"));
        assert!(!orders.is_filterable("nonsense"));
    }

    #[test]
    fn audit_events_default_unless_listed() {
        let catalog = builtin();
        let products = catalog.lookup("catalog.products").expect("products");
        assert_eq!(products.audit_events(), ["created", "updated"]);

        let orders = catalog.lookup("commerce.orders").expect("orders");
        let events = orders.audit_events();
        assert!(events.iter().any(|e| e == "completed"));
        assert!(events.iter().any(|e| e == "failed"));

        let records = catalog.lookup("audit.records").expect("records");
        assert!(records.audit_events().is_empty());
    }

    #[test]
    fn audit_events_require_an_audit_field() {
        let err = Catalog::from_yaml_str(
            r"resources:
  - name: catalog.products
    path: /public/v1/catalog/products
    fields: [id, name]
    auditEvents: [created, bad.event]
",
        )
        .unwrap_err();
        let CatalogError::Invalid(problems) = err else {
            panic!("expected invalid catalog, got {err:?}");
        };
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(problems[0].contains("'audit' is not a declared field"));
        assert!(problems[1].contains("invalid audit event 'bad.event'"));
    }

    #[test]
    fn path_params_come_from_placeholders() {
        let catalog = builtin();
        let r = catalog.lookup("catalog.price-lists.items").expect("items");
        assert_eq!(r.path_params(), vec!["id"]);
        assert!(catalog.lookup("catalog.products").expect("p").path_params().is_empty());
    }

    #[test]
    fn related_finds_parent_children_and_siblings() {
        let catalog = builtin();
        let rel = catalog.related("catalog.products").expect("related");
        assert_eq!(rel.parent, None);
        assert_eq!(rel.children, vec!["catalog.products.by_id"]);
        assert!(rel.siblings.contains(&"catalog.items".to_string()));
        assert!(!rel.siblings.contains(&"catalog.items.by_id".to_string()));

        let rel = catalog.related("catalog.price-lists.items").expect("related");
        assert_eq!(rel.parent.as_deref(), Some("catalog.price-lists"));
    }

    #[test]
    fn invalid_tables_report_every_problem() {
        let raw = r"
resources:
  - name: a.one
    path: relative/path
    fields: [id]
    filterFields: [status]
  - name: a.one
    path: /x
    fields: [id]
    defaultPageSize: 50
    maxPageSize: 10
";
        let err = Catalog::from_yaml_str(raw).unwrap_err();
        let CatalogError::Invalid(problems) = err else {
            panic!("expected Invalid, got {err}");
        };
        assert_eq!(problems.len(), 4, "{problems:?}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let raw = "resources:\n  - name: a.b\n    path: /a\n    fields: [id]\n    colour: red\n";
        assert!(matches!(
            Catalog::from_yaml_str(raw),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_json_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"resources":[{"name":"x.things","path":"/things","fields":["id","name"],"filterFields":["name"]}]}"#,
        )
        .expect("write");
        let catalog = Catalog::load(&path).expect("load");
        assert_eq!(catalog.len(), 1);
        let r = catalog.lookup("x.things").expect("x.things");
        assert_eq!(r.default_page_size, 10);
        assert_eq!(r.pagination, PaginationStyle::Offset);
    }
}
