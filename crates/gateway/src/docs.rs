//! Process-wide documentation cache.
//!
//! Populated once at startup from a [`DocSource`]; afterwards every read is a lock-protected
//! `Arc` clone of an immutable snapshot. Reads never perform I/O and never observe a partially
//! loaded set: until population completes they fail with [`GatewayError::NotReady`].

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};
use url::Url;

const EMBEDDED_REFERENCE: &str = include_str!("../docs/reference.yaml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DocEntry {
    /// First segment of the id (`rql` for `rql/basics`).
    #[must_use]
    pub fn section(&self) -> &str {
        self.id.split('/').next().unwrap_or(&self.id)
    }

    fn matches(&self, filter: &DocsFilter) -> bool {
        if let Some(section) = filter.section.as_deref()
            && !self.section().eq_ignore_ascii_case(section.trim())
        {
            return false;
        }
        if let Some(tag) = filter.tag.as_deref()
            && !self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim()))
        {
            return false;
        }
        if let Some(search) = filter.search.as_deref() {
            let needle = search.trim().to_lowercase();
            if needle.is_empty() {
                return true;
            }
            return self.title.to_lowercase().contains(&needle)
                || self.id.to_lowercase().contains(&needle)
                || self.tags.iter().any(|t| t.to_lowercase().contains(&needle));
        }
        true
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocFile {
    pages: Vec<DocEntry>,
}

fn parse_doc_file(raw: &str) -> std::result::Result<Vec<DocEntry>, DocsError> {
    serde_yaml::from_str::<DocFile>(raw)
        .map(|f| f.pages)
        .map_err(|e| DocsError::Parse(e.to_string()))
}

#[derive(Debug, Error)]
pub enum DocsError {
    #[error("read docs {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse docs: {0}")]
    Parse(String),

    #[error("duplicate doc id '{0}'")]
    DuplicateId(String),

    #[error("invalid doc entry: {0}")]
    Invalid(String),

    #[error("docs population already in progress")]
    InProgress,
}

/// Where documentation entries come from.
#[async_trait]
pub trait DocSource: Send + Sync {
    fn describe(&self) -> String;

    async fn load(&self) -> std::result::Result<Vec<DocEntry>, DocsError>;
}

/// The reference set compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedDocs;

#[async_trait]
impl DocSource for EmbeddedDocs {
    fn describe(&self) -> String {
        "embedded".to_string()
    }

    async fn load(&self) -> std::result::Result<Vec<DocEntry>, DocsError> {
        parse_doc_file(EMBEDDED_REFERENCE)
    }
}

/// A YAML (or JSON) file with a top-level `pages` list.
#[derive(Debug, Clone)]
pub struct FileDocs {
    pub path: PathBuf,
}

impl FileDocs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocSource for FileDocs {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn load(&self) -> std::result::Result<Vec<DocEntry>, DocsError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DocsError::Io {
                path: self.path.clone(),
                source,
            })?;
        parse_doc_file(&raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocsFilter {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocSummary {
    pub id: String,
    pub title: String,
    pub section: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocListing {
    /// Matches before `limit` was applied.
    pub total: usize,
    pub items: Vec<DocSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocPage {
    pub id: String,
    pub title: String,
    pub section: String,
    pub tags: Vec<String>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionIndex {
    pub section: String,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocsIndex {
    pub total: usize,
    pub sections: Vec<SectionIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocsState {
    Uninitialized,
    Populating,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsStatus {
    pub state: DocsState,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<String>,
}

#[derive(Debug)]
struct DocsSnapshot {
    entries: Vec<DocEntry>,
    by_id: HashMap<String, usize>,
    source: String,
    loaded_at: Option<String>,
}

#[derive(Debug, Default)]
enum CacheState {
    #[default]
    Uninitialized,
    Populating,
    Ready(Arc<DocsSnapshot>),
}

/// Resets a `Populating` state if the populate future is dropped before finishing.
struct PopulateGuard<'a> {
    state: &'a RwLock<CacheState>,
    armed: bool,
}

impl Drop for PopulateGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.write();
        if matches!(*state, CacheState::Populating) {
            warn!("docs population abandoned; cache reset to uninitialized");
            *state = CacheState::Uninitialized;
        }
    }
}

#[derive(Debug, Default)]
pub struct DocsCache {
    state: RwLock<CacheState>,
    public_base_url: Option<Url>,
}

impl DocsCache {
    /// `public_base_url` is used to derive browser links (`<base>/<id>`).
    #[must_use]
    pub fn new(public_base_url: Option<Url>) -> Self {
        let public_base_url = public_base_url.map(|mut u| {
            if !u.path().ends_with('/') {
                let p = format!("{}/", u.path());
                u.set_path(&p);
            }
            u
        });
        Self {
            state: RwLock::new(CacheState::Uninitialized),
            public_base_url,
        }
    }

    /// Load entries from `source` and publish them. Runs at most once successfully; calling it
    /// again on a ready cache is a no-op returning the current entry count.
    ///
    /// # Errors
    ///
    /// Returns an error if another population is in progress, or if the source fails or yields
    /// invalid/duplicate entries. On error the cache returns to uninitialized.
    pub async fn populate(&self, source: &dyn DocSource) -> std::result::Result<usize, DocsError> {
        {
            let mut state = self.state.write();
            match &*state {
                CacheState::Ready(snapshot) => {
                    debug!("docs cache already populated");
                    return Ok(snapshot.entries.len());
                }
                CacheState::Populating => return Err(DocsError::InProgress),
                CacheState::Uninitialized => *state = CacheState::Populating,
            }
        }
        let mut guard = PopulateGuard {
            state: &self.state,
            armed: true,
        };

        let described = source.describe();
        let snapshot = build_snapshot(source.load().await?, described.clone())?;
        let count = snapshot.entries.len();

        *self.state.write() = CacheState::Ready(Arc::new(snapshot));
        guard.armed = false;
        info!(source = %described, entries = count, "docs cache ready");
        Ok(count)
    }

    fn snapshot(&self) -> Result<Arc<DocsSnapshot>> {
        match &*self.state.read() {
            CacheState::Ready(s) => Ok(Arc::clone(s)),
            CacheState::Uninitialized | CacheState::Populating => Err(GatewayError::NotReady),
        }
    }

    fn browser_url(&self, id: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .and_then(|base| base.join(id).ok())
            .map(String::from)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), CacheState::Ready(_))
    }

    /// # Errors
    ///
    /// [`GatewayError::NotReady`] before population completes.
    pub fn list(&self, filter: &DocsFilter) -> Result<DocListing> {
        let snapshot = self.snapshot()?;
        let matching: Vec<&DocEntry> = snapshot
            .entries
            .iter()
            .filter(|e| e.matches(filter))
            .collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|e| DocSummary {
                id: e.id.clone(),
                title: e.title.clone(),
                section: e.section().to_string(),
                tags: e.tags.clone(),
                browser_url: self.browser_url(&e.id),
            })
            .collect();
        Ok(DocListing { total, items })
    }

    /// # Errors
    ///
    /// [`GatewayError::NotReady`] before population completes, [`GatewayError::NotFound`] for
    /// unknown ids.
    pub fn get(&self, id: &str) -> Result<DocPage> {
        let snapshot = self.snapshot()?;
        let key = id.trim().trim_matches('/');
        let entry = snapshot
            .by_id
            .get(key)
            .map(|&i| &snapshot.entries[i])
            .ok_or_else(|| GatewayError::NotFound(format!("doc '{key}'")))?;
        Ok(DocPage {
            id: entry.id.clone(),
            title: entry.title.clone(),
            section: entry.section().to_string(),
            tags: entry.tags.clone(),
            body: entry.body.clone(),
            browser_url: self.browser_url(&entry.id),
        })
    }

    /// # Errors
    ///
    /// [`GatewayError::NotReady`] before population completes.
    pub fn index(&self) -> Result<DocsIndex> {
        let snapshot = self.snapshot()?;
        let mut sections: BTreeMap<&str, usize> = BTreeMap::new();
        for e in &snapshot.entries {
            *sections.entry(e.section()).or_default() += 1;
        }
        Ok(DocsIndex {
            total: snapshot.entries.len(),
            sections: sections
                .into_iter()
                .map(|(section, pages)| SectionIndex {
                    section: section.to_string(),
                    pages,
                })
                .collect(),
        })
    }

    #[must_use]
    pub fn status(&self) -> DocsStatus {
        match &*self.state.read() {
            CacheState::Uninitialized => DocsStatus {
                state: DocsState::Uninitialized,
                entries: 0,
                source: None,
                loaded_at: None,
            },
            CacheState::Populating => DocsStatus {
                state: DocsState::Populating,
                entries: 0,
                source: None,
                loaded_at: None,
            },
            CacheState::Ready(s) => DocsStatus {
                state: DocsState::Ready,
                entries: s.entries.len(),
                source: Some(s.source.clone()),
                loaded_at: s.loaded_at.clone(),
            },
        }
    }
}

fn build_snapshot(
    entries: Vec<DocEntry>,
    source: String,
) -> std::result::Result<DocsSnapshot, DocsError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(entries.len());
    for mut e in entries {
        e.id = e.id.trim().trim_matches('/').to_string();
        if e.id.is_empty() {
            return Err(DocsError::Invalid("empty id".to_string()));
        }
        if e.title.trim().is_empty() {
            return Err(DocsError::Invalid(format!("'{}' has no title", e.id)));
        }
        if !seen.insert(e.id.clone()) {
            return Err(DocsError::DuplicateId(e.id));
        }
        out.push(e);
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    let by_id = out
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();
    Ok(DocsSnapshot {
        entries: out,
        by_id,
        source,
        loaded_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
    })
}
