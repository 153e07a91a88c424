//! The build metadata aggregate.
//!
//! Computed once per run during the Indexing phase, before any page renders,
//! and read-only afterwards. Every page render sees the same complete
//! aggregate, so a page can list recent posts or build a tag cloud without
//! depending on processing order.
//!
//! ## Shape (as seen by templates)
//!
//! ```text
//! pages:   { "/blog/b.html": {meta, path}, "/blog/a.html": {meta, path} }   # date desc
//! index:   { "tags": { "rust": ["/blog/a.html", ...], "web": [...] } }      # term order per config
//! derived: { "zettel": { "1001": "/notes/a.html" } }                        # from post-processors
//! ```
//!
//! Draft and hidden pages are excluded from both `pages` and `index`.

use crate::config::SortOrder;
use crate::types::{KEY_DRAFT, KEY_HIDDEN, PageSummary, is_truthy};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("value of indexed key '{key}' in {path} must be a scalar or a list of scalars")]
    UnindexableValue { key: String, path: String },
}

/// A secondary index computed from the aggregate by a post-processor.
pub type DerivedIndex = BTreeMap<String, String>;

/// Term → page paths for one indexed metadata key, in configured term order.
/// Paths under a term follow the page order (newest first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermIndex {
    terms: Vec<(String, Vec<String>)>,
}

impl TermIndex {
    pub fn terms(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.terms
            .iter()
            .map(|(term, paths)| (term.as_str(), paths.as_slice()))
    }

    pub fn get(&self, term: &str) -> Option<&[String]> {
        self.terms
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, paths)| paths.as_slice())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Serialize for TermIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.terms.len()))?;
        for (term, paths) in &self.terms {
            map.serialize_entry(term, paths)?;
        }
        map.end()
    }
}

/// The complete, run-scoped index of eligible pages and term groupings.
#[derive(Debug, Clone, Default)]
pub struct BuildMetadata {
    pages: Vec<PageSummary>,
    index: BTreeMap<String, TermIndex>,
    derived: BTreeMap<String, DerivedIndex>,
}

impl BuildMetadata {
    /// Eligible pages, newest first.
    pub fn pages(&self) -> &[PageSummary] {
        &self.pages
    }

    pub fn page(&self, path: &str) -> Option<&PageSummary> {
        self.pages.iter().find(|p| p.path == path)
    }

    /// Term index for a configured key. Present (possibly empty) for every
    /// configured key, absent for keys that were never configured.
    pub fn term_index(&self, key: &str) -> Option<&TermIndex> {
        self.index.get(key)
    }

    pub fn indexed_keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn derived(&self, name: &str) -> Option<&DerivedIndex> {
        self.derived.get(name)
    }

    /// Attach a derived index. Only called while indexing; the aggregate is
    /// shared immutably once processing begins.
    pub(crate) fn insert_derived(&mut self, name: &str, index: DerivedIndex) {
        self.derived.insert(name.to_string(), index);
    }

    pub fn term_count(&self) -> usize {
        self.index.values().map(TermIndex::len).sum()
    }
}

struct PagesByPath<'a>(&'a [PageSummary]);

impl Serialize for PagesByPath<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for page in self.0 {
            map.serialize_entry(&page.path, page)?;
        }
        map.end()
    }
}

impl Serialize for BuildMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("pages", &PagesByPath(&self.pages))?;
        map.serialize_entry("index", &self.index)?;
        map.serialize_entry("derived", &self.derived)?;
        map.end()
    }
}

/// Accumulates page summaries, then sorts them and builds the term indices
/// once every page is known.
pub struct MetadataBuilder<'a> {
    keys: &'a [String],
    order: &'a BTreeMap<String, SortOrder>,
    pages: Vec<PageSummary>,
}

impl<'a> MetadataBuilder<'a> {
    pub fn new(keys: &'a [String], order: &'a BTreeMap<String, SortOrder>) -> Self {
        Self {
            keys,
            order,
            pages: Vec::new(),
        }
    }

    /// Register one page. Drafts and hidden pages are ignored; returns
    /// whether the page was indexed.
    pub fn add_page(&mut self, page: PageSummary) -> Result<bool, MetadataError> {
        if is_truthy(page.meta.get(KEY_DRAFT)) || is_truthy(page.meta.get(KEY_HIDDEN)) {
            return Ok(false);
        }

        for key in self.keys {
            if page.meta.get(key).is_some_and(|v| terms_of(v).is_none()) {
                return Err(MetadataError::UnindexableValue {
                    key: key.clone(),
                    path: page.path.clone(),
                });
            }
        }

        if let Some(existing) = self.pages.iter_mut().find(|p| p.path == page.path) {
            warn!(path = %page.path, "two sources map to the same output path; keeping the last");
            *existing = page;
        } else {
            self.pages.push(page);
        }
        Ok(true)
    }

    pub fn finish(self) -> BuildMetadata {
        let mut pages = self.pages;
        pages.sort_by(|a, b| b.date().cmp(&a.date()).then_with(|| a.path.cmp(&b.path)));

        let index = self
            .keys
            .iter()
            .map(|key| {
                // Pages are already newest first, so postings come out in page order
                let mut postings: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for page in &pages {
                    let terms = page.meta.get(key).and_then(terms_of).unwrap_or_default();
                    for term in terms {
                        let paths = postings.entry(term).or_default();
                        if paths.last() != Some(&page.path) {
                            paths.push(page.path.clone());
                        }
                    }
                }
                let mut terms: Vec<(String, Vec<String>)> = postings.into_iter().collect();
                if self.order.get(key) == Some(&SortOrder::Desc) {
                    terms.reverse();
                }
                (key.clone(), TermIndex { terms })
            })
            .collect();

        BuildMetadata {
            pages,
            index,
            derived: BTreeMap::new(),
        }
    }
}

/// Normalize an indexed value to its terms: scalars are wrapped, sequences of
/// scalars are flattened, null yields no terms.
fn terms_of(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items.iter().map(scalar_term).collect(),
        other => scalar_term(other).map(|t| vec![t]),
    }
}

fn scalar_term(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
