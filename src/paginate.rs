//! Pagination and term grouping.
//!
//! A page whose front matter carries a `pagination` directive is expanded
//! into several virtual pages, each rendered like a normal page but with its
//! own output file and a `current_page.pagination` context.
//!
//! ```yaml
//! pagination:
//!   data: pages            # or an indexed key such as `tags`
//!   per_page: 20           # listing mode only, default 20
//!   subpage_prefix: /blog/ # listing mode: only pages under this path
//!   templates: [post.html] # listing mode: only pages using these templates
//! ```
//!
//! ## Listing mode (`data: pages`)
//!
//! Every eligible page except the calling one, newest first, in chunks of
//! `per_page`. Page 1 keeps the source filename; page *n* > 1 inserts *n*
//! before the extension (`/blog/index.html` → `/blog/index2.html`), is hidden
//! and has " - page n of total" appended to its title.
//!
//! ## Term mode (`data: <key>`)
//!
//! One page per term of the key's index, named with the term slug inserted
//! before the extension (`/tags.html` → `/tags-rust.html`). Terms whose slugs
//! collide are numbered so each still gets its own file. The key must be
//! configured in `index`.

use crate::metadata::BuildMetadata;
use crate::naming;
use crate::types::{KEY_HIDDEN, KEY_PAGINATION, KEY_TEMPLATE, KEY_TITLE, Meta, PageSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_PER_PAGE: usize = 20;

/// Data source naming every other eligible page.
pub const DATA_PAGES: &str = "pages";

#[derive(Error, Debug)]
pub enum PaginateError {
    #[error("{path}: invalid pagination directive: {message}")]
    InvalidDirective { path: String, message: String },
    #[error("{path}: pagination.data '{key}' is not an indexed key (add it to `index`)")]
    UnindexedKey { path: String, key: String },
}

/// The `pagination` block of a page's front matter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaginationDirective {
    pub data: String,
    #[serde(default)]
    pub per_page: Option<usize>,
    #[serde(default)]
    pub subpage_prefix: Option<String>,
    #[serde(default)]
    pub templates: Vec<String>,
}

impl PaginationDirective {
    /// Read the directive from page metadata. `Ok(None)` when absent.
    pub fn from_meta(meta: &Meta, path: &str) -> Result<Option<Self>, PaginateError> {
        let Some(value) = meta.get(KEY_PAGINATION).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let directive: Self =
            serde_json::from_value(value.clone()).map_err(|e| PaginateError::InvalidDirective {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        if directive.per_page == Some(0) {
            return Err(PaginateError::InvalidDirective {
                path: path.to_string(),
                message: "per_page must be at least 1".into(),
            });
        }
        Ok(Some(directive))
    }
}

/// The `current_page.pagination` context of one virtual page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Pagination {
    Listing {
        pages: Vec<PageSummary>,
        /// 1-based page number.
        n: usize,
        total: usize,
        /// Path of every page in the sequence; `pager[0]` is the canonical path.
        pager: Vec<String>,
        prev: Option<String>,
        next: Option<String>,
    },
    Term {
        pages: Vec<PageSummary>,
        term: String,
        /// Term → term page path, in index order.
        pager: serde_json::Map<String, Value>,
    },
}

/// One output page produced from a source page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageVariant {
    /// File path (leading `/`) the page is written to.
    pub output_file: String,
    /// Link path exposed as `current_page.path`.
    pub path: String,
    pub meta: Meta,
    pub pagination: Option<Pagination>,
}

impl PageVariant {
    /// Template named by the page, or the configured default.
    pub fn template<'a>(&'a self, default_template: &'a str) -> &'a str {
        self.meta
            .get(KEY_TEMPLATE)
            .and_then(Value::as_str)
            .unwrap_or(default_template)
    }
}

/// Expand a page into the variants it renders as.
///
/// Pages without a directive yield a single variant at their own path.
pub fn expand(
    meta: &Meta,
    canonical: &str,
    file_path: &str,
    metadata: &BuildMetadata,
    default_template: &str,
) -> Result<Vec<PageVariant>, PaginateError> {
    let Some(directive) = PaginationDirective::from_meta(meta, canonical)? else {
        return Ok(vec![PageVariant {
            output_file: file_path.to_string(),
            path: canonical.to_string(),
            meta: meta.clone(),
            pagination: None,
        }]);
    };

    if directive.data == DATA_PAGES {
        Ok(listing(&directive, meta, canonical, file_path, metadata, default_template))
    } else {
        terms(&directive, meta, canonical, file_path, metadata)
    }
}

fn listing(
    directive: &PaginationDirective,
    meta: &Meta,
    canonical: &str,
    file_path: &str,
    metadata: &BuildMetadata,
    default_template: &str,
) -> Vec<PageVariant> {
    // Already newest first
    let eligible: Vec<&PageSummary> = metadata
        .pages()
        .iter()
        .filter(|p| p.path != canonical && !p.title().is_empty() && !p.is_hidden())
        .filter(|p| {
            directive
                .subpage_prefix
                .as_deref()
                .is_none_or(|prefix| p.path.starts_with(prefix))
        })
        .filter(|p| {
            directive.templates.is_empty()
                || directive
                    .templates
                    .iter()
                    .any(|t| t == p.template().unwrap_or(default_template))
        })
        .collect();

    let per_page = directive.per_page.unwrap_or(DEFAULT_PER_PAGE);
    let total = eligible.len().div_ceil(per_page).max(1);
    let pager: Vec<String> = (1..=total)
        .map(|n| match n {
            1 => canonical.to_string(),
            n => naming::insert_before_extension(file_path, &n.to_string()),
        })
        .collect();

    (1..=total)
        .map(|n| {
            let chunk: Vec<PageSummary> = eligible
                .iter()
                .skip((n - 1) * per_page)
                .take(per_page)
                .map(|p| (*p).clone())
                .collect();
            let mut page_meta = meta.clone();
            let output_file = if n == 1 {
                file_path.to_string()
            } else {
                let title = page_meta
                    .get(KEY_TITLE)
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let title = format!("{title} - page {n} of {total}");
                page_meta.insert(KEY_TITLE.to_string(), Value::from(title));
                page_meta.insert(KEY_HIDDEN.to_string(), Value::Bool(true));
                pager[n - 1].clone()
            };
            PageVariant {
                output_file,
                path: pager[n - 1].clone(),
                meta: page_meta,
                pagination: Some(Pagination::Listing {
                    pages: chunk,
                    n,
                    total,
                    pager: pager.clone(),
                    prev: (n > 1).then(|| pager[n - 2].clone()),
                    next: (n < total).then(|| pager[n].clone()),
                }),
            }
        })
        .collect()
}

fn terms(
    directive: &PaginationDirective,
    meta: &Meta,
    canonical: &str,
    file_path: &str,
    metadata: &BuildMetadata,
) -> Result<Vec<PageVariant>, PaginateError> {
    let index = metadata
        .term_index(&directive.data)
        .ok_or_else(|| PaginateError::UnindexedKey {
            path: canonical.to_string(),
            key: directive.data.clone(),
        })?;

    let files = term_files(index.terms().map(|(term, _)| term), file_path);
    let pager: serde_json::Map<String, Value> = index
        .terms()
        .zip(&files)
        .map(|((term, _), file)| (term.to_string(), Value::from(file.as_str())))
        .collect();

    Ok(index
        .terms()
        .zip(files)
        .map(|((term, paths), output_file)| {
            let pages = paths
                .iter()
                .filter_map(|p| metadata.page(p).cloned())
                .collect();
            PageVariant {
                path: output_file.clone(),
                output_file,
                meta: meta.clone(),
                pagination: Some(Pagination::Term {
                    pages,
                    term: term.to_string(),
                    pager: pager.clone(),
                }),
            }
        })
        .collect())
}

/// One output file per term, in term order.
///
/// Terms whose slugs collide (`C++` and `C#`), including case-only
/// differences, get `-2`, `-3` appended in order. A term with no slug
/// characters at all is named `term`.
fn term_files<'a>(terms: impl Iterator<Item = &'a str>, file_path: &str) -> Vec<String> {
    let mut taken = HashSet::new();
    terms
        .map(|term| {
            let base = match naming::term_slug(term) {
                slug if slug.is_empty() => "term".to_string(),
                slug => slug,
            };
            let mut slug = base.clone();
            let mut n = 2;
            while !taken.insert(slug.to_lowercase()) {
                slug = format!("{base}-{n}");
                n += 1;
            }
            naming::insert_before_extension(file_path, &format!("-{slug}"))
        })
        .collect()
}
