//! # Folio
//!
//! A static site builder for markdown content. A directory of markdown files
//! with YAML front matter, plus any assets, becomes a directory of HTML pages
//! rendered through Tera templates.
//!
//! # Architecture: Index, Then Render
//!
//! A build runs in two passes over the content, followed by an atomic
//! publish:
//!
//! ```text
//! 1. Scan      content/   →  copy + parse lists     (filesystem → files)
//! 2. Index     parse list →  BuildMetadata          (every page, every term)
//! 3. Process   files      →  .folio-tmp/            (copy assets, render pages)
//! 4. Publish   .folio-tmp →  www/                   (rename into place)
//! ```
//!
//! Indexing completes before the first page renders, so any page can list
//! recent posts or build a tag cloud from the complete site. The aggregate
//! is read-only from then on.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`build`] | Orchestrator state machine, staging, publish, build events |
//! | [`file_list`] | Content discovery, classification, indexing and processing driver |
//! | [`content`] | One source file: open, parse, normalize metadata, output paths, render |
//! | [`frontmatter`] | Splits a file into YAML metadata and markdown body |
//! | [`metadata`] | The build metadata aggregate: pages, term indices, derived indices |
//! | [`paginate`] | Expands paginated pages into numbered or per-term virtual pages |
//! | [`render`] | Template seam, Tera renderer, filters, two-pass page rendering |
//! | [`postprocess`] | HTML post-processors (zettel cross-reference links) |
//! | [`config`] | `folio.toml` loading, merging and validation |
//! | [`types`] | Shared metadata types and well-known keys |
//! | [`naming`] | Filename conventions: titles, extensions, term slugs |
//! | [`output`] | CLI output formatting for build events and checks |
//!
//! # Design Decisions
//!
//! ## Metadata Is Untyped
//!
//! Front matter is arbitrary user data, so it is kept as a JSON value tree
//! rather than a fixed struct. The same values flow into the template
//! context unchanged. Only the handful of keys the pipeline itself reads
//! (`title`, `date`, `draft`, `hidden`, `path`, `template`, `pagination`)
//! are interpreted, and they are normalized once at parse time.
//!
//! ## Rename, Never Copy, Into the Output
//!
//! Pages render into a staging directory. Only when every file succeeded is
//! the staging directory renamed over the output, so visitors never see a
//! half-written site and a failed build leaves the last good one in place.
//!
//! ## Templates Are Data
//!
//! Unlike a compile-time HTML DSL, Tera templates live on disk next to the
//! content and can be changed without rebuilding the binary. Built-in
//! templates are embedded as a fallback, so a bare content directory still
//! builds.

pub mod build;
pub mod config;
pub mod content;
pub mod file_list;
pub mod frontmatter;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod paginate;
pub mod postprocess;
pub mod render;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
