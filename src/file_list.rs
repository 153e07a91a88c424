//! Content discovery and the two-phase pipeline driver.
//!
//! [`scan`] walks the content root once and sorts every regular file into
//! one of two groups by extension alone:
//!
//! ```text
//! content/
//! ├── index.md            → parse
//! ├── blog/
//! │   ├── first-post.md   → parse
//! │   └── diagram.svg     → copy
//! └── .DS_Store           → excluded (exclude_files)
//! ```
//!
//! [`ContentFileList::compile_metadata`] then parses every markdown source
//! and builds the complete [`BuildMetadata`] aggregate. Only after that does
//! [`ContentFileList::process`] copy assets and render pages, so every page
//! sees the whole site.

use crate::build::{BuildContext, BuildError, BuildEvent};
use crate::config::{ConfigError, SiteConfig, SortOrder};
use crate::content::{ContentError, ContentFile, Processed, RawFile, relative_path};
use crate::metadata::{BuildMetadata, MetadataBuilder};
use crate::render::Renderer;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("content directory not found: {0}")]
    NotFound(PathBuf),
    #[error("no content files found in {0}")]
    Empty(PathBuf),
    #[error("failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Basename exclusions applied while scanning.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    files: Vec<String>,
    patterns: Vec<Regex>,
}

impl ScanFilter {
    pub fn new(files: Vec<String>, patterns: Vec<Regex>) -> Self {
        Self { files, patterns }
    }

    pub fn from_config(config: &SiteConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.exclude_files.clone(), config.exclude_patterns()?))
    }

    pub fn excludes(&self, name: &str) -> bool {
        self.files.iter().any(|f| f == name) || self.patterns.iter().any(|p| p.is_match(name))
    }
}

/// Counts of what [`ContentFileList::process`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub copied: usize,
    pub rendered: usize,
    pub skipped_drafts: usize,
}

/// Every discovered file, split into verbatim copies and markdown sources.
#[derive(Debug)]
pub struct ContentFileList {
    root: PathBuf,
    copy: Vec<RawFile>,
    parse: Vec<RawFile>,
    parsed: Vec<ContentFile>,
}

/// Recursively discover every regular file under `root`.
///
/// Directories matching the filter are not descended into. Fails when the
/// root is missing or yields no files at all.
pub fn scan(root: &Path, filter: &ScanFilter) -> Result<ContentFileList, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotFound(root.to_path_buf()));
    }
    let root = root
        .canonicalize()
        .map_err(|source| ContentError::Io {
            path: root.to_path_buf(),
            source,
        })?;

    let mut list = ContentFileList {
        root: root.clone(),
        copy: Vec::new(),
        parse: Vec::new(),
        parsed: Vec::new(),
    };

    let walker = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !filter.excludes(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file = RawFile::open(entry.path())?;
        if file.is_parsable() {
            list.parse.push(file);
        } else {
            list.copy.push(file);
        }
    }

    if list.is_empty() {
        return Err(ScanError::Empty(root));
    }
    info!(
        root = %root.display(),
        parse = list.parse.len(),
        copy = list.copy.len(),
        "scanned content"
    );
    Ok(list)
}

impl ContentFileList {
    /// Canonical content root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn copy_files(&self) -> &[RawFile] {
        &self.copy
    }

    pub fn copy_count(&self) -> usize {
        self.copy.len()
    }

    pub fn parse_count(&self) -> usize {
        self.parse.len() + self.parsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copy.is_empty() && self.parse_count() == 0
    }

    /// Parse every markdown source and build the metadata aggregate.
    ///
    /// Runs to completion before anything renders; any parse error aborts.
    pub fn compile_metadata(
        &mut self,
        keys: &[String],
        order: &BTreeMap<String, SortOrder>,
    ) -> Result<BuildMetadata, BuildError> {
        self.parse_pending()?;

        let mut builder = MetadataBuilder::new(keys, order);
        for page in &self.parsed {
            let summary = page.summary(&self.root)?;
            let path = summary.path.clone();
            if !builder.add_page(summary)? {
                debug!(%path, "not indexed (draft or hidden)");
            }
        }
        Ok(builder.finish())
    }

    /// Copy every asset, then render every page, emptying the list.
    pub fn process(
        &mut self,
        ctx: &BuildContext,
        renderer: &mut dyn Renderer,
    ) -> Result<ProcessStats, BuildError> {
        let mut stats = ProcessStats::default();

        for file in self.copy.drain(..) {
            let path = file.copy_to(ctx)?;
            stats.copied += 1;
            ctx.emit(BuildEvent::Copied { path });
        }

        self.parse_pending()?;
        for page in self.parsed.drain(..) {
            let source = relative_path(&self.root, page.path())?;
            match page.process(ctx, renderer)? {
                Processed::Rendered { outputs } => {
                    stats.rendered += outputs.len();
                    ctx.emit(BuildEvent::Rendered { source, outputs });
                }
                Processed::SkippedDraft => {
                    stats.skipped_drafts += 1;
                    ctx.emit(BuildEvent::DraftSkipped { source });
                }
            }
        }
        Ok(stats)
    }

    fn parse_pending(&mut self) -> Result<(), ContentError> {
        for file in self.parse.drain(..) {
            self.parsed.push(file.parse()?);
        }
        Ok(())
    }
}
