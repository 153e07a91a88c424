//! Shared test utilities for the folio test suite.
//!
//! Provides fixture setup, file writers, and page builders for tests that
//! work with content files, the metadata aggregate, and full builds.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let config = test_config(tmp.path());
//! write_file(&config.content_dir, "blog/post.md", "---\ntitle: Post\n---\nHi");
//!
//! let page = summary("/blog/post.html", "Post", 1700000000)
//!     .with("tags", json!(["rust"]));
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::SiteConfig;
use crate::types::{KEY_DATE, KEY_TITLE, Meta, PageSummary};
use serde_json::Value;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/` (content and templates) to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// A config whose directories all live under `root`.
pub fn test_config(root: &Path) -> SiteConfig {
    SiteConfig {
        content_dir: root.join("content"),
        output_dir: root.join("www"),
        temp_dir: root.join(".folio-tmp"),
        template_dir: root.join("templates"),
        ..SiteConfig::default()
    }
}

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

// =========================================================================
// Page builders
// =========================================================================

/// A normalized page summary with a title and a timestamp date.
pub fn summary(path: &str, title: &str, date: i64) -> PageSummary {
    let mut meta = Meta::new();
    meta.insert(KEY_TITLE.to_string(), Value::from(title));
    meta.insert(KEY_DATE.to_string(), Value::from(date));
    PageSummary {
        meta,
        path: path.to_string(),
    }
}

impl PageSummary {
    /// Set one metadata key, builder style.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }
}
