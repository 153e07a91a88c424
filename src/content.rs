//! Source files and their normalized metadata.
//!
//! Construction is explicit and two-phase:
//!
//! ```text
//! RawFile::open(path)   → checks the file exists, records fs timestamps
//! RawFile::parse()      → reads, splits front matter, normalizes → ContentFile
//! ```
//!
//! A [`ContentFile`] is fully materialized when it exists; nothing is split
//! or derived on first access.
//!
//! ## Normalization
//!
//! After parsing, a page's metadata always contains:
//!
//! - `title`: from front matter, or derived from the filename when absent or
//!   blank (`my-first_post.md` → "my first post")
//! - `date`: Unix timestamp. Date strings are parsed; integers are kept as
//!   they are; absent dates default to the file modification time
//! - `created` / `modified`: Unix timestamps, defaulting to the filesystem's
//!   creation and modification times
//!
//! ## Output paths
//!
//! ```text
//! content/blog/post.md       → /blog/post.html
//! content/blog/index.md      → /blog/            (canonical, index stripped)
//!                            → /blog/index.html  (file form)
//! path: about/               → /about/           (written to about/index.html)
//! ```

use crate::build::{BuildContext, BuildError};
use crate::frontmatter::{self, FrontMatterError};
use crate::naming;
use crate::paginate;
use crate::postprocess;
use crate::render::{self, RenderError, Renderer};
use crate::types::{
    KEY_CREATED, KEY_DATE, KEY_DRAFT, KEY_MODIFIED, KEY_PATH, KEY_TITLE, Meta, PageSummary,
    is_truthy,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("not a regular file: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    FrontMatter {
        path: PathBuf,
        source: FrontMatterError,
    },
    #[error("{path}: cannot parse {key} '{value}' as a date (metadata: {meta})")]
    DateParse {
        path: PathBuf,
        key: &'static str,
        value: String,
        meta: String,
    },
    #[error("{path} is outside the content root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("output path '{0}' escapes the build directory")]
    UnsafeOutputPath(String),
}

/// A discovered source file that has not been read yet.
#[derive(Debug, Clone)]
pub struct RawFile {
    path: PathBuf,
    created: i64,
    modified: i64,
}

impl RawFile {
    /// Fails with [`ContentError::NotFound`] unless `path` is a regular file.
    pub fn open(path: &Path) -> Result<Self, ContentError> {
        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(ContentError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ContentError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let modified = metadata.modified().map(unix_seconds).unwrap_or_default();
        // Not every filesystem records a birth time
        let created = metadata.created().map(unix_seconds).unwrap_or(modified);
        Ok(Self {
            path: path.to_path_buf(),
            created,
            modified,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_parsable(&self) -> bool {
        naming::is_parsable(&self.path)
    }

    /// Read the file, split its front matter and normalize the metadata.
    pub fn parse(self) -> Result<ContentFile, ContentError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ContentError::Io {
            path: self.path.clone(),
            source,
        })?;
        let (meta, body) =
            frontmatter::split(&raw).map_err(|source| ContentError::FrontMatter {
                path: self.path.clone(),
                source,
            })?;
        let meta = self.normalize(meta)?;
        Ok(ContentFile {
            path: self.path,
            meta,
            body,
        })
    }

    /// Copy the file byte-for-byte to its mirrored location under the build
    /// root. Returns the output path relative to the build root.
    pub fn copy_to(&self, ctx: &BuildContext) -> Result<String, ContentError> {
        let relative = relative_path(ctx.content_root, &self.path)?;
        let target = target_file(ctx.build_root, &relative)?;
        ensure_parent(&target)?;
        fs::copy(&self.path, &target).map_err(|source| ContentError::Io {
            path: target.clone(),
            source,
        })?;
        Ok(relative)
    }

    fn normalize(&self, mut meta: Meta) -> Result<Meta, ContentError> {
        let title = match meta.get(KEY_TITLE) {
            Some(Value::String(s)) if !s.trim().is_empty() => None,
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => Some(naming::title_from_filename(&self.path)),
        };
        if let Some(title) = title {
            meta.insert(KEY_TITLE.to_string(), Value::from(title));
        }

        for (key, fallback) in [
            (KEY_DATE, self.modified),
            (KEY_CREATED, self.created),
            (KEY_MODIFIED, self.modified),
        ] {
            let timestamp = match meta.get(key) {
                None | Some(Value::Null) => fallback,
                Some(Value::Number(_)) => continue,
                Some(value) => match value.as_str().and_then(parse_date) {
                    Some(ts) => ts,
                    None => {
                        return Err(ContentError::DateParse {
                            path: self.path.clone(),
                            key,
                            value: display_value(value),
                            meta: Value::Object(meta.clone()).to_string(),
                        });
                    }
                },
            };
            meta.insert(key.to_string(), Value::from(timestamp));
        }
        Ok(meta)
    }
}

/// A parsed, normalized markdown source.
#[derive(Debug, Clone)]
pub struct ContentFile {
    path: PathBuf,
    meta: Meta,
    body: String,
}

/// What happened to one source file during processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Rendered { outputs: Vec<String> },
    SkippedDraft,
}

impl ContentFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_draft(&self) -> bool {
        is_truthy(self.meta.get(KEY_DRAFT))
    }

    /// The page's output path, always beginning with `/`.
    ///
    /// With `strip_index`, a trailing `index.html` segment is removed so
    /// `/blog/index.html` becomes `/blog/`. Without it the path names the
    /// file that gets written.
    pub fn output_path(&self, content_root: &Path, strip_index: bool) -> Result<String, ContentError> {
        let mut path = match self.meta.get(KEY_PATH).and_then(Value::as_str) {
            Some(p) if !p.trim().is_empty() => format!("/{}", p.trim().trim_start_matches('/')),
            _ => format!("/{}", naming::html_path(&relative_path(content_root, &self.path)?)),
        };
        if path.ends_with('/') {
            path.push_str(INDEX_FILE);
        }
        if strip_index && path.ends_with(INDEX_SUFFIX) {
            path.truncate(path.len() - INDEX_FILE.len());
        }
        Ok(path)
    }

    /// The page as every other page sees it.
    pub fn summary(&self, content_root: &Path) -> Result<PageSummary, ContentError> {
        Ok(PageSummary {
            meta: self.meta.clone(),
            path: self.output_path(content_root, true)?,
        })
    }

    /// Render this page (and any pagination variants) into the build root.
    ///
    /// Drafts are skipped before anything touches the filesystem.
    pub fn process(
        &self,
        ctx: &BuildContext,
        renderer: &mut dyn Renderer,
    ) -> Result<Processed, BuildError> {
        if self.is_draft() {
            debug!(path = %self.path.display(), "skipping draft");
            return Ok(Processed::SkippedDraft);
        }

        let canonical = self.output_path(ctx.content_root, true)?;
        let file_path = self.output_path(ctx.content_root, false)?;
        let variants = paginate::expand(
            &self.meta,
            &canonical,
            &file_path,
            ctx.metadata,
            &ctx.config.default_template,
        )?;

        let mut outputs = Vec::with_capacity(variants.len());
        for variant in &variants {
            let template = variant.template(&ctx.config.default_template);
            let html = render::render_page(renderer, ctx.base_context, variant, &self.body, template)
                .map_err(|source: RenderError| BuildError::Render {
                    path: variant.output_file.clone(),
                    source,
                })?;
            let html = postprocess::apply(ctx.post_processors, html, ctx.metadata)?;

            let target = target_file(ctx.build_root, &variant.output_file)?;
            ensure_parent(&target)?;
            fs::write(&target, html).map_err(|source| ContentError::Io {
                path: target.clone(),
                source,
            })?;
            debug!(output = %variant.output_file, "rendered");
            outputs.push(variant.output_file.clone());
        }
        Ok(Processed::Rendered { outputs })
    }
}

const INDEX_FILE: &str = "index.html";
const INDEX_SUFFIX: &str = "/index.html";

/// Resolve an output path (leading `/` optional) to a file under `build_root`.
///
/// Paths ending in `/` name a directory and resolve to its `index.html`.
/// Parent-directory segments are rejected.
pub fn target_file(build_root: &Path, output_path: &str) -> Result<PathBuf, ContentError> {
    let relative = output_path.trim_start_matches('/');
    let mut target = build_root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => return Err(ContentError::UnsafeOutputPath(output_path.to_string())),
        }
    }
    if relative.is_empty() || relative.ends_with('/') {
        target.push(INDEX_FILE);
    }
    Ok(target)
}

/// `path` relative to `root`, with `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> Result<String, ContentError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ContentError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn ensure_parent(target: &Path) -> Result<(), ContentError> {
    match target.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|source| ContentError::Io {
            path: parent.to_path_buf(),
            source,
        }),
        None => Ok(()),
    }
}

fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Formats carrying their own offset.
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M %z"];

/// Formats read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%b %d, %Y",
];

/// Parse a human-written date into a Unix timestamp.
pub fn parse_date(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.timestamp());
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(text, f).ok())
    {
        return Some(dt.timestamp());
    }
    if let Some(dt) = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(dt.and_utc().timestamp());
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
    {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
    }
    // Quoted integers are still timestamps
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use serde_json::json;
    use tempfile::TempDir;

    fn parse_in(tmp: &TempDir, relative: &str, text: &str) -> ContentFile {
        let path = write_file(tmp.path(), relative, text);
        RawFile::open(&path).unwrap().parse().unwrap()
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = RawFile::open(&tmp.path().join("nope.md"));
        assert!(matches!(result, Err(ContentError::NotFound(_))));
    }

    #[test]
    fn open_directory_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = RawFile::open(tmp.path());
        assert!(matches!(result, Err(ContentError::NotFound(_))));
    }

    #[test]
    fn title_derived_from_filename() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "my-first_post.md", "Hello");
        assert_eq!(page.meta()[KEY_TITLE], json!("my first post"));
        assert_eq!(page.body(), "Hello");
    }

    #[test]
    fn blank_title_is_derived() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "about-me.md", "---\ntitle: \"  \"\n---\nx");
        assert_eq!(page.meta()[KEY_TITLE], json!("about me"));
    }

    #[test]
    fn draft_flag_follows_yaml_values() {
        let tmp = TempDir::new().unwrap();
        assert!(!parse_in(&tmp, "a.md", "---\ndraft: false\n---\nx").is_draft());
        assert!(!parse_in(&tmp, "b.md", "---\ndraft: 0\n---\nx").is_draft());
        assert!(parse_in(&tmp, "c.md", "---\ndraft: yes\n---\nx").is_draft());
        // quoted or YAML 1.2 plain `no` is a non-empty string
        assert!(parse_in(&tmp, "d.md", "---\ndraft: \"false\"\n---\nx").is_draft());
        assert!(parse_in(&tmp, "e.md", "---\ndraft: no\n---\nx").is_draft());
    }

    #[test]
    fn numeric_title_is_stringified() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "year.md", "---\ntitle: 1999\n---\nx");
        assert_eq!(page.meta()[KEY_TITLE], json!("1999"));
    }

    #[test]
    fn date_string_becomes_timestamp() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "post.md", "---\ndate: 2024-01-15\n---\nx");
        assert_eq!(page.meta()[KEY_DATE], json!(1705276800));
    }

    #[test]
    fn integer_date_is_kept() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "post.md", "---\ndate: 1234567\n---\nx");
        assert_eq!(page.meta()[KEY_DATE], json!(1234567));
    }

    #[test]
    fn missing_dates_default_to_file_times() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "post.md", "no front matter");
        let date = page.meta()[KEY_DATE].as_i64().unwrap();
        let created = page.meta()[KEY_CREATED].as_i64().unwrap();
        let modified = page.meta()[KEY_MODIFIED].as_i64().unwrap();
        assert!(date > 0);
        assert_eq!(date, modified);
        assert!(created > 0);
    }

    #[test]
    fn unparseable_date_reports_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(tmp.path(), "bad.md", "---\ntitle: Bad\ndate: someday\n---\nx");
        let err = RawFile::open(&path).unwrap().parse().unwrap_err();
        match &err {
            ContentError::DateParse { key, value, meta, .. } => {
                assert_eq!(*key, KEY_DATE);
                assert_eq!(value, "someday");
                assert!(meta.contains("\"title\":\"Bad\""));
            }
            other => panic!("expected DateParse, got {other:?}"),
        }
    }

    #[test]
    fn invalid_front_matter_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(tmp.path(), "bad.md", "---\ntitle: [oops\n---\nx");
        let result = RawFile::open(&path).unwrap().parse();
        assert!(matches!(result, Err(ContentError::FrontMatter { .. })));
    }

    #[test]
    fn output_path_replaces_extension() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "blog/post.md", "x");
        assert_eq!(page.output_path(tmp.path(), true).unwrap(), "/blog/post.html");
    }

    #[test]
    fn output_path_strips_index_only_when_asked() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "blog/index.md", "x");
        assert_eq!(page.output_path(tmp.path(), true).unwrap(), "/blog/");
        assert_eq!(
            page.output_path(tmp.path(), false).unwrap(),
            "/blog/index.html"
        );

        let root = parse_in(&tmp, "index.md", "x");
        assert_eq!(root.output_path(tmp.path(), true).unwrap(), "/");
    }

    #[test]
    fn output_path_keeps_names_ending_in_index() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "reindex.md", "x");
        assert_eq!(page.output_path(tmp.path(), true).unwrap(), "/reindex.html");
    }

    #[test]
    fn path_override_wins() {
        let tmp = TempDir::new().unwrap();
        let page = parse_in(&tmp, "deep/page.md", "---\npath: about/\n---\nx");
        assert_eq!(page.output_path(tmp.path(), true).unwrap(), "/about/");
        assert_eq!(
            page.output_path(tmp.path(), false).unwrap(),
            "/about/index.html"
        );
    }

    #[test]
    fn target_file_resolves_directories_to_index() {
        let root = Path::new("/build");
        assert_eq!(
            target_file(root, "/blog/").unwrap(),
            PathBuf::from("/build/blog/index.html")
        );
        assert_eq!(
            target_file(root, "/").unwrap(),
            PathBuf::from("/build/index.html")
        );
        assert_eq!(
            target_file(root, "/a/b.html").unwrap(),
            PathBuf::from("/build/a/b.html")
        );
    }

    #[test]
    fn target_file_rejects_parent_segments() {
        let result = target_file(Path::new("/build"), "/../etc/passwd");
        assert!(matches!(result, Err(ContentError::UnsafeOutputPath(_))));
    }

    #[test]
    fn parse_date_accepts_common_formats() {
        assert_eq!(parse_date("2024-01-15"), Some(1705276800));
        assert_eq!(parse_date("2024/01/15"), Some(1705276800));
        assert_eq!(parse_date("15 January 2024"), Some(1705276800));
        assert_eq!(parse_date("January 15, 2024"), Some(1705276800));
        assert_eq!(parse_date("2024-01-15 01:00:00"), Some(1705280400));
        assert_eq!(parse_date("2024-01-15T01:00:00+01:00"), Some(1705276800));
        assert_eq!(parse_date("Mon, 15 Jan 2024 00:00:00 +0000"), Some(1705276800));
        assert_eq!(parse_date("1705276800"), Some(1705276800));
        assert_eq!(parse_date("next tuesday"), None);
    }
}
