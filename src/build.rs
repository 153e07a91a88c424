//! The build orchestrator.
//!
//! A [`Build`] owns the configuration, the renderer and the post-processors
//! and drives one run through a fixed sequence of states:
//!
//! ```text
//! NotStarted → Scanning → Indexing → Processing → Publishing → Cleanup → Finished
//!                  └──────────┴───────────┴────────────┴──→ Cleanup → Failed
//! ```
//!
//! | State | Work |
//! |-------|------|
//! | Scanning | check the content root, reset the staging dir, discover files |
//! | Indexing | parse every page, build the metadata aggregate and derived indices |
//! | Processing | copy assets and render pages into the staging dir |
//! | Publishing | swap the staging dir into the output location |
//! | Cleanup | remove the staging dir; runs on success and failure |
//!
//! ## Crash safety
//!
//! Nothing is written to the output directory until every page has rendered.
//! Publishing renames the existing output aside, renames the staging
//! directory into place, then deletes the old output. A failed run (or a
//! killed process) leaves the previously published site untouched.
//!
//! ## Progress reporting
//!
//! Progress is reported as [`BuildEvent`]s over an optional channel passed in
//! by the caller; diagnostics go through `tracing`.

use crate::config::{ConfigError, SiteConfig};
use crate::content::ContentError;
use crate::file_list::{self, ProcessStats, ScanError, ScanFilter};
use crate::metadata::{BuildMetadata, MetadataError};
use crate::paginate::PaginateError;
use crate::postprocess::{self, PostProcessError, PostProcessor};
use crate::render::{self, RenderError, Renderer, TeraRenderer};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NotStarted,
    Scanning,
    Indexing,
    Processing,
    Publishing,
    Cleanup,
    Finished,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::NotStarted => "not started",
            BuildState::Scanning => "scanning",
            BuildState::Indexing => "indexing",
            BuildState::Processing => "processing",
            BuildState::Publishing => "publishing",
            BuildState::Cleanup => "cleanup",
            BuildState::Finished => "finished",
            BuildState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Coarse classification of run failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    EmptyContent,
    Parse,
    Config,
    Template,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::EmptyContent => "empty content",
            ErrorKind::Parse => "parse error",
            ErrorKind::Config => "config error",
            ErrorKind::Template => "template error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("content directory not found: {0}")]
    ContentDirNotFound(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Paginate(#[from] PaginateError),
    #[error(transparent)]
    Templates(#[from] RenderError),
    #[error("rendering {path}: {source}")]
    Render { path: String, source: RenderError },
    #[error(transparent)]
    PostProcess(#[from] PostProcessError),
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::ContentDirNotFound(_) => ErrorKind::NotFound,
            BuildError::Config(_) | BuildError::Paginate(_) => ErrorKind::Config,
            BuildError::Scan(err) => match err {
                ScanError::NotFound(_) => ErrorKind::NotFound,
                ScanError::Empty(_) => ErrorKind::EmptyContent,
                ScanError::Walk(_) => ErrorKind::Io,
                ScanError::Content(err) => content_kind(err),
            },
            BuildError::Content(err) => content_kind(err),
            BuildError::Metadata(_) => ErrorKind::Parse,
            BuildError::Templates(_) | BuildError::Render { .. } => ErrorKind::Template,
            BuildError::PostProcess(err) => match err {
                PostProcessError::Unknown(_) => ErrorKind::Config,
                PostProcessError::DuplicateId { .. } => ErrorKind::Parse,
            },
            BuildError::Io { .. } => ErrorKind::Io,
        }
    }
}

fn content_kind(err: &ContentError) -> ErrorKind {
    match err {
        ContentError::NotFound(_) => ErrorKind::NotFound,
        ContentError::FrontMatter { .. } | ContentError::DateParse { .. } => ErrorKind::Parse,
        ContentError::UnsafeOutputPath(_) => ErrorKind::Config,
        ContentError::Io { .. } | ContentError::OutsideRoot { .. } => ErrorKind::Io,
    }
}

/// Progress of a run, sent to the caller's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    StateChanged { from: BuildState, to: BuildState },
    FilesFound { parse: usize, copy: usize },
    Indexed { pages: usize, terms: usize },
    Copied { path: String },
    Rendered { source: String, outputs: Vec<String> },
    DraftSkipped { source: String },
    Published { output: PathBuf },
    Failed { kind: ErrorKind, message: String },
}

/// What a successful run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Eligible (non-draft, non-hidden) pages in the aggregate.
    pub pages: usize,
    pub copied: usize,
    /// Output pages written, pagination variants included.
    pub rendered: usize,
    pub skipped_drafts: usize,
}

/// Scan and index results without rendering.
#[derive(Debug)]
pub struct CheckReport {
    pub parse_files: usize,
    pub copy_files: usize,
    pub metadata: BuildMetadata,
}

/// Everything a file needs while it is processed.
pub struct BuildContext<'a> {
    pub content_root: &'a Path,
    pub build_root: &'a Path,
    pub config: &'a SiteConfig,
    pub metadata: &'a BuildMetadata,
    pub base_context: &'a tera::Context,
    pub post_processors: &'a [Box<dyn PostProcessor>],
    pub events: Option<&'a Sender<BuildEvent>>,
}

impl BuildContext<'_> {
    pub fn emit(&self, event: BuildEvent) {
        if let Some(tx) = self.events {
            // A closed channel only means nobody is listening
            let _ = tx.send(event);
        }
    }
}

pub struct Build {
    config: SiteConfig,
    renderer: Box<dyn Renderer>,
    post_processors: Vec<Box<dyn PostProcessor>>,
    events: Option<Sender<BuildEvent>>,
    state: BuildState,
}

impl Build {
    pub fn new(config: SiteConfig, renderer: Box<dyn Renderer>) -> Self {
        Self {
            config,
            renderer,
            post_processors: Vec::new(),
            events: None,
            state: BuildState::NotStarted,
        }
    }

    /// Tera renderer over `template_dir` plus the configured post-processors.
    pub fn from_config(config: SiteConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let renderer = TeraRenderer::new(Some(&config.template_dir))?;
        let post_processors = postprocess::from_names(&config.post_process)?;
        let mut build = Self::new(config, Box::new(renderer));
        build.post_processors = post_processors;
        Ok(build)
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_post_processor(mut self, processor: Box<dyn PostProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Run the whole pipeline. The staging directory is removed whatever the
    /// outcome; on failure the output directory is left as it was.
    pub fn run(&mut self) -> Result<BuildSummary, BuildError> {
        let span = info_span!("build", output = %self.config.output_dir.display());
        let _guard = span.enter();

        let result = self.execute();

        self.transition(BuildState::Cleanup);
        if let Err(err) = remove_dir_if_exists(&self.config.temp_dir) {
            warn!(error = %err, "failed to remove staging directory");
        }

        match result {
            Ok(summary) => {
                self.transition(BuildState::Finished);
                info!(
                    pages = summary.pages,
                    rendered = summary.rendered,
                    copied = summary.copied,
                    "build finished"
                );
                Ok(summary)
            }
            Err(err) => {
                self.emit(BuildEvent::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                self.transition(BuildState::Failed);
                Err(err)
            }
        }
    }

    /// Scan and index without rendering or touching the output directory.
    pub fn check(&mut self) -> Result<CheckReport, BuildError> {
        let span = info_span!("check");
        let _guard = span.enter();

        let result = self.index_only();
        match result {
            Ok(report) => {
                self.transition(BuildState::Finished);
                Ok(report)
            }
            Err(err) => {
                self.emit(BuildEvent::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                self.transition(BuildState::Failed);
                Err(err)
            }
        }
    }

    fn index_only(&mut self) -> Result<CheckReport, BuildError> {
        self.transition(BuildState::Scanning);
        let mut files = self.scan()?;
        self.transition(BuildState::Indexing);
        let metadata = self.index(&mut files)?;
        Ok(CheckReport {
            parse_files: files.parse_count(),
            copy_files: files.copy_count(),
            metadata,
        })
    }

    fn execute(&mut self) -> Result<BuildSummary, BuildError> {
        self.transition(BuildState::Scanning);
        let staging = self.config.temp_dir.clone();
        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging).map_err(|source| BuildError::Io {
            action: "creating staging directory",
            path: staging.clone(),
            source,
        })?;
        let mut files = self.scan()?;

        self.transition(BuildState::Indexing);
        let metadata = self.index(&mut files)?;

        self.transition(BuildState::Processing);
        let base_context = render::base_context(&self.config, &metadata)?;
        let content_root = files.root().to_path_buf();
        let ctx = BuildContext {
            content_root: &content_root,
            build_root: &staging,
            config: &self.config,
            metadata: &metadata,
            base_context: &base_context,
            post_processors: &self.post_processors,
            events: self.events.as_ref(),
        };
        let stats: ProcessStats = files.process(&ctx, self.renderer.as_mut())?;

        self.transition(BuildState::Publishing);
        publish(&staging, &self.config.output_dir)?;
        self.emit(BuildEvent::Published {
            output: self.config.output_dir.clone(),
        });

        Ok(BuildSummary {
            pages: metadata.pages().len(),
            copied: stats.copied,
            rendered: stats.rendered,
            skipped_drafts: stats.skipped_drafts,
        })
    }

    fn scan(&self) -> Result<file_list::ContentFileList, BuildError> {
        let content_dir = &self.config.content_dir;
        if !content_dir.is_dir() {
            return Err(BuildError::ContentDirNotFound(content_dir.clone()));
        }
        let filter = ScanFilter::from_config(&self.config)?;
        let files = file_list::scan(content_dir, &filter)?;
        self.emit(BuildEvent::FilesFound {
            parse: files.parse_count(),
            copy: files.copy_count(),
        });
        Ok(files)
    }

    fn index(&self, files: &mut file_list::ContentFileList) -> Result<BuildMetadata, BuildError> {
        let mut metadata = files.compile_metadata(&self.config.index, &self.config.index_order)?;
        postprocess::derive_indices(&self.post_processors, &mut metadata)?;
        self.emit(BuildEvent::Indexed {
            pages: metadata.pages().len(),
            terms: metadata.term_count(),
        });
        Ok(metadata)
    }

    fn transition(&mut self, to: BuildState) {
        let from = self.state;
        self.state = to;
        debug!(%from, %to, "state change");
        self.emit(BuildEvent::StateChanged { from, to });
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Swap `staging` into `output` with renames only.
///
/// An existing output directory is moved to a sibling backup first and
/// restored if the second rename fails.
fn publish(staging: &Path, output: &Path) -> Result<(), BuildError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| BuildError::Io {
            action: "creating output parent",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let backup = backup_path(output);
    remove_dir_if_exists(&backup)?;
    let had_output = output.exists();
    if had_output {
        fs::rename(output, &backup).map_err(|source| BuildError::Io {
            action: "moving previous output aside",
            path: output.to_path_buf(),
            source,
        })?;
    }

    if let Err(source) = fs::rename(staging, output) {
        if had_output {
            if let Err(err) = fs::rename(&backup, output) {
                warn!(backup = %backup.display(), error = %err, "failed to restore previous output");
            }
        }
        return Err(BuildError::Io {
            action: "publishing to",
            path: output.to_path_buf(),
            source,
        });
    }

    if had_output {
        if let Err(err) = fs::remove_dir_all(&backup) {
            warn!(backup = %backup.display(), error = %err, "failed to remove previous output");
        }
    }
    info!(output = %output.display(), "published");
    Ok(())
}

fn backup_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{name}.previous"))
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), BuildError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::Io {
            action: "removing",
            path: dir.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DerivedIndex;
    use crate::test_helpers::{test_config, write_file};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn tera_build(config: SiteConfig) -> Build {
        Build::from_config(config).unwrap()
    }

    #[test]
    fn successful_run_walks_every_state() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        write_file(&config.content_dir, "index.md", "---\ntitle: Home\n---\nHi");

        let (tx, rx) = mpsc::channel();
        let mut build = tera_build(config.clone()).with_events(tx);
        let summary = build.run().unwrap();
        drop(build);

        assert_eq!(summary.rendered, 1);
        let states: Vec<BuildState> = rx
            .iter()
            .filter_map(|e| match e {
                BuildEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                BuildState::Scanning,
                BuildState::Indexing,
                BuildState::Processing,
                BuildState::Publishing,
                BuildState::Cleanup,
                BuildState::Finished,
            ]
        );
        assert!(config.output_dir.join("index.html").is_file());
        assert!(!config.temp_dir.exists());
    }

    #[test]
    fn missing_content_dir_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let mut build = tera_build(config);
        let err = build.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(build.state(), BuildState::Failed);
    }

    #[test]
    fn empty_content_dir_is_empty_content() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        fs::create_dir_all(&config.content_dir).unwrap();
        let err = tera_build(config).run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyContent);
    }

    #[test]
    fn template_failure_leaves_output_untouched() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        write_file(&config.output_dir, "index.html", "previous site");
        write_file(&config.content_dir, "good.md", "fine");
        write_file(&config.content_dir, "bad.md", "{{ undefined_thing }}");

        let (tx, rx) = mpsc::channel();
        let mut build = tera_build(config.clone()).with_events(tx);
        let err = build.run().unwrap_err();
        drop(build);

        assert_eq!(err.kind(), ErrorKind::Template);
        assert_eq!(
            fs::read_to_string(config.output_dir.join("index.html")).unwrap(),
            "previous site"
        );
        assert!(!config.output_dir.join("good.html").exists());
        assert!(!config.temp_dir.exists());
        assert!(rx.iter().any(|e| matches!(e, BuildEvent::Failed { kind: ErrorKind::Template, .. })));
    }

    #[test]
    fn unindexed_pagination_key_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        write_file(
            &config.content_dir,
            "tags.md",
            "---\npagination:\n  data: tags\n---\nx",
        );
        let err = tera_build(config).run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn publish_replaces_previous_output() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        write_file(&config.output_dir, "stale.html", "old");
        write_file(&config.content_dir, "fresh.md", "new");

        tera_build(config.clone()).run().unwrap();

        assert!(!config.output_dir.join("stale.html").exists());
        assert!(config.output_dir.join("fresh.html").is_file());
        assert!(!backup_path(&config.output_dir).exists());
    }

    #[test]
    fn check_indexes_without_output() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.index = vec!["tags".to_string()];
        write_file(&config.content_dir, "a.md", "---\ntags: [x, y]\n---\nx");
        write_file(&config.content_dir, "logo.png", "png");

        let report = tera_build(config.clone()).check().unwrap();
        assert_eq!(report.parse_files, 1);
        assert_eq!(report.copy_files, 1);
        assert_eq!(report.metadata.term_count(), 2);
        assert!(!config.output_dir.exists());
        assert!(!config.temp_dir.exists());
    }

    #[test]
    fn zettel_links_are_rewritten_during_build() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.post_process = vec!["zettel".to_string()];
        write_file(&config.content_dir, "notes/idea.md", "---\nzid: 42\n---\nAn idea.");
        write_file(&config.content_dir, "index.md", "See [the idea](42).");

        tera_build(config.clone()).run().unwrap();

        let html = fs::read_to_string(config.output_dir.join("index.html")).unwrap();
        assert!(html.contains(r#"href="/notes/idea.html""#), "{html}");
    }

    #[test]
    fn error_kinds_cover_scan_errors() {
        let err = BuildError::from(ScanError::Empty(PathBuf::from("x")));
        assert_eq!(err.kind(), ErrorKind::EmptyContent);
        let err = BuildError::from(ContentError::NotFound(PathBuf::from("x")));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn failed_staging_rename_restores_previous_output() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("www");
        write_file(&output, "index.html", "previous site");
        write_file(&output, "img/logo.png", "\u{89}PNG");
        let before = fs::read(output.join("img/logo.png")).unwrap();

        let err = publish(&tmp.path().join("no-such-staging"), &output).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(
            fs::read_to_string(output.join("index.html")).unwrap(),
            "previous site"
        );
        assert_eq!(fs::read(output.join("img/logo.png")).unwrap(), before);
        assert!(!backup_path(&output).exists());
    }

    #[test]
    fn stale_backup_from_interrupted_publish_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let backup = backup_path(&config.output_dir);
        write_file(&backup, "leftover.html", "from a crashed run");
        write_file(&config.output_dir, "old.html", "old");
        write_file(&config.content_dir, "new.md", "new");

        tera_build(config.clone()).run().unwrap();

        assert!(!backup.exists());
        assert!(config.output_dir.join("new.html").is_file());
        assert!(!config.output_dir.join("old.html").exists());
    }

    struct PageCount;

    impl PostProcessor for PageCount {
        fn name(&self) -> &str {
            "count"
        }

        fn derive_index(
            &self,
            metadata: &BuildMetadata,
        ) -> Result<Option<DerivedIndex>, PostProcessError> {
            let mut index = DerivedIndex::new();
            index.insert("pages".to_string(), metadata.pages().len().to_string());
            Ok(Some(index))
        }

        fn process(
            &self,
            html: String,
            metadata: &BuildMetadata,
        ) -> Result<String, PostProcessError> {
            let pages = metadata
                .derived("count")
                .and_then(|d| d.get("pages"))
                .cloned()
                .unwrap_or_default();
            Ok(format!("{html}<!-- {pages} pages -->"))
        }
    }

    #[test]
    fn custom_post_processor_runs_after_configured_ones() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        write_file(&config.content_dir, "a.md", "A");
        write_file(&config.content_dir, "b.md", "B");

        let mut build = tera_build(config).with_post_processor(Box::new(PageCount));
        build.run().unwrap();

        let html = fs::read_to_string(build.config().output_dir.join("a.html")).unwrap();
        assert!(html.ends_with("<!-- 2 pages -->"), "{html}");
    }

    #[test]
    fn overlapping_staging_dir_is_refused_before_touching_content() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.temp_dir = tmp.path().to_path_buf();
        write_file(&config.content_dir, "keep.md", "precious");

        let err = Build::from_config(config.clone()).err().unwrap();

        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(config.content_dir.join("keep.md").is_file());
    }
}
