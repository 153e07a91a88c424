//! CLI output formatting for builds and checks.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. Pages are listed by
//! positional index and title, with their output path shown as an indented
//! context line. Build progress follows the pipeline states so the user can
//! see where a failed run stopped.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ==> Scanning content
//! Found 12 pages, 4 assets
//! ==> Indexing metadata
//! Indexed 11 pages, 7 terms
//! ==> Rendering
//!     img/logo.png (copied)
//!     blog/first-post.md → /blog/first-post.html
//!     blog/index.md → /blog/index.html
//!         → /blog/index2.html
//!     notes/wip.md (draft, skipped)
//! ==> Publishing
//! Published → www
//! Built 12 pages from 11 sources, copied 4 assets, skipped 1 draft
//! ```
//!
//! ## Check
//!
//! ```text
//! Pages
//! 001 First Post
//!     Path: /blog/first-post.html
//!
//! Index
//! tags (2 terms)
//!     rust (2 pages)
//!     web (1 page)
//!
//! Found 12 pages, 4 assets
//! ```
//!
//! # Architecture
//!
//! Every output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::build::{BuildEvent, BuildState, BuildSummary, CheckReport};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn count(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

// ============================================================================
// Build events
// ============================================================================

fn state_header(state: BuildState) -> Option<&'static str> {
    match state {
        BuildState::Scanning => Some("==> Scanning content"),
        BuildState::Indexing => Some("==> Indexing metadata"),
        BuildState::Processing => Some("==> Rendering"),
        BuildState::Publishing => Some("==> Publishing"),
        BuildState::NotStarted
        | BuildState::Cleanup
        | BuildState::Finished
        | BuildState::Failed => None,
    }
}

/// Format one build event as display lines. Some events print nothing.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::StateChanged { to, .. } => {
            state_header(*to).map(str::to_string).into_iter().collect()
        }
        BuildEvent::FilesFound { parse, copy } => vec![format!(
            "Found {}, {}",
            count(*parse, "page", "pages"),
            count(*copy, "asset", "assets")
        )],
        BuildEvent::Indexed { pages, terms } => vec![format!(
            "Indexed {}, {}",
            count(*pages, "page", "pages"),
            count(*terms, "term", "terms")
        )],
        BuildEvent::Copied { path } => vec![format!("{}{} (copied)", indent(1), path)],
        BuildEvent::Rendered { source, outputs } => {
            let mut lines = Vec::with_capacity(outputs.len());
            let mut outputs = outputs.iter();
            match outputs.next() {
                Some(first) => lines.push(format!("{}{} → {}", indent(1), source, first)),
                None => lines.push(format!("{}{}", indent(1), source)),
            }
            for output in outputs {
                lines.push(format!("{}→ {}", indent(2), output));
            }
            lines
        }
        BuildEvent::DraftSkipped { source } => {
            vec![format!("{}{} (draft, skipped)", indent(1), source)]
        }
        BuildEvent::Published { output } => vec![format!("Published → {}", output.display())],
        BuildEvent::Failed { kind, message } => vec![format!("Build failed ({kind}): {message}")],
    }
}

pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}

/// One-line summary of a finished build.
pub fn format_build_summary(summary: &BuildSummary) -> String {
    let mut line = format!(
        "Built {} from {}, copied {}",
        count(summary.rendered, "page", "pages"),
        count(summary.pages, "source", "sources"),
        count(summary.copied, "asset", "assets"),
    );
    if summary.skipped_drafts > 0 {
        line.push_str(&format!(
            ", skipped {}",
            count(summary.skipped_drafts, "draft", "drafts")
        ));
    }
    line
}

// ============================================================================
// Check output
// ============================================================================

/// Format the result of a check: every indexed page and every term index.
pub fn format_check_output(report: &CheckReport) -> Vec<String> {
    let mut lines = Vec::new();
    let metadata = &report.metadata;

    lines.push("Pages".to_string());
    for (i, page) in metadata.pages().iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), page.title()));
        lines.push(format!("{}Path: {}", indent(1), page.path));
    }

    let mut keys = metadata.indexed_keys().peekable();
    if keys.peek().is_some() {
        lines.push(String::new());
        lines.push("Index".to_string());
        for key in keys {
            let Some(index) = metadata.term_index(key) else {
                continue;
            };
            lines.push(format!("{} ({})", key, count(index.len(), "term", "terms")));
            for (term, paths) in index.terms() {
                lines.push(format!(
                    "{}{} ({})",
                    indent(1),
                    term,
                    count(paths.len(), "page", "pages")
                ));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Found {}, {}",
        count(report.parse_files, "page", "pages"),
        count(report.copy_files, "asset", "assets")
    ));
    lines
}

pub fn print_check_output(report: &CheckReport) {
    for line in format_check_output(report) {
        println!("{}", line);
    }
}
