//! Filename conventions shared by scanning, indexing and rendering.
//!
//! ## Source classification
//!
//! Files ending in `.md` or `.markdown` are *parsable*: they are split into
//! front matter and body and rendered to `.html`. Everything else is an asset
//! and copied verbatim.
//!
//! ## Display titles
//!
//! Pages without a `title` get one from their filename: the extension is
//! dropped and every run of dashes or underscores becomes one space.
//! - `my-first_post.md` → "my first post"
//! - `2024--notes__draft.markdown` → "2024 notes draft"
//!
//! ## Derived filenames
//!
//! Virtual pages produced by pagination reuse their source page's filename
//! with a marker inserted before the extension:
//! - `/blog/index.html` + `2` → `/blog/index2.html`
//! - `/tags.html` + `-rust` → `/tags-rust.html`

use std::path::Path;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Whether a path names a markdown source by extension alone.
pub fn is_parsable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|md| ext.eq_ignore_ascii_case(md))
        })
}

/// Derive a display title from a filename.
pub fn title_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut title = String::with_capacity(stem.len());
    let mut in_separator_run = false;
    for c in stem.chars() {
        if c == '-' || c == '_' {
            if !in_separator_run {
                title.push(' ');
            }
            in_separator_run = true;
        } else {
            title.push(c);
            in_separator_run = false;
        }
    }
    title.trim().to_string()
}

/// Replace a trailing `.md`/`.markdown` with `.html`. Other paths are
/// returned unchanged.
pub fn html_path(relative: &str) -> String {
    let segment_start = relative.rfind('/').map(|i| i + 1).unwrap_or(0);
    if let Some(dot) = relative[segment_start..].rfind('.') {
        let at = segment_start + dot;
        let ext = &relative[at + 1..];
        if dot > 0 && MARKDOWN_EXTENSIONS.iter().any(|md| ext.eq_ignore_ascii_case(md)) {
            return format!("{}.html", &relative[..at]);
        }
    }
    relative.to_string()
}

/// Insert `marker` before the extension of the last path segment.
///
/// Paths whose last segment has no extension get the marker appended.
pub fn insert_before_extension(path: &str, marker: &str) -> String {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let at = segment_start + dot;
            format!("{}{}{}", &path[..at], marker, &path[at..])
        }
        _ => format!("{path}{marker}"),
    }
}

const MAX_SLUG_LEN: usize = 80;

/// Sanitize a term for use in a filename.
///
/// - Replaces non-alphanumeric characters (except dashes) with dashes
/// - Collapses consecutive dashes into one
/// - Strips leading and trailing dashes
/// - Truncates to `MAX_SLUG_LEN` characters (breaks at last dash before limit)
pub fn term_slug(term: &str) -> String {
    let mut collapsed = String::with_capacity(term.len());
    let mut prev_dash = false;
    for c in term.chars() {
        if c.is_alphanumeric() {
            collapsed.push(c);
            prev_dash = false;
        } else {
            if !prev_dash {
                collapsed.push('-');
            }
            prev_dash = true;
        }
    }

    let trimmed = collapsed.trim_matches('-');

    if trimmed.chars().count() <= MAX_SLUG_LEN {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
        match truncated.rfind('-') {
            Some(pos) => truncated[..pos].to_string(),
            None => truncated,
        }
    }
}
