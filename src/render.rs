//! Template rendering.
//!
//! Pages render in two passes over the same context:
//!
//! ```text
//! 1. body      → render_string()        template directives inside markdown
//! 2. markdown  → _content.html          `{{ current_page.content | markdown }}`
//! 3. html      → <page template>        meta.template or default_template
//! ```
//!
//! Pass 1 lets authors use `pages`, `index` and `config` inside article
//! bodies. The result of each pass is stored back into
//! `current_page.content` before the next one runs.
//!
//! ## Context
//!
//! ```text
//! current_page   { meta, path, content, pagination? }
//! config         the site configuration
//! pages          path → { meta, path }, newest first
//! index          key → term → [paths]
//! derived        post-processor name → derived index
//! ```
//!
//! ## Templates
//!
//! Built-in templates are compiled into the binary. Every file under the
//! configured template directory is loaded after them, so a user template
//! replaces a built-in with the same name. Autoescaping is off: page content
//! is HTML by construction. Undefined variables are errors.

use crate::config::SiteConfig;
use crate::metadata::BuildMetadata;
use crate::paginate::{PageVariant, Pagination};
use crate::types::Meta;
use pulldown_cmark::{Options, Parser, html as md_html};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template '{name}' references an undefined variable: {message}")]
    MissingVariable { name: String, message: String },
    #[error("template '{name}' failed: {message}")]
    Template { name: String, message: String },
    #[error("failed to load templates from {dir}: {message}")]
    Load { dir: PathBuf, message: String },
}

/// Name of the built-in template that converts page markdown to HTML.
pub const CONTENT_TEMPLATE: &str = "_content.html";
/// Name used in errors for the in-body directive pass.
pub const BODY_TEMPLATE: &str = "<page body>";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("default.html", include_str!("../templates/default.html")),
    (CONTENT_TEMPLATE, include_str!("../templates/_content.html")),
];

/// The template engine seam.
pub trait Renderer {
    /// Render a named template.
    fn render(&self, name: &str, context: &Context) -> Result<String, RenderError>;

    /// Render template text that is not a named template (a page body).
    fn render_string(&mut self, text: &str, context: &Context) -> Result<String, RenderError>;
}

/// [`Renderer`] backed by Tera.
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Built-in templates, overridden by every file under `template_dir`.
    ///
    /// A missing directory is not an error.
    pub fn new(template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let user_templates = match template_dir {
            Some(dir) if dir.is_dir() => collect_templates(dir)?,
            _ => Vec::new(),
        };
        let mut tera = base_engine().map_err(|e| RenderError::Load {
            dir: PathBuf::from("<built-in>"),
            message: error_chain(&e),
        })?;
        if let Some(dir) = template_dir.filter(|_| !user_templates.is_empty()) {
            debug!(dir = %dir.display(), count = user_templates.len(), "loading user templates");
            tera.add_template_files(user_templates)
                .map_err(|e| RenderError::Load {
                    dir: dir.to_path_buf(),
                    message: error_chain(&e),
                })?;
        }
        Ok(Self { tera })
    }

    /// Built-in templates plus in-memory templates (name, source).
    pub fn from_templates(templates: &[(&str, &str)]) -> Result<Self, RenderError> {
        let mut tera = base_engine().map_err(|e| RenderError::Load {
            dir: PathBuf::from("<built-in>"),
            message: error_chain(&e),
        })?;
        tera.add_raw_templates(templates.to_vec())
            .map_err(|e| RenderError::Load {
                dir: PathBuf::from("<memory>"),
                message: error_chain(&e),
            })?;
        Ok(Self { tera })
    }
}

impl Renderer for TeraRenderer {
    fn render(&self, name: &str, context: &Context) -> Result<String, RenderError> {
        self.tera
            .render(name, context)
            .map_err(|e| classify(name, &e))
    }

    fn render_string(&mut self, text: &str, context: &Context) -> Result<String, RenderError> {
        self.tera
            .render_str(text, context)
            .map_err(|e| classify(BODY_TEMPLATE, &e))
    }
}

fn base_engine() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.register_filter("markdown", markdown_filter);
    tera.register_filter("regex_replace", regex_replace_filter);
    tera.add_raw_templates(BUILTIN_TEMPLATES.to_vec())?;
    Ok(tera)
}

/// Every regular file under `dir`, named by its `/`-separated relative path.
fn collect_templates(dir: &Path) -> Result<Vec<(PathBuf, Option<String>)>, RenderError> {
    let mut templates = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| RenderError::Load {
            dir: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        templates.push((entry.path().to_path_buf(), Some(name)));
    }
    Ok(templates)
}

/// Flatten a Tera error and its sources into one diagnosable message.
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn classify(name: &str, err: &tera::Error) -> RenderError {
    let message = error_chain(err);
    if message.contains("not found in context") {
        RenderError::MissingVariable {
            name: name.to_string(),
            message,
        }
    } else {
        RenderError::Template {
            name: name.to_string(),
            message,
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// CommonMark plus tables, footnotes, strikethrough and task lists.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(text, options);
    let mut html = String::with_capacity(text.len() * 3 / 2);
    md_html::push_html(&mut html, parser);
    html
}

fn markdown_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::String(text) => Ok(Value::String(markdown_to_html(text))),
        Value::Null => Ok(Value::String(String::new())),
        other => Err(tera::Error::msg(format!(
            "markdown filter expects a string, got {other}"
        ))),
    }
}

/// `{{ text | regex_replace(pattern="\d+", replacement="#") }}`
fn regex_replace_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("regex_replace filter expects a string"))?;
    let pattern = args
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("regex_replace requires a `pattern` argument"))?;
    let replacement = args
        .get("replacement")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let regex = Regex::new(pattern)
        .map_err(|e| tera::Error::msg(format!("regex_replace pattern '{pattern}': {e}")))?;
    Ok(Value::String(
        regex.replace_all(text, replacement).into_owned(),
    ))
}

// ============================================================================
// Page rendering
// ============================================================================

/// `current_page` as templates see it.
#[derive(Debug, Serialize)]
pub struct CurrentPage<'a> {
    pub meta: &'a Meta,
    pub path: &'a str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<&'a Pagination>,
}

/// The context shared by every page of a run: `config` and the metadata
/// aggregate. Built once before processing starts.
pub fn base_context(config: &SiteConfig, metadata: &BuildMetadata) -> Result<Context, RenderError> {
    let mut context = Context::from_serialize(metadata).map_err(|e| RenderError::Template {
        name: "<context>".to_string(),
        message: error_chain(&e),
    })?;
    context.insert("config", config);
    Ok(context)
}

/// Render one page variant through both passes and its page template.
pub fn render_page(
    renderer: &mut dyn Renderer,
    base: &Context,
    variant: &PageVariant,
    body: &str,
    template: &str,
) -> Result<String, RenderError> {
    let mut page = CurrentPage {
        meta: &variant.meta,
        path: &variant.path,
        content: body.to_string(),
        pagination: variant.pagination.as_ref(),
    };
    let mut context = base.clone();
    context.insert("current_page", &page);

    page.content = renderer.render_string(body, &context)?;
    context.insert("current_page", &page);

    page.content = renderer.render(CONTENT_TEMPLATE, &context)?;
    context.insert("current_page", &page);

    renderer.render(template, &context)
}
