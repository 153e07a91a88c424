//! Site configuration module.
//!
//! Handles loading, validating, and merging `folio.toml`. User values are
//! layered over stock defaults, so a config file only needs the keys it wants
//! to change. The configuration is loaded once before a build starts and is
//! read-only for the rest of the run; templates see it as `config`.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! content_dir = "content"          # Scanned recursively for pages and assets
//! output_dir = "www"               # Replaced atomically at the end of a build
//! temp_dir = ".folio-tmp"          # Staging directory, removed after each run
//! template_dir = "templates"       # User templates (override built-ins by name)
//! default_template = "default.html"
//! index = []                       # Metadata keys to build term indices for
//! exclude_files = [".DS_Store"]    # Basenames skipped during the scan
//! exclude_regex = []               # Basename patterns skipped during the scan
//! post_process = []                # Named HTML post-processors, e.g. ["zettel"]
//!
//! [index_order]                    # Per-key term order, "asc" (default) or "desc"
//! # created = "desc"
//!
//! [extra]                          # Free-form values for templates (config.extra.*)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::postprocess;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "folio.toml";

/// Direction in which the terms of one indexed key are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Site configuration loaded from `folio.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Content root, scanned recursively.
    pub content_dir: PathBuf,
    /// Published output directory.
    pub output_dir: PathBuf,
    /// Staging directory the build renders into before publishing.
    pub temp_dir: PathBuf,
    /// Directory of user templates. Missing is fine: built-ins are used.
    pub template_dir: PathBuf,
    /// Template for pages whose metadata has no `template` key.
    pub default_template: String,
    /// Metadata keys to build term indices for.
    pub index: Vec<String>,
    /// Per-key term order; keys not listed sort ascending.
    pub index_order: BTreeMap<String, SortOrder>,
    /// Exact basenames to skip while scanning.
    pub exclude_files: Vec<String>,
    /// Basename regexes to skip while scanning.
    pub exclude_regex: Vec<String>,
    /// Post-processors applied to every rendered page, in order.
    pub post_process: Vec<String>,
    /// Free-form values exposed to templates.
    pub extra: toml::Table,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("www"),
            temp_dir: PathBuf::from(".folio-tmp"),
            template_dir: PathBuf::from("templates"),
            default_template: "default.html".to_string(),
            index: Vec::new(),
            index_order: BTreeMap::new(),
            exclude_files: vec![".DS_Store".to_string()],
            exclude_regex: Vec::new(),
            post_process: Vec::new(),
            extra: toml::Table::new(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are consistent with each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, dir) in [
            ("content_dir", &self.content_dir),
            ("output_dir", &self.output_dir),
            ("temp_dir", &self.temp_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{label} must not be empty")));
            }
        }
        // Staging is wiped before a run and the output is replaced after it, so
        // neither may overlap the content or each other.
        let dirs = [
            ("content_dir", resolved(&self.content_dir)),
            ("output_dir", resolved(&self.output_dir)),
            ("temp_dir", resolved(&self.temp_dir)),
        ];
        for (i, (label_a, a)) in dirs.iter().enumerate() {
            for (label_b, b) in &dirs[i + 1..] {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(ConfigError::Validation(format!(
                        "{label_a} and {label_b} must not be the same directory or contain each other"
                    )));
                }
            }
        }
        if self.default_template.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default_template must not be empty".into(),
            ));
        }
        if let Some(key) = self.index_order.keys().find(|k| !self.index.contains(k)) {
            return Err(ConfigError::Validation(format!(
                "index_order.{key} refers to a key missing from index"
            )));
        }
        for pattern in &self.exclude_regex {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("exclude_regex '{pattern}' is invalid: {e}"))
            })?;
        }
        if let Some(name) = self
            .post_process
            .iter()
            .find(|n| !postprocess::KNOWN.contains(&n.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "unknown post-processor '{name}' (known: {})",
                postprocess::KNOWN.join(", ")
            )));
        }
        Ok(())
    }

    /// Compiled `exclude_regex` patterns. Call after [`SiteConfig::validate`].
    pub fn exclude_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.exclude_regex
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ConfigError::Validation(format!("exclude_regex '{p}' is invalid: {e}"))
                })
            })
            .collect()
    }
}

/// Absolute form of `path` with symlinks resolved as far as it exists.
fn resolved(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return missing.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file path.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the stock defaults.
pub fn load_config(config_path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(config_path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `folio.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Folio Configuration
# ===================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Relative paths are resolved against
# the working directory the build runs in.
#
# Unknown keys will cause an error.

# Content root. Every regular file below it is either rendered
# (.md / .markdown) or copied verbatim (everything else).
content_dir = "content"

# Published site. Replaced in one rename at the end of a successful build;
# left untouched when a build fails.
output_dir = "www"

# Staging directory the build renders into. Removed after every run.
temp_dir = ".folio-tmp"

# User templates. Files here override built-in templates of the same name.
template_dir = "templates"

# Template for pages without a `template` front-matter key.
default_template = "default.html"

# Front-matter keys to build term indices for (available as `index.<key>`
# in templates and usable as `pagination.data`).
index = []

# Basenames skipped while scanning content.
exclude_files = [".DS_Store"]

# Basename regular expressions skipped while scanning content.
exclude_regex = []

# HTML post-processors applied to every rendered page, in order.
# Known: "zettel" (rewrites href="<id>" to the page with that zettel id).
post_process = []

# ---------------------------------------------------------------------------
# Term order per indexed key: "asc" (default) or "desc".
# ---------------------------------------------------------------------------
[index_order]
# created = "desc"

# ---------------------------------------------------------------------------
# Free-form values for templates, available as `config.extra.<key>`.
# ---------------------------------------------------------------------------
[extra]
# site_name = "My Site"
"##
}
