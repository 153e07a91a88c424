//! HTML post-processing.
//!
//! A [`PostProcessor`] transforms each page's rendered HTML after its
//! template pass, reading the metadata aggregate. Processors that need a
//! secondary index compute it once during indexing ([`derive_indices`]);
//! the aggregate is read-only by the time pages render.
//!
//! ## Zettel links
//!
//! `post_process = ["zettel"]` lets notes link to each other by numeric id:
//!
//! ```text
//! ---                          <a href="1001">see</a>
//! zid: 1001            →       <a href="/notes/idea.html">see</a>
//! ---
//! ```
//!
//! The id is read from the first of `zid`, `id`, `zettel` holding an
//! integer or a string of digits. Unknown ids are left as they are.

use crate::metadata::{BuildMetadata, DerivedIndex};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PostProcessError {
    #[error("unknown post-processor '{0}'")]
    Unknown(String),
    #[error("zettel id {id} is used by both {first} and {second}")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },
}

/// Names accepted by the `post_process` config key.
pub const KNOWN: &[&str] = &[ZettelLinks::NAME];

pub trait PostProcessor {
    fn name(&self) -> &str;

    /// Compute a derived index from the complete aggregate. Runs once per
    /// build, before any page renders.
    fn derive_index(&self, _metadata: &BuildMetadata) -> Result<Option<DerivedIndex>, PostProcessError> {
        Ok(None)
    }

    fn process(&self, html: String, metadata: &BuildMetadata) -> Result<String, PostProcessError>;
}

/// Instantiate processors from their configured names, keeping order.
pub fn from_names(names: &[String]) -> Result<Vec<Box<dyn PostProcessor>>, PostProcessError> {
    names
        .iter()
        .map(|name| match name.as_str() {
            ZettelLinks::NAME => Ok(Box::new(ZettelLinks) as Box<dyn PostProcessor>),
            other => Err(PostProcessError::Unknown(other.to_string())),
        })
        .collect()
}

/// Store every processor's derived index in the aggregate under its name.
pub fn derive_indices(
    processors: &[Box<dyn PostProcessor>],
    metadata: &mut BuildMetadata,
) -> Result<(), PostProcessError> {
    for processor in processors {
        if let Some(index) = processor.derive_index(metadata)? {
            debug!(processor = processor.name(), entries = index.len(), "derived index");
            metadata.insert_derived(processor.name(), index);
        }
    }
    Ok(())
}

/// Run the processors over one page in order.
pub fn apply(
    processors: &[Box<dyn PostProcessor>],
    html: String,
    metadata: &BuildMetadata,
) -> Result<String, PostProcessError> {
    processors
        .iter()
        .try_fold(html, |html, processor| processor.process(html, metadata))
}

/// Rewrites `href="<zettel id>"` to the path of the page carrying that id.
pub struct ZettelLinks;

impl ZettelLinks {
    pub const NAME: &'static str = "zettel";
    const ID_KEYS: &'static [&'static str] = &["zid", "id", "zettel"];
}

static ZETTEL_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*"(\d+)""#).expect("zettel href pattern is valid")
});

fn zettel_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_u64().map(|id| id.to_string()),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            Some(s.clone())
        }
        _ => None,
    }
}

impl PostProcessor for ZettelLinks {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn derive_index(&self, metadata: &BuildMetadata) -> Result<Option<DerivedIndex>, PostProcessError> {
        let mut index = DerivedIndex::new();
        for page in metadata.pages() {
            let Some(id) = Self::ID_KEYS
                .iter()
                .find_map(|key| page.meta.get(*key).and_then(zettel_id))
            else {
                continue;
            };
            if let Some(first) = index.get(&id) {
                return Err(PostProcessError::DuplicateId {
                    id,
                    first: first.clone(),
                    second: page.path.clone(),
                });
            }
            index.insert(id, page.path.clone());
        }
        Ok(Some(index))
    }

    fn process(&self, html: String, metadata: &BuildMetadata) -> Result<String, PostProcessError> {
        let Some(index) = metadata.derived(Self::NAME).filter(|i| !i.is_empty()) else {
            return Ok(html);
        };
        let rewritten = ZETTEL_HREF.replace_all(&html, |caps: &Captures| match index.get(&caps[1]) {
            Some(path) => format!("href=\"{path}\""),
            None => caps[0].to_string(),
        });
        Ok(rewritten.into_owned())
    }
}
