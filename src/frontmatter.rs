//! Front-matter splitting.
//!
//! A content file may open with a YAML block between `---` delimiter lines:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [rust, web]
//! ---
//!
//! Body text starts here.
//! ```
//!
//! [`split`] returns the parsed mapping and the body with surrounding
//! whitespace trimmed. Text that does not open with such a block is all body,
//! with empty metadata; that is normal control flow, not an error. A block
//! that *is* present but is not a valid YAML mapping is a hard error.

use crate::types::Meta;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("invalid YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("front matter is not a mapping (found {0})")]
    NotAMapping(&'static str),
    #[error("front matter value cannot be represented: {0}")]
    Value(#[from] serde_json::Error),
}

/// Earliest `---` block at the very start of the text. `(?s)` lets `.` span
/// newlines so both the block and the body may be multi-line.
static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---\n(.+?)\n---\n\s*(.*)\z").expect("front matter pattern is valid")
});

/// Split raw file text into (metadata, body).
pub fn split(raw: &str) -> Result<(Meta, String), FrontMatterError> {
    let Some(caps) = FRONT_MATTER.captures(raw) else {
        return Ok((Meta::new(), raw.to_string()));
    };
    let meta = parse_block(&caps[1])?;
    Ok((meta, caps[2].trim().to_string()))
}

fn parse_block(block: &str) -> Result<Meta, FrontMatterError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(block)?;
    match yaml {
        // A block of only comments parses as null
        serde_yaml::Value::Null => Ok(Meta::new()),
        serde_yaml::Value::Mapping(_) => match serde_json::to_value(yaml)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(FrontMatterError::NotAMapping("non-object")),
        },
        serde_yaml::Value::Sequence(_) => Err(FrontMatterError::NotAMapping("a sequence")),
        serde_yaml::Value::Tagged(_) => Err(FrontMatterError::NotAMapping("a tagged value")),
        _ => Err(FrontMatterError::NotAMapping("a scalar")),
    }
}
