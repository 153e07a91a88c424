//! Shared types used across the indexing and rendering passes.
//!
//! Front-matter metadata is arbitrary user data of mixed shape, so it is kept
//! as a [`serde_json::Value`] tagged union (string | number | boolean |
//! sequence | mapping | null) rather than a fixed schema. The same values flow
//! unchanged into the template context.

use serde::Serialize;
use serde_json::Value;

/// Metadata mapping parsed from a file's front matter.
///
/// Insertion order is preserved (`serde_json/preserve_order`), so templates
/// iterate keys in the order the author wrote them.
pub type Meta = serde_json::Map<String, Value>;

pub const KEY_TITLE: &str = "title";
pub const KEY_DATE: &str = "date";
pub const KEY_CREATED: &str = "created";
pub const KEY_MODIFIED: &str = "modified";
pub const KEY_DRAFT: &str = "draft";
pub const KEY_HIDDEN: &str = "hidden";
pub const KEY_PATH: &str = "path";
pub const KEY_TEMPLATE: &str = "template";
pub const KEY_PAGINATION: &str = "pagination";

/// The summary of a page as seen by every other page: its normalized
/// metadata plus its canonical output path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub meta: Meta,
    pub path: String,
}

impl PageSummary {
    /// Normalized `date` as a Unix timestamp (0 when not numeric).
    pub fn date(&self) -> i64 {
        timestamp_of(self.meta.get(KEY_DATE))
    }

    pub fn title(&self) -> &str {
        self.meta
            .get(KEY_TITLE)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn template(&self) -> Option<&str> {
        self.meta.get(KEY_TEMPLATE).and_then(Value::as_str)
    }

    pub fn is_hidden(&self) -> bool {
        is_truthy(self.meta.get(KEY_HIDDEN))
    }
}

/// Read a numeric timestamp out of a metadata value.
pub fn timestamp_of(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        _ => 0,
    }
}

/// Loose truthiness for flags like `draft: yes` or `hidden: 1`.
///
/// `null`, `false`, `0`, `""`, `"0"`, empty sequences and empty mappings are
/// falsy. Any other string is truthy, including `"false"` and `"no"`.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !(s.is_empty() || s == "0"),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
