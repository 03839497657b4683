use std::fmt;

use serde::Serialize;

use crate::block::BlockId;

/// A fragment of already-rendered HTML.
///
/// Plain strings are escaped when they reach the serializer; `Html` is
/// emitted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Html(String);

impl Html {
    pub fn new(html: impl Into<String>) -> Self {
        Html(html.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_html(&mut self, other: &Html) {
        self.0.push_str(&other.0);
    }
}

impl fmt::Display for Html {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Html {
    fn from(s: String) -> Self {
        Html(s)
    }
}

impl From<&str> for Html {
    fn from(s: &str) -> Self {
        Html(s.to_string())
    }
}

/// A variable, map or list value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unformatted text, escaped on output.
    Str(String),
    /// Formatted text.
    Html(Html),
    Bool(bool),
    /// A block in the owning page's tree (maps and lists included).
    Block(BlockId),
    /// Text interleaved with blocks.
    Seq(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Html(_) => "html",
            Value::Bool(_) => "boolean",
            Value::Block(_) => "block",
            Value::Seq(_) => "mixed",
        }
    }

    /// The textual content of string and HTML values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Html(h) => Some(h.as_str()),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Value::Block(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Html(h) => !h.is_empty(),
            Value::Block(_) => true,
            Value::Seq(items) => !items.is_empty(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Normalize the raw pieces of a map value, list item or variable before
/// storing them.
///
/// Strings are trimmed, empty ones dropped, and the rest passed through
/// `text` (which formats them or keeps them raw). Adjacent strings and
/// adjacent HTML fragments are merged. A single remaining value is returned
/// bare; several become a [`Value::Seq`].
pub(crate) fn fix_for_storage(
    values: Vec<Value>,
    mut text: impl FnMut(&str) -> Value,
) -> Option<Value> {
    let mut stored: Vec<Value> = Vec::new();
    for value in values {
        let value = match value {
            Value::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    continue;
                }
                text(trimmed)
            }
            other => other,
        };
        match (stored.last_mut(), value) {
            (Some(Value::Str(last)), Value::Str(s)) => last.push_str(&s),
            (Some(Value::Html(last)), Value::Html(h)) => last.push_html(&h),
            (_, value) => stored.push(value),
        }
    }
    match stored.len() {
        0 => None,
        1 => stored.pop(),
        _ => Some(Value::Seq(stored)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    #[test]
    fn storage_trims_and_drops_blank_text() {
        assert_eq!(fix_for_storage(vec![raw("  hi \n")], raw), Some(raw("hi")));
        assert_eq!(fix_for_storage(vec![raw(" \t\n")], raw), None);
        assert_eq!(fix_for_storage(Vec::new(), raw), None);
    }

    #[test]
    fn storage_merges_adjacent_strings() {
        let merged = fix_for_storage(vec![raw("a "), raw(" b")], raw);
        assert_eq!(merged, Some(raw("ab")));
    }

    #[test]
    fn storage_keeps_blocks_between_text() {
        let block = Value::Block(BlockId(4));
        let stored = fix_for_storage(vec![raw("before"), block.clone(), raw("after")], |s| {
            Value::Html(Html::new(s))
        });
        assert_eq!(
            stored,
            Some(Value::Seq(vec![
                Value::Html(Html::new("before")),
                block,
                Value::Html(Html::new("after")),
            ]))
        );
    }

    #[test]
    fn truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!raw("").is_truthy());
        assert!(raw("x").is_truthy());
    }
}
