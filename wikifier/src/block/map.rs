//! Keyed and ordered value containers: `map{}` and `list{}`.
//!
//! Both split their text content on unescaped `;`. Maps additionally
//! switch from key to value at the first unescaped `:` of each pair.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::{BlockId, BlockKind, Content, Tree, parse, value_nodes};
use crate::element::Element;
use crate::format::{FmtOpts, format_text};
use crate::page::Page;
use crate::position::Position;
use crate::scope::ScopeId;
use crate::util::normalize_key;
use crate::value::{Value, fix_for_storage};

const BLANKS: &[char] = &[' ', '\t'];

static NUMBERED_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)_(\d+)$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    /// Key as written, empty for anonymous entries.
    pub key_title: String,
    /// Normalized, unique key.
    pub key: String,
    pub value: Value,
    pub pos: Position,
}

/// Entries of a map-like block, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    pub entries: IndexMap<String, MapEntry>,
    /// Store values as raw text instead of formatting them.
    pub no_format_values: bool,
}

impl MapData {
    pub(crate) fn unformatted() -> Self {
        MapData {
            no_format_values: true,
            ..MapData::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text).map(str::trim)
    }

    pub fn entry(&self, key: &str) -> Option<&MapEntry> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Assign a value, keeping the entry's position if it exists.
    pub(crate) fn set(&mut self, key: &str, value: Value) {
        match self.entries.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                self.entries.insert(
                    key.to_string(),
                    MapEntry {
                        key_title: key.to_string(),
                        key: key.to_string(),
                        value,
                        pos: Position::default(),
                    },
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub value: Value,
    pub pos: Position,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListData {
    /// Rendered as `ol` instead of `ul`.
    pub ordered: bool,
    pub items: Vec<ListEntry>,
}

impl ListData {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.items.iter().map(|item| &item.value)
    }
}

/// Short description of a value for warnings: strings are quoted and
/// trimmed, blocks show their type and name.
pub(crate) fn human_readable(tree: &Tree, value: &Value) -> String {
    match value {
        Value::Str(s) => format!("'{}'", s.trim()),
        Value::Html(h) => format!("'{}'", h.as_str().trim()),
        Value::Bool(b) => b.to_string(),
        Value::Block(id) => format!("Block<{}>", tree.get(*id).describe()),
        Value::Seq(items) => items
            .iter()
            .map(|item| human_readable(tree, item))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn human_readable_all(tree: &Tree, values: &[Value]) -> String {
    values
        .iter()
        .filter(|value| !matches!(value, Value::Str(s) if s.trim().is_empty()))
        .map(|value| human_readable(tree, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn next_key(key: &str) -> String {
    match NUMBERED_KEY.captures(key) {
        Some(caps) => {
            let n: u64 = caps[2].parse().unwrap_or(1);
            format!("{}_{}", &caps[1], n + 1)
        }
        None => format!("{}_2", key),
    }
}

/// Push a character onto a value buffer, extending a trailing string.
fn push_char(values: &mut Vec<Value>, add: &str) {
    match values.last_mut() {
        Some(Value::Str(last)) => last.push_str(add),
        _ => values.push(Value::Str(add.to_string())),
    }
}

/// Store a finished value: formatted HTML unless `raw`.
fn store(page: &mut Page, scope: ScopeId, values: Vec<Value>, raw: bool, pos: Position) -> Value {
    fix_for_storage(values, |text| {
        if raw {
            Value::Str(text.to_string())
        } else {
            Value::Html(format_text(page, scope, text, FmtOpts::at(pos)))
        }
    })
    .unwrap_or_else(|| Value::Str(String::new()))
}

// ----------------------------------------------------------------------------
// Map
// ----------------------------------------------------------------------------

#[derive(Default)]
struct MapParser {
    key: Option<Value>,
    values: Vec<Value>,
    escape: bool,
    in_value: bool,
    start_pos: Position,
    pos: Position,
    overwrote: Option<(Value, Value)>,
    appended: Option<Value>,
    suspicious_reported: bool,
}

impl MapParser {
    fn warn_maybe(&mut self, page: &mut Page) {
        if let Some(Value::Str(key)) = &self.key {
            if key.contains('\n') && !self.suspicious_reported {
                self.suspicious_reported = true;
                let message = format!("Suspicious key '{}'", key.trim());
                page.warn(self.pos, message);
            }
        }
        if let Some(appended) = self.appended.take() {
            let message = format!("Stray text after {} ignored", human_readable(&page.tree, &appended));
            page.warn(self.pos, message);
        }
        if let Some((old, new)) = self.overwrote.take() {
            let message = format!(
                "Overwrote {} with {}",
                human_readable(&page.tree, &old),
                human_readable(&page.tree, &new)
            );
            page.warn(self.pos, message);
        }
    }
}

pub(crate) fn parse_map(page: &mut Page, id: BlockId) {
    let block = page.tree.get(id);
    let content = block.content.clone();
    let scope = block.scope;
    let raw = block.kind.map().is_some_and(|map| map.no_format_values);

    let mut data = MapData {
        no_format_values: raw,
        ..MapData::default()
    };
    let mut p = MapParser::default();

    for pc in content {
        p.pos = pc.pos;
        if p.start_pos.is_unknown() {
            p.start_pos = pc.pos;
        }
        match pc.content {
            Content::Block(child) => {
                if p.in_value {
                    if p.values.is_empty() {
                        p.start_pos = p.pos;
                    }
                    p.values.push(Value::Block(child));
                } else {
                    if let Some(old) = p.key.take() {
                        p.overwrote = Some((old, Value::Block(child)));
                    }
                    p.key = Some(Value::Block(child));
                }
                p.warn_maybe(page);
                parse(page, child);
            }
            Content::Text(text) => {
                let mut pos = pc.pos;
                let leading = text.len() - text.trim_start_matches(BLANKS).len();
                for c in text[..leading].chars() {
                    pos.advance(c);
                }
                for c in text.trim_matches(BLANKS).chars() {
                    p.pos = pos;
                    map_char(page, scope, raw, &mut data, &mut p, c);
                    pos.advance(c);
                }
            }
        }
    }

    p.warn_maybe(page);
    let key = p
        .key
        .as_ref()
        .map(|key| human_readable(&page.tree, key))
        .unwrap_or_default();
    let value = human_readable_all(&page.tree, &p.values);
    if !value.is_empty() || p.in_value {
        page.warn(p.pos, format!("Value {} for key {} not terminated", value, key));
        page.tree.get_mut(id).unclosed = false;
    } else if !key.is_empty() {
        page.warn(p.pos, format!("Stray key {} ignored", key));
        page.tree.get_mut(id).unclosed = false;
    }

    if let Some(map) = page.tree.get_mut(id).kind.map_mut() {
        *map = data;
    }
}

fn map_char(page: &mut Page, scope: ScopeId, raw: bool, data: &mut MapData, p: &mut MapParser, c: char) {
    if c == ':' && !p.in_value && !p.escape {
        p.warn_maybe(page);
        p.in_value = true;
        return;
    }
    if c == '\\' && !p.escape {
        p.escape = true;
        return;
    }
    if c == ';' && !p.escape {
        end_pair(page, scope, raw, data, p);
        return;
    }

    let add = if p.escape && !matches!(c, ';' | ':' | '\\') {
        format!("\\{}", c)
    } else {
        c.to_string()
    };
    p.escape = false;

    if p.in_value {
        if p.values.is_empty() {
            p.start_pos = p.pos;
        }
        push_char(&mut p.values, &add);
        return;
    }

    match &mut p.key {
        None => {
            if add.trim().is_empty() {
                return;
            }
            p.start_pos = p.pos;
            p.key = Some(Value::Str(add));
        }
        Some(Value::Str(key)) => key.push_str(&add),
        Some(other) => {
            if !add.trim().is_empty() {
                p.appended = Some(other.clone());
            }
        }
    }
}

fn end_pair(page: &mut Page, scope: ScopeId, raw: bool, data: &mut MapData, p: &mut MapParser) {
    let anon = format!("anon_{}", data.len());
    let (mut key, key_title) = match p.key.take() {
        None => (anon, String::new()),
        Some(Value::Str(s)) if s.is_empty() => (anon, String::new()),
        Some(key) if !p.in_value => {
            if let Value::Str(s) = &key {
                if !s.starts_with('-') {
                    page.warn(p.pos, "Standalone text should be prefixed with ':'");
                }
            }
            p.values.push(key);
            (anon, String::new())
        }
        Some(key) => {
            let title = match &key {
                Value::Str(s) => s.trim().to_string(),
                other => human_readable(&page.tree, other),
            };
            (normalize_key(&title), title)
        }
    };

    let value = store(page, scope, std::mem::take(&mut p.values), raw, p.pos);

    let mut collided = false;
    while let Some(existing) = data.entries.get(&key) {
        collided |= existing.value != value;
        key = next_key(&key);
    }
    if collided {
        let shown = if key_title.is_empty() { &key } else { &key_title };
        page.warn(p.pos, format!("Duplicate key '{}' stored as '{}'", shown, key));
    }

    data.entries.insert(
        key.clone(),
        MapEntry {
            key_title,
            key,
            value,
            pos: p.start_pos,
        },
    );

    p.warn_maybe(page);
    p.in_value = false;
    p.suspicious_reported = false;
}

// ----------------------------------------------------------------------------
// List
// ----------------------------------------------------------------------------

pub(crate) fn parse_list(page: &mut Page, id: BlockId) {
    let block = page.tree.get(id);
    let content = block.content.clone();
    let scope = block.scope;
    let ordered = block.kind.list().is_some_and(|list| list.ordered);

    let mut items = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut escape = false;
    let mut start_pos = Position::default();
    let mut last_pos = Position::default();

    for pc in content {
        last_pos = pc.pos;
        match pc.content {
            Content::Block(child) => {
                if values.is_empty() {
                    start_pos = pc.pos;
                }
                values.push(Value::Block(child));
                parse(page, child);
            }
            Content::Text(text) => {
                let mut pos = pc.pos;
                let leading = text.len() - text.trim_start().len();
                for c in text[..leading].chars() {
                    pos.advance(c);
                }
                for c in text.trim().chars() {
                    last_pos = pos;
                    if c == '\\' && !escape {
                        escape = true;
                    } else if c == ';' && !escape {
                        let value = store(page, scope, std::mem::take(&mut values), false, start_pos);
                        items.push(ListEntry { value, pos: start_pos });
                    } else {
                        let add = if escape && c != '\\' {
                            format!("\\{}", c)
                        } else {
                            c.to_string()
                        };
                        escape = false;
                        if values.is_empty() {
                            start_pos = pos;
                        }
                        push_char(&mut values, &add);
                    }
                    pos.advance(c);
                }
            }
        }
    }

    let value = human_readable_all(&page.tree, &values);
    if !value.is_empty() {
        page.warn(last_pos, format!("Value {} not terminated", value));
        page.tree.get_mut(id).unclosed = false;
    }

    page.tree.get_mut(id).kind = BlockKind::List(ListData { ordered, items });
}

pub(crate) fn render_list(page: &mut Page, id: BlockId, el: &mut Element) {
    let block = page.tree.get(id);
    let scope = block.scope;
    let Some(list) = block.kind.list().cloned() else {
        return;
    };
    el.set_tag(if list.ordered { "ol" } else { "ul" });
    for item in &list.items {
        let mut li = Element::new("li", "list-item");
        li.add_nodes(value_nodes(page, scope, &item.value, item.pos));
        el.add_child(li);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_keys_increment() {
        assert_eq!(next_key("x"), "x_2");
        assert_eq!(next_key("x_2"), "x_3");
        assert_eq!(next_key("anon_9"), "anon_10");
        assert_eq!(next_key("_5"), "_5_2");
    }

    #[test]
    fn set_updates_in_place() {
        let mut map = MapData::default();
        map.set("a", Value::from("1"));
        map.set("b", Value::from("2"));
        map.set("a", Value::from("3"));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get_str("a"), Some("3"));
    }
}
