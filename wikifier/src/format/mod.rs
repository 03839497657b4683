//! The inline formatter.
//!
//! Text outside brackets is entity-escaped. A bracketed token is resolved,
//! in order, as a static formatting code, a variable (`[@name]`,
//! `[%name]`), an entity (`[&name]`), a link (`[[text|target]]` and the
//! legacy `[!x!]`, `[~x~]`, `[$x$]` forms), a color, or inline HTML
//! (`[html:...]`). Anything else renders as nothing.

mod colors;
pub mod link;

use std::sync::LazyLock;

use regex::Regex;

use crate::page::Page;
use crate::position::Position;
use crate::scope::ScopeId;
use crate::util::escape_text;
use crate::value::{Html, Value};

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([@%])([\w.]+)$").unwrap());
static ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^&(#?\w+);?$").unwrap());
static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#([\da-f]{3,4}|[\da-f]{6}|[\da-f]{8})$").unwrap());
static OLD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([!$~]+?)(.+)([!$~]+?)$").unwrap());

const STATIC_FORMATS: &[(&str, &str)] = &[
    ("i", r#"<span style="font-style: italic;">"#),
    ("/i", "</span>"),
    ("b", r#"<span style="font-weight: bold;">"#),
    ("/b", "</span>"),
    ("s", r#"<span style="text-decoration: line-through;">"#),
    ("/s", "</span>"),
    ("c", "<code>"),
    ("/c", "</code>"),
    ("q", r#"<span style="font-style: italic;">""#),
    ("/q", r#""</span>"#),
    ("^", "<sup>"),
    ("/^", "</sup>"),
    ("v", "<sub>"),
    ("/v", "</sub>"),
    ("/", "</span>"),
    ("nl", "<br />"),
    ("br", "<br />"),
    ("--", "&ndash;"),
    ("---", "&mdash;"),
];

/// Options for one [`format_text`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FmtOpts {
    /// Where the text starts, for warnings.
    pub pos: Position,
    /// Emit plain text without entity escaping.
    pub no_entities: bool,
    /// Leave `[@var]` and `[%var]` unresolved.
    pub no_variables: bool,
}

impl FmtOpts {
    pub fn at(pos: Position) -> Self {
        FmtOpts {
            pos,
            ..FmtOpts::default()
        }
    }
}

/// Format `text` as HTML, resolving variables in `scope`.
pub fn format_text(page: &mut Page, scope: ScopeId, text: &str, opts: FmtOpts) -> Html {
    let mut out = String::new();
    let mut plain = String::new();
    let mut token = String::new();
    let mut depth = 0usize;
    let mut escaped = false;
    let mut pos = opts.pos;
    let mut token_pos = pos;

    for c in text.chars() {
        let here = pos;
        pos.advance(c);

        if escaped {
            escaped = false;
            if depth > 0 {
                token.push(c);
            } else {
                plain.push(c);
            }
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                if depth > 0 {
                    token.push(c);
                }
            }
            '[' => {
                if depth == 0 {
                    flush_plain(&mut out, &mut plain, opts);
                    token_pos = here;
                } else {
                    token.push(c);
                }
                depth += 1;
            }
            ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let html = format_token(page, scope, &token, FmtOpts { pos: token_pos, ..opts });
                    out.push_str(html.as_str());
                    token.clear();
                } else {
                    token.push(c);
                }
            }
            _ if depth > 0 => token.push(c),
            _ => plain.push(c),
        }
    }

    if depth > 0 {
        plain.push('[');
        plain.push_str(&token);
    }
    flush_plain(&mut out, &mut plain, opts);
    Html::new(out)
}

fn flush_plain(out: &mut String, plain: &mut String, opts: FmtOpts) {
    if plain.is_empty() {
        return;
    }
    if opts.no_entities {
        out.push_str(plain);
    } else {
        out.push_str(&escape_text(plain));
    }
    plain.clear();
}

fn format_token(page: &mut Page, scope: ScopeId, token: &str, opts: FmtOpts) -> Html {
    if token.is_empty() {
        return Html::default();
    }

    let lower = token.to_lowercase();
    if let Some((_, html)) = STATIC_FORMATS.iter().find(|(name, _)| *name == lower) {
        return Html::new(*html);
    }

    if let Some(caps) = VARIABLE.captures(token) {
        if opts.no_variables {
            return Html::default();
        }
        return format_variable(page, scope, &caps[1], &caps[2], opts);
    }

    if let Some(caps) = ENTITY.captures(token) {
        return Html::new(format!("&{};", &caps[1]));
    }

    if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return link::link_html(page, scope, inner, opts.pos);
    }
    if let Some(caps) = OLD_LINK.captures(token) {
        let inner = &caps[2];
        let (text, target) = match inner.rfind('|') {
            Some(pipe) => (&inner[..pipe], &inner[pipe + 1..]),
            None => (inner, inner),
        };
        let converted = match &caps[1][..1] {
            "!" => format!("{}|wp:{}", text, target),
            "~" => format!("{}|~{}", text, target),
            _ => format!("{}|{}", text, target),
        };
        return link::link_html(page, scope, &converted, opts.pos);
    }

    if let Some(color) = colors::named_color(token) {
        return Html::new(format!(r#"<span style="color: {};">"#, color));
    }
    if HEX_COLOR.is_match(token) {
        return Html::new(format!(r#"<span style="color: {};">"#, token));
    }

    if let Some(html) = token.strip_prefix("html:") {
        return Html::new(html);
    }

    page.warn(opts.pos, format!("Unknown format token [{}]", token));
    Html::default()
}

/// `[@name]` inserts a value, escaping plain strings; `[%name]` formats
/// the value as markup, without further variable expansion.
fn format_variable(page: &mut Page, scope: ScopeId, sigil: &str, name: &str, opts: FmtOpts) -> Html {
    let value = match page.try_lookup(scope, name) {
        Ok(Some(value)) => value,
        Ok(None) => {
            page.warn(opts.pos, format!("Variable @{} is not defined", name));
            return Html::default();
        }
        Err(err) => {
            page.warn(opts.pos, err.to_string());
            return Html::default();
        }
    };

    if sigil == "%" {
        return match value.as_text() {
            Some(text) => {
                let text = text.to_string();
                let nested = FmtOpts {
                    no_variables: true,
                    ..opts
                };
                format_text(page, scope, &text, nested)
            }
            None => {
                let message = format!("Variable %{} is a {}, not text", name, value.type_name());
                page.warn(opts.pos, message);
                Html::default()
            }
        };
    }

    match &value {
        Value::Str(s) => Html::new(escape_text(s)),
        Value::Html(html) => html.clone(),
        Value::Bool(b) => Html::new(b.to_string()),
        Value::Block(_) | Value::Seq(_) => {
            Html::new(escape_text(&crate::block::human_readable(&page.tree, &value)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fmt(text: &str) -> String {
        let mut page = Page::new("");
        let scope = page.tree.root_scope();
        format_text(&mut page, scope, text, FmtOpts::default()).into_string()
    }

    #[test]
    fn static_tokens() {
        assert_eq!(
            fmt("Hello [b]world[/b]."),
            r#"Hello <span style="font-weight: bold;">world</span>."#
        );
        assert_eq!(fmt("[I]x[/I]"), r#"<span style="font-style: italic;">x</span>"#);
        assert_eq!(fmt("a[--]b[---]c[nl]"), "a&ndash;b&mdash;c<br />");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(fmt("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn escaped_brackets_are_literal() {
        assert_eq!(fmt(r"\[b\] stays"), "[b] stays");
        assert_eq!(fmt(r"back\\slash"), r"back\slash");
    }

    #[test]
    fn entities_and_colors() {
        assert_eq!(fmt("[&copy;]"), "&copy;");
        assert_eq!(fmt("[&copy]"), "&copy;");
        assert_eq!(fmt("[&#169;]"), "&#169;");
        assert_eq!(fmt("[red]x[/]"), r#"<span style="color: #ff0000;">x</span>"#);
        assert_eq!(fmt("[#ABC]x[/]"), r#"<span style="color: #ABC;">x</span>"#);
        assert_eq!(fmt("[#11223344]"), r#"<span style="color: #11223344;">"#);
    }

    #[test]
    fn malformed_hex_colors_are_unknown() {
        for token in ["[#a]", "[#abcde]", "[#abcdefabc]", "[#ggg]"] {
            let mut page = Page::new("");
            let scope = page.tree.root_scope();
            let html = format_text(&mut page, scope, token, FmtOpts::default());
            assert!(html.is_empty(), "{} gave {}", token, html);
            assert_eq!(page.warnings().len(), 1, "{}", token);
        }
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        assert_eq!(fmt("a [b"), "a [b");
    }

    #[test]
    fn unknown_token_warns() {
        let mut page = Page::new("");
        let scope = page.tree.root_scope();
        let html = format_text(&mut page, scope, "x[wat]y", FmtOpts::default());
        assert_eq!(html.as_str(), "xy");
        assert_eq!(page.warnings().len(), 1);
        assert!(page.warnings()[0].message.contains("wat"));
    }

    #[test]
    fn variables() {
        let mut page = Page::new("");
        page.set("name", Value::from("<Tom>")).unwrap();
        page.set("fancy", Value::from("[b]x[/b]")).unwrap();
        let scope = page.tree.root_scope();
        let plain = format_text(&mut page, scope, "[@name]", FmtOpts::default());
        assert_eq!(plain.as_str(), "&lt;Tom&gt;");
        let formatted = format_text(&mut page, scope, "[%fancy]", FmtOpts::default());
        assert_eq!(formatted.as_str(), r#"<span style="font-weight: bold;">x</span>"#);
        let missing = format_text(&mut page, scope, "[@nope]", FmtOpts::default());
        assert!(missing.is_empty());
        assert_eq!(page.warnings().len(), 1);
    }
}
