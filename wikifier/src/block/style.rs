//! `style{}` blocks and the page stylesheet they produce.

use indexmap::IndexMap;

use super::map::parse_map;
use super::BlockId;
use crate::page::Page;

/// One CSS rule set queued by a `style{}` block.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    /// Selector sets, each a list of items matched as descendants. The
    /// first item is always the styled block's element id.
    pub apply_to: Vec<Vec<String>>,
    pub rules: IndexMap<String, String>,
}

/// Parse the declarations and queue them against the parent element,
/// which is marked so its id is emitted as a class.
pub(crate) fn parse_style(page: &mut Page, id: BlockId) {
    parse_map(page, id);

    let block = page.tree.get(id);
    let Some(parent) = block.parent else {
        return;
    };
    let name = block.name.trim().to_string();
    let entries: Vec<_> = block
        .kind
        .map()
        .map(|map| map.iter().cloned().collect())
        .unwrap_or_default();

    let mut rules = IndexMap::new();
    for entry in entries {
        match entry.value.as_text() {
            Some(value) => {
                rules.insert(entry.key_title.clone(), value.trim().to_string());
            }
            None => page.warn(entry.pos, "non-string value to style{}"),
        }
    }

    let parent_id = page.tree.get(parent).element_id.clone();
    let mut apply_to = Vec::new();
    let mut apply_to_parent = name.is_empty();
    for matcher in name.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        if matcher == "this" {
            apply_to_parent = true;
            continue;
        }
        let mut set = vec![parent_id.clone()];
        set.extend(matcher.split_whitespace().map(|item| match item.strip_prefix('$') {
            Some(model) => format!("model-{}", model),
            None => item.to_string(),
        }));
        apply_to.push(set);
    }
    if apply_to_parent {
        apply_to.insert(0, vec![parent_id]);
    }

    page.tree.get_mut(parent).needs_id = true;
    page.styles.push(StyleRule { apply_to, rules });
}

/// Flatten queued rules into CSS text. Selectors are scoped under the
/// page's main element unless they already start there.
pub(crate) fn generate_css(main_id: &str, styles: &[StyleRule]) -> String {
    let mut css = String::new();
    for style in styles {
        let selectors: Vec<String> = style
            .apply_to
            .iter()
            .map(|set| {
                let selector = set.iter().map(|item| css_item(item)).collect::<Vec<_>>().join(" ");
                if selector.starts_with(".q-main") {
                    selector
                } else {
                    format!(".q-{} {}", main_id, selector)
                }
            })
            .collect();
        css.push_str(&selectors.join(",\n"));
        css.push_str(" {\n");
        for (rule, value) in &style.rules {
            css.push_str(&format!("    {}: {};\n", rule, value));
        }
        css.push_str("}\n");
    }
    css
}

/// `.x` becomes a user class, `#x` a user id, a bare name a block type.
fn css_item(item: &str) -> String {
    let mut out = String::new();
    let mut in_name = false;
    for c in item.chars() {
        match c {
            '.' => {
                in_name = true;
                out.push_str(".qc-");
            }
            '#' => {
                in_name = true;
                out.push_str(".qi-");
            }
            _ => {
                if !in_name && c != '*' {
                    in_name = true;
                    out.push_str(".q-");
                }
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn selector_items() {
        assert_eq!(css_item("sec-2"), ".q-sec-2");
        assert_eq!(css_item(".wide"), ".qc-wide");
        assert_eq!(css_item("#lead"), ".qi-lead");
        assert_eq!(css_item("p.wide"), ".q-p.qc-wide");
        assert_eq!(css_item("*"), "*");
    }

    #[test]
    fn scoped_under_main() {
        let mut rules = IndexMap::new();
        rules.insert("color".to_string(), "red".to_string());
        let styles = vec![StyleRule {
            apply_to: vec![vec!["sec-2".to_string()], vec!["sec-2".to_string(), "p".to_string()]],
            rules,
        }];
        assert_eq!(
            generate_css("main-1", &styles),
            ".q-main-1 .q-sec-2,\n.q-main-1 .q-sec-2 .q-p {\n    color: red;\n}\n"
        );
    }

    #[test]
    fn main_selectors_are_not_prefixed() {
        let styles = vec![StyleRule {
            apply_to: vec![vec!["main-1".to_string()]],
            rules: IndexMap::new(),
        }];
        assert_eq!(generate_css("main-1", &styles), ".q-main-1 {\n}\n");
    }
}
