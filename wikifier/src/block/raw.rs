//! Blocks whose content bypasses paragraph handling: `code{}`, `html{}`
//! and `fmt{}`.

use super::{BlockId, Content, render};
use crate::element::{Element, Meta};
use crate::format::{FmtOpts, format_text};
use crate::page::Page;
use crate::value::Html;

pub(crate) fn render_code(page: &mut Page, id: BlockId, el: &mut Element) {
    el.set_tag("pre");
    el.add_meta(Meta::NoIndent);
    let block = page.tree.get(id);
    if !block.name.is_empty() {
        el.add_class(format!("!language-{}", block.name.trim()));
    }
    let text: String = block
        .content
        .iter()
        .filter_map(|pc| match &pc.content {
            Content::Text(text) => Some(text.as_str()),
            Content::Block(_) => None,
        })
        .collect();
    el.add_text(text);
}

pub(crate) fn render_html(page: &mut Page, id: BlockId, el: &mut Element) {
    el.add_meta(Meta::NoTags);
    el.add_meta(Meta::NoIndent);
    for pc in page.tree.get(id).content.clone() {
        match pc.content {
            Content::Text(text) => el.add_html(Html::new(text)),
            Content::Block(child) => {
                let child_el = render(page, child);
                el.add_child(child_el);
            }
        }
    }
}

/// Formatted text without entity escaping.
pub(crate) fn render_fmt(page: &mut Page, id: BlockId, el: &mut Element) {
    el.add_meta(Meta::NoTags);
    el.add_meta(Meta::NoIndent);
    let scope = page.tree.get(id).scope;
    for pc in page.tree.get(id).content.clone() {
        match pc.content {
            Content::Text(text) => {
                let opts = FmtOpts {
                    no_entities: true,
                    ..FmtOpts::at(pc.pos)
                };
                let html = format_text(page, scope, &text, opts);
                el.add_html(html);
            }
            Content::Block(child) => {
                let child_el = render(page, child);
                el.add_child(child_el);
            }
        }
    }
}
