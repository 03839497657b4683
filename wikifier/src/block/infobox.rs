//! Tabular map renderings: `infobox{}`, `infosec{}` and `history{}`.

use super::map::{MapEntry, parse_map};
use super::{BlockId, BlockKind, render, value_nodes};
use crate::element::{Element, Meta, Node};
use crate::format::{FmtOpts, format_text};
use crate::page::Page;
use crate::value::{Html, Value};

enum Row {
    Infosec(Element),
    Pair {
        key_title: String,
        nodes: Vec<Node>,
        is_title: bool,
    },
}

fn entries_of(page: &Page, id: BlockId) -> Vec<MapEntry> {
    page.tree
        .get(id)
        .kind
        .map()
        .map(|map| map.iter().cloned().collect())
        .unwrap_or_default()
}

fn formatted_name(page: &mut Page, id: BlockId) -> Option<Html> {
    let block = page.tree.get(id);
    if block.name.is_empty() {
        return None;
    }
    let (name, scope, pos) = (block.name.clone(), block.scope, block.open_pos);
    Some(format_text(page, scope, &name, FmtOpts::at(pos)))
}

pub(crate) fn render_infobox(page: &mut Page, id: BlockId, el: &mut Element) {
    el.set_tag("table");
    if let Some(title) = formatted_name(page, id) {
        let th = Element::new("th", "").with_attr("colspan", "2").with_html(title);
        el.add_child(Element::new("tr", "infobox-title").with_child(th));
    }
    let entries = entries_of(page, id);
    add_rows(page, id, el, entries, None);
}

pub(crate) fn parse_infosec(page: &mut Page, id: BlockId) {
    parse_map(page, id);
    let block = page.tree.get(id);
    let in_infobox = block
        .parent
        .is_some_and(|parent| matches!(page.tree.get(parent).kind, BlockKind::Infobox(_)));
    if !in_infobox {
        let pos = block.open_pos;
        page.warn(pos, "infosec{} outside of infobox{} does nothing");
    }
}

/// An infosec renders as a bare run of rows for its enclosing table.
pub(crate) fn render_infosec(page: &mut Page, id: BlockId, el: &mut Element) {
    el.add_meta(Meta::NoTags);
    el.add_meta(Meta::Infosec);
    let block = page.tree.get(id);
    let in_infobox = block
        .parent
        .is_some_and(|parent| matches!(page.tree.get(parent).kind, BlockKind::Infobox(_)));
    if !in_infobox {
        el.add_meta(Meta::Invisible);
        return;
    }
    let title = formatted_name(page, id);
    let entries = entries_of(page, id);
    add_rows(page, id, el, entries, title);
}

fn add_rows(page: &mut Page, owner: BlockId, table: &mut Element, entries: Vec<MapEntry>, title: Option<Html>) {
    let scope = page.tree.get(owner).scope;
    let owner_pos = page.tree.get(owner).open_pos;

    let mut rows = Vec::with_capacity(entries.len() + 1);
    if let Some(title) = title {
        rows.push(Row::Pair {
            key_title: String::new(),
            nodes: vec![Node::Html(title)],
            is_title: true,
        });
    }
    for entry in entries {
        if let Value::Block(child) = entry.value {
            if matches!(page.tree.get(child).kind, BlockKind::Infosec(_)) {
                if !entry.key_title.is_empty() {
                    page.warn(owner_pos, "Key associated with infosec{} ignored");
                }
                rows.push(Row::Infosec(render(page, child)));
                continue;
            }
        }
        let nodes = value_nodes(page, scope, &entry.value, entry.pos);
        rows.push(Row::Pair {
            key_title: entry.key_title,
            nodes,
            is_title: false,
        });
    }

    let has_title = matches!(rows.first(), Some(Row::Pair { is_title: true, .. }));
    let last = rows.len().saturating_sub(1);
    let next_is_infosec: Vec<bool> = (0..rows.len())
        .map(|i| matches!(rows.get(i + 1), Some(Row::Infosec(_))))
        .collect();

    for (i, row) in rows.into_iter().enumerate() {
        match row {
            Row::Infosec(rows_el) => table.add_child(rows_el),
            Row::Pair {
                key_title,
                nodes,
                is_title,
            } => {
                let mut classes = Vec::new();
                if is_title {
                    classes.push("infosec-title");
                }
                if (has_title && i == 1) || (!has_title && i == 0) {
                    classes.push("infosec-first");
                }
                if !is_title && (next_is_infosec[i] || i == last) {
                    classes.push("infosec-last");
                }
                table.add_child(pair_row(&key_title, nodes, &classes));
            }
        }
    }
}

fn pair_row(key_title: &str, nodes: Vec<Node>, classes: &[&str]) -> Element {
    let mut tr = Element::new("tr", "infobox-pair");
    if !key_title.is_empty() {
        let mut th = Element::new("th", "infobox-key").with_text(key_title);
        let mut td = Element::new("td", "infobox-value");
        td.add_nodes(nodes);
        for class in classes {
            th.add_class(*class);
            td.add_class(*class);
        }
        tr.add_child(th);
        tr.add_child(td);
        return tr;
    }
    let mut td = Element::new("td", "infobox-anon").with_attr("colspan", "2");
    td.add_nodes(nodes);
    for class in classes {
        td.add_class(*class);
    }
    tr.add_child(td);
    tr
}

pub(crate) fn render_history(page: &mut Page, id: BlockId, el: &mut Element) {
    let scope = page.tree.get(id).scope;
    let mut table = Element::new("table", "history-table");
    for entry in entries_of(page, id) {
        let mut td = Element::new("td", "history-value");
        td.add_nodes(value_nodes(page, scope, &entry.value, entry.pos));
        table.add_child(
            Element::new("tr", "history-pair")
                .with_child(Element::new("td", "history-key").with_text(entry.key_title))
                .with_child(td),
        );
    }
    el.add_child(table);
}
