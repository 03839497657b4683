use super::{
    BlockId, BlockKind, Content, PosContent, Section, Tree, parse_children, render,
    render_generic_content,
};
use crate::element::{Element, Meta};
use crate::format::{FmtOpts, format_text};
use crate::page::Page;
use crate::util::{normalize_key, strip_tags};
use crate::value::Html;

const MAX_HEADING_LEVEL: usize = 6;

// ----------------------------------------------------------------------------
// main
// ----------------------------------------------------------------------------

/// Wrap runs of top-level text in untitled sections, then parse every
/// child in document order.
pub(crate) fn parse_main(page: &mut Page, id: BlockId) {
    let content = std::mem::take(&mut page.tree.get_mut(id).content);
    let mut grouped = Vec::with_capacity(content.len());
    let mut stray: Vec<PosContent> = Vec::new();

    for pc in content {
        match &pc.content {
            Content::Block(_) => {
                wrap_stray_text(page, id, &mut stray, &mut grouped);
                grouped.push(pc);
            }
            Content::Text(text) => {
                if stray.is_empty() && text.trim().is_empty() {
                    continue;
                }
                stray.push(pc);
            }
        }
    }
    wrap_stray_text(page, id, &mut stray, &mut grouped);

    page.tree.get_mut(id).content = grouped;
    parse_children(page, id);
}

fn wrap_stray_text(
    page: &mut Page,
    main: BlockId,
    stray: &mut Vec<PosContent>,
    grouped: &mut Vec<PosContent>,
) {
    if stray.is_empty() {
        return;
    }
    let pos = stray[0].pos;
    let sec = page.tree.create("sec", "", "", Vec::new(), Some(main), pos);
    page.tree.get_mut(sec).content = std::mem::take(stray);
    grouped.push(PosContent::block(sec, pos));
}

pub(crate) fn render_main(page: &mut Page, id: BlockId, el: &mut Element) {
    el.add_meta(Meta::NeedId);
    let children: Vec<BlockId> = page.tree.get(id).child_blocks().collect();
    for child in children {
        let child_el = render(page, child);
        el.add_child(child_el);
    }
}

// ----------------------------------------------------------------------------
// sec
// ----------------------------------------------------------------------------

pub(crate) fn parse_section(page: &mut Page, id: BlockId) {
    let enable_title = page.enable_title();
    let number = page.section_count;
    page.section_count += 1;
    let is_intro = number == 0 && enable_title;

    let mut depth = 0;
    let mut current = page.tree.get(id).parent;
    while let Some(parent) = current {
        if matches!(page.tree.get(parent).kind, BlockKind::Section(_)) {
            depth += 1;
        }
        current = page.tree.get(parent).parent;
    }
    let level = if is_intro {
        1
    } else if enable_title {
        depth + 2
    } else {
        depth + 1
    };

    let block = page.tree.get(id);
    let name = block.name.clone();
    let custom_id = block.heading_id.clone();
    let scope = block.scope;
    let pos = block.open_pos;

    let title = if !name.is_empty() {
        Some(format_text(page, scope, &name, FmtOpts::at(pos)))
    } else if is_intro {
        Some(page.fmt_title()).filter(|title| !title.is_empty())
    } else {
        None
    };

    let heading_id = match &title {
        Some(_) if !custom_id.is_empty() => page.unique_heading_id(&custom_id),
        Some(title) => page.unique_heading_id(&normalize_key(strip_tags(title.as_str()).trim())),
        None => String::new(),
    };

    page.tree.get_mut(id).kind = BlockKind::Section(Section {
        level: level.min(MAX_HEADING_LEVEL) as u8,
        is_intro,
        title,
        heading_id,
    });
    parse_children(page, id);
}

pub(crate) fn render_section(page: &mut Page, id: BlockId, el: &mut Element) {
    if let BlockKind::Section(section) = &page.tree.get(id).kind {
        if let Some(title) = &section.title {
            let mut heading = Element::new(format!("h{}", section.level), "sec-title");
            if !section.heading_id.is_empty() {
                heading.set_attr("id", format!("qa-{}", section.heading_id));
            }
            heading.add_html(title.clone());
            el.add_child(heading);
        }
    }
    render_generic_content(page, id, el);
}

// ----------------------------------------------------------------------------
// p
// ----------------------------------------------------------------------------

pub(crate) fn render_paragraph(page: &mut Page, id: BlockId, el: &mut Element) {
    el.set_tag("p");
    let block = page.tree.get(id);
    let scope = block.scope;
    let content = block.content.clone();
    for pc in content {
        match pc.content {
            Content::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    let html = format_text(page, scope, text, FmtOpts::at(pc.pos));
                    el.add_html(html);
                }
            }
            Content::Block(child) => {
                let child_el = render(page, child);
                el.add_child(child_el);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// toc
// ----------------------------------------------------------------------------

/// Nested list of links to every titled section of the page.
pub(crate) fn render_toc(page: &mut Page, el: &mut Element) {
    el.set_tag("ul");
    el.add_html(Html::new("<strong>Contents</strong>"));
    for sec in sections_of(&page.tree, BlockId::MAIN) {
        toc_add(&page.tree, sec, el);
    }
}

fn sections_of(tree: &Tree, id: BlockId) -> Vec<BlockId> {
    tree.get(id)
        .child_blocks()
        .filter(|child| matches!(tree.get(*child).kind, BlockKind::Section(_)))
        .collect()
}

fn toc_add(tree: &Tree, id: BlockId, add_to: &mut Element) {
    let BlockKind::Section(section) = &tree.get(id).kind else {
        return;
    };
    let children = sections_of(tree, id);

    let title = match &section.title {
        Some(title) if !section.is_intro => title,
        _ => {
            for child in children {
                toc_add(tree, child, add_to);
            }
            return;
        }
    };

    let mut li = Element::new("li", "");
    li.add_child(
        Element::new("a", "link-internal")
            .with_attr("href", format!("#qa-{}", section.heading_id))
            .with_html(title.clone()),
    );
    if !children.is_empty() {
        let mut sub = Element::new("ul", "");
        for child in children {
            toc_add(tree, child, &mut sub);
        }
        li.add_child(sub);
    }
    add_to.add_child(li);
}
