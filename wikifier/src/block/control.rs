//! `for{}` loops and `$model{}` inclusions.

use super::map::{MapData, MapEntry, parse_map};
use super::{BlockId, BlockKind, parse, render, render_generic_content, value_nodes};
use crate::element::{Element, Meta, Node};
use crate::page::{ModelInfo, Page};
use crate::value::{Html, Value};

/// Models including models stop here.
const MAX_MODEL_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    /// Variable path of the list or map iterated over.
    pub iterable: String,
    /// Name the current item is bound to inside the loop.
    pub item: String,
}

impl Default for ForLoop {
    fn default() -> Self {
        ForLoop {
            iterable: String::new(),
            item: "value".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    /// Arguments passed to the model as `@m`.
    pub map: MapData,
    pub name: String,
    /// The model's rendered output, when it could be loaded.
    pub html: Option<Html>,
}

// ----------------------------------------------------------------------------
// for
// ----------------------------------------------------------------------------

/// `for [@list as item] { ... }`
pub(crate) fn parse_for(page: &mut Page, id: BlockId) {
    let block = page.tree.get(id);
    let pos = block.open_pos;
    let expression = block.name.trim().to_string();
    let (iterable, item) = match expression.split_once(" as ") {
        Some((iterable, item)) => (iterable.trim(), item.trim()),
        None => (expression.as_str(), "value"),
    };
    let iterable = iterable.trim_start_matches('@').to_string();
    let item = item.trim_start_matches('@').to_string();

    if item.is_empty() {
        page.warn(pos, "for{} block is missing item name after 'as'");
        page.tree.get_mut(id).parse_failed = true;
        return;
    }
    if iterable.is_empty() {
        page.warn(pos, "for{} block is missing iterable name; should be for [@var]");
        page.tree.get_mut(id).parse_failed = true;
        return;
    }

    page.tree.get_mut(id).kind = BlockKind::For(ForLoop { iterable, item });

    // the body is parsed per iteration, once the item is bound
    for child in page.tree.descendants(id) {
        if matches!(page.tree.get(child).kind, BlockKind::Style(_)) {
            parse(page, child);
        }
    }
}

/// Render the loop body once per item, with the item bound in the loop's
/// own scope. The body is parsed afresh for every item.
pub(crate) fn render_for(page: &mut Page, id: BlockId, el: &mut Element) {
    el.add_meta(Meta::NoTags);
    let block = page.tree.get(id);
    let (scope, pos) = (block.scope, block.open_pos);
    let BlockKind::For(for_loop) = &block.kind else {
        return;
    };
    let ForLoop { iterable, item } = for_loop.clone();

    let items: Vec<Value> = match page.lookup(scope, &iterable) {
        Some(Value::Block(source)) => {
            let kind = &page.tree.get(source).kind;
            if let Some(list) = kind.list() {
                list.values().cloned().collect()
            } else if let Some(map) = kind.map() {
                map.iter().map(|entry| entry.value.clone()).collect()
            } else {
                page.warn(pos, format!("for{{}} iterable @{} is not a list or map", iterable));
                return;
            }
        }
        Some(other) => {
            let message = format!("for{{}} iterable @{} is a {}, not a list or map", iterable, other.type_name());
            page.warn(pos, message);
            return;
        }
        None => {
            page.warn(pos, format!("for{{}} iterable @{} is not defined", iterable));
            return;
        }
    };

    for value in items {
        page.tree.scopes.set_own(scope, item.clone(), value);
        page.tree.reset_parsed(id);
        render_generic_content(page, id, el);
    }
}

// ----------------------------------------------------------------------------
// model
// ----------------------------------------------------------------------------

/// Load the model, hand it the block's entries as `@m` and render it.
pub(crate) fn parse_model(page: &mut Page, id: BlockId) {
    parse_map(page, id);

    let block = page.tree.get(id);
    let (name, pos, scope) = (block.name.trim().to_string(), block.open_pos, block.scope);
    let entries: Vec<MapEntry> = block
        .kind
        .map()
        .map(|map| map.iter().cloned().collect())
        .unwrap_or_default();

    if page.depth >= MAX_MODEL_DEPTH {
        page.warn(pos, format!("Model ${}{{}} nested too deeply", name));
        return;
    }
    let source = page
        .model_source
        .as_ref()
        .and_then(|models| models.model_source(&name));
    let Some(source) = source else {
        page.warn(pos, format!("Model ${}{{}} does not exist", name));
        return;
    };

    let mut args = Vec::with_capacity(entries.len());
    for entry in entries {
        let nodes = value_nodes(page, scope, &entry.value, entry.pos);
        args.push((entry.key, nodes_html(nodes)));
    }

    let mut model = page.model_page(&name, source);
    model.set_model_args(args);
    if let Err(err) = model.parse() {
        page.warn(pos, format!("Model ${}{{}} error: {}", name, err.message()));
        return;
    }
    for warning in model.warnings().to_vec() {
        page.warn(pos, format!("Model ${}{{}}: {}", name, warning));
    }

    let include_tags = model.get_bool("model.tags").unwrap_or(false);
    let mut main_el = render(&mut model, BlockId::MAIN);
    main_el.add_class("model");
    main_el.add_class(format!("model-{}", name));
    main_el.set_id(name.clone());
    if !include_tags {
        main_el.add_meta(Meta::NoTags);
    }
    let html = main_el.generate();

    page.models.insert(
        name.clone(),
        ModelInfo {
            title: model.title(),
            author: model.author(),
            description: model.description(),
            file: format!("{}.model", name),
        },
    );

    if let BlockKind::Model(data) = &mut page.tree.get_mut(id).kind {
        data.name = name;
        data.html = Some(html);
    }
}

fn nodes_html(nodes: Vec<Node>) -> Html {
    let mut holder = Element::new("div", "").with_meta(Meta::NoTags);
    holder.add_nodes(nodes);
    Html::new(holder.generate().as_str().trim_end())
}

pub(crate) fn render_model(page: &mut Page, id: BlockId, el: &mut Element) {
    el.add_meta(Meta::NoTags);
    if let BlockKind::Model(data) = &page.tree.get(id).kind {
        if let Some(html) = &data.html {
            el.add_html(html.clone());
        }
    }
}
