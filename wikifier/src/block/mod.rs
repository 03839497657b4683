//! The block tree.
//!
//! Blocks live in an arena owned by the page ([`Tree`]) and refer to each
//! other through [`BlockId`] handles. Each block carries its positional
//! content, a [`BlockKind`] holding the data its `parse` step derives,
//! and the flags that drive rendering.

mod content;
mod control;
mod image;
mod infobox;
mod map;
mod raw;
mod style;

use std::collections::HashMap;

use crate::element::{Element, Meta, Node};
use crate::format::{FmtOpts, format_text};
use crate::page::Page;
use crate::position::Position;
use crate::scope::{ScopeId, Scopes};
use crate::value::{Html, Value};

pub use control::{ForLoop, ModelData};
pub use image::{GalleryData, GalleryImage, ImageData};
pub use map::{ListData, ListEntry, MapData, MapEntry};
pub use style::StyleRule;

pub(crate) use map::human_readable;
pub(crate) use style::generate_css;

// ----------------------------------------------------------------------------
// Handles and content
// ----------------------------------------------------------------------------

/// Handle to a block in its page's [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// The synthetic root block of every page.
    pub const MAIN: BlockId = BlockId(0);
}

/// One item of a block's positional content.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Block(BlockId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PosContent {
    pub content: Content,
    pub pos: Position,
}

impl PosContent {
    pub fn text(text: impl Into<String>, pos: Position) -> Self {
        PosContent {
            content: Content::Text(text.into()),
            pos,
        }
    }

    pub fn block(id: BlockId, pos: Position) -> Self {
        PosContent {
            content: Content::Block(id),
            pos,
        }
    }
}

/// Append text, merging it into a trailing text item.
pub(crate) fn push_text(content: &mut Vec<PosContent>, text: &str, pos: Position) {
    if let Some(PosContent {
        content: Content::Text(last),
        ..
    }) = content.last_mut()
    {
        last.push_str(text);
        return;
    }
    content.push(PosContent::text(text, pos));
}

/// Append items one at a time so adjacent text still merges.
pub(crate) fn push_all(content: &mut Vec<PosContent>, items: Vec<PosContent>) {
    for item in items {
        match item.content {
            Content::Text(text) => push_text(content, &text, item.pos),
            Content::Block(_) => content.push(item),
        }
    }
}

// ----------------------------------------------------------------------------
// Block kinds
// ----------------------------------------------------------------------------

/// Derived data of a section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    /// Heading level, 1 through 6.
    pub level: u8,
    /// The first section of a titled page.
    pub is_intro: bool,
    pub title: Option<Html>,
    /// Anchor, without the `qa-` prefix.
    pub heading_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditional {
    If,
    Elsif,
    Else,
}

/// The variant of a block, with whatever its parse step derived.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Main,
    Section(Section),
    Paragraph,
    Map(MapData),
    List(ListData),
    Infobox(MapData),
    Infosec(MapData),
    History(MapData),
    Image(Box<ImageData>),
    Gallery(GalleryData),
    Style(MapData),
    Toc,
    For(ForLoop),
    Code,
    Html,
    Fmt,
    Model(ModelData),
    Clear,
    Invisible,
    /// Consumed by the lexer when it closes; never reaches the tree.
    Conditional(Conditional),
    /// `{@name}`, replaced by the named block when it closes.
    Variable,
    Unknown(String),
}

const ALIASES: &[(&str, &str)] = &[
    ("section", "sec"),
    ("paragraph", "p"),
    ("hash", "map"),
    ("format", "fmt"),
    ("olist", "numlist"),
    ("ulist", "list"),
];

/// Resolve a block type alias to its canonical name.
pub fn canonical_type(typ: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == typ)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(typ)
}

impl BlockKind {
    /// The variant for a canonical block type.
    pub fn for_type(typ: &str) -> BlockKind {
        match typ {
            "main" => BlockKind::Main,
            "sec" => BlockKind::Section(Section::default()),
            "p" => BlockKind::Paragraph,
            "map" => BlockKind::Map(MapData::default()),
            "list" => BlockKind::List(ListData::default()),
            "numlist" => BlockKind::List(ListData {
                ordered: true,
                ..ListData::default()
            }),
            "infobox" => BlockKind::Infobox(MapData::default()),
            "infosec" => BlockKind::Infosec(MapData::default()),
            "history" => BlockKind::History(MapData::default()),
            "image" => BlockKind::Image(Box::default()),
            "imagebox" => BlockKind::Image(Box::new(ImageData {
                boxed: true,
                ..ImageData::default()
            })),
            "gallery" => BlockKind::Gallery(GalleryData::default()),
            "style" => BlockKind::Style(MapData::unformatted()),
            "toc" => BlockKind::Toc,
            "for" => BlockKind::For(ForLoop::default()),
            "code" => BlockKind::Code,
            "html" => BlockKind::Html,
            "fmt" => BlockKind::Fmt,
            "model" => BlockKind::Model(ModelData::default()),
            "clear" => BlockKind::Clear,
            "invisible" => BlockKind::Invisible,
            "if" => BlockKind::Conditional(Conditional::If),
            "elsif" => BlockKind::Conditional(Conditional::Elsif),
            "else" => BlockKind::Conditional(Conditional::Else),
            "variable" => BlockKind::Variable,
            other => BlockKind::Unknown(other.to_string()),
        }
    }

    /// Keyed entries of map-like blocks.
    pub fn map(&self) -> Option<&MapData> {
        match self {
            BlockKind::Map(map)
            | BlockKind::Infobox(map)
            | BlockKind::Infosec(map)
            | BlockKind::History(map)
            | BlockKind::Style(map) => Some(map),
            BlockKind::Model(model) => Some(&model.map),
            BlockKind::Image(image) => Some(&image.map),
            BlockKind::Gallery(gallery) => Some(&gallery.map),
            _ => None,
        }
    }

    pub(crate) fn map_mut(&mut self) -> Option<&mut MapData> {
        match self {
            BlockKind::Map(map)
            | BlockKind::Infobox(map)
            | BlockKind::Infosec(map)
            | BlockKind::History(map)
            | BlockKind::Style(map) => Some(map),
            BlockKind::Model(model) => Some(&mut model.map),
            BlockKind::Image(image) => Some(&mut image.map),
            BlockKind::Gallery(gallery) => Some(&mut gallery.map),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&ListData> {
        match self {
            BlockKind::List(list) => Some(list),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Blocks and the tree
// ----------------------------------------------------------------------------

/// A node of the block tree.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) typ: String,
    pub(crate) name: String,
    pub(crate) heading_id: String,
    pub(crate) classes: Vec<String>,
    pub(crate) open_pos: Position,
    pub(crate) close_pos: Position,
    pub(crate) parent: Option<BlockId>,
    pub(crate) content: Vec<PosContent>,
    pub(crate) scope: ScopeId,
    pub(crate) element_id: String,
    pub(crate) kind: BlockKind,
    pub(crate) parsed: bool,
    pub(crate) parse_failed: bool,
    /// Force-closed at end of input and not yet reported.
    pub(crate) unclosed: bool,
    pub(crate) needs_id: bool,
}

impl Block {
    pub fn block_type(&self) -> &str {
        &self.typ
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn open_pos(&self) -> Position {
        self.open_pos
    }

    pub fn close_pos(&self) -> Position {
        self.close_pos
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub fn content(&self) -> &[PosContent] {
        &self.content
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    /// Page-unique id of the block's element, such as `sec-3`.
    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    pub fn parse_failed(&self) -> bool {
        self.parse_failed
    }

    /// Child blocks in content order.
    pub fn child_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.content.iter().filter_map(|pc| match pc.content {
            Content::Block(id) => Some(id),
            Content::Text(_) => None,
        })
    }

    /// `type[name]{}` for messages.
    pub fn describe(&self) -> String {
        if self.name.is_empty() {
            format!("{}{{}}", self.typ)
        } else {
            format!("{}[{}]{{}}", self.typ, self.name)
        }
    }
}

/// Arena of a page's blocks and variable scopes.
#[derive(Debug)]
pub struct Tree {
    blocks: Vec<Block>,
    pub(crate) scopes: Scopes,
    element_counters: HashMap<String, usize>,
}

impl Tree {
    /// A tree holding only the main block and the page scope.
    pub(crate) fn new() -> Self {
        let mut tree = Tree {
            blocks: Vec::new(),
            scopes: Scopes::default(),
            element_counters: HashMap::new(),
        };
        tree.create("main", "", "", Vec::new(), None, Position::default());
        tree
    }

    pub(crate) fn create(
        &mut self,
        typ: &str,
        name: &str,
        heading_id: &str,
        classes: Vec<String>,
        parent: Option<BlockId>,
        pos: Position,
    ) -> BlockId {
        let typ = canonical_type(typ).to_string();
        let kind = BlockKind::for_type(&typ);
        let parent_scope = parent.map(|p| self.get(p).scope);
        let scope = match (&kind, parent_scope) {
            (BlockKind::For(_), _) | (_, None) => self.scopes.create(parent_scope),
            (_, Some(scope)) => scope,
        };

        let counter = self.element_counters.entry(typ.clone()).or_insert(0);
        *counter += 1;
        let element_id = format!("{}-{}", typ, counter);

        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            typ,
            name: name.to_string(),
            heading_id: heading_id.to_string(),
            classes,
            open_pos: pos,
            close_pos: pos,
            parent,
            content: Vec::new(),
            scope,
            element_id,
            kind,
            parsed: false,
            parse_failed: false,
            unclosed: false,
            needs_id: false,
        });
        id
    }

    pub fn get(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every block below `id` in the content tree, depth first.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut found = Vec::new();
        let mut stack: Vec<BlockId> = self.get(id).child_blocks().collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            found.push(next);
            let first = stack.len();
            stack.extend(self.get(next).child_blocks());
            stack[first..].reverse();
        }
        found
    }

    /// Return the blocks below `id` to their unparsed state so the next
    /// render parses them again. Style rules are collected once and kept,
    /// as are maps built by variable assignment rather than from source.
    pub(crate) fn reset_parsed(&mut self, id: BlockId) {
        for child in self.descendants(id) {
            let block = self.get_mut(child);
            if matches!(block.kind, BlockKind::Style(_)) || block.open_pos.is_unknown() {
                continue;
            }
            block.kind = BlockKind::for_type(&block.typ);
            block.parsed = false;
            block.parse_failed = false;
        }
    }

    pub fn root_scope(&self) -> ScopeId {
        self.get(BlockId::MAIN).scope
    }

    /// Nearest ancestor (excluding `id`) matching `pred`.
    pub fn ancestor(&self, id: BlockId, pred: impl Fn(&Block) -> bool) -> Option<BlockId> {
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            if pred(self.get(parent)) {
                return Some(parent);
            }
            current = self.get(parent).parent;
        }
        None
    }

    /// Indented outline of the tree below `id`, one block per line.
    pub fn hierarchy(&self, id: BlockId) -> String {
        let mut out = String::new();
        self.write_hierarchy(id, 0, &mut out);
        out
    }

    fn write_hierarchy(&self, id: BlockId, depth: usize, out: &mut String) {
        let block = self.get(id);
        out.push_str(&"    ".repeat(depth));
        out.push_str(&block.describe());
        if !block.open_pos.is_unknown() {
            out.push_str(&format!(" @ {}", block.open_pos));
        }
        out.push('\n');
        for child in block.child_blocks() {
            self.write_hierarchy(child, depth + 1, out);
        }
    }
}

// ----------------------------------------------------------------------------
// Parse and render dispatch
// ----------------------------------------------------------------------------

/// Parse a block and, through it, its children. A second call is a no-op.
pub(crate) fn parse(page: &mut Page, id: BlockId) {
    {
        let block = page.tree.get_mut(id);
        if block.parsed {
            return;
        }
        block.parsed = true;
    }

    match page.tree.get(id).kind {
        BlockKind::Main => content::parse_main(page, id),
        BlockKind::Section(_) => content::parse_section(page, id),
        BlockKind::Map(_) | BlockKind::Infobox(_) | BlockKind::History(_) => {
            map::parse_map(page, id)
        }
        BlockKind::Infosec(_) => infobox::parse_infosec(page, id),
        BlockKind::List(_) => map::parse_list(page, id),
        BlockKind::Image(_) => image::parse_image(page, id),
        BlockKind::Gallery(_) => image::parse_gallery(page, id),
        BlockKind::Style(_) => style::parse_style(page, id),
        BlockKind::For(_) => control::parse_for(page, id),
        BlockKind::Model(_) => control::parse_model(page, id),
        BlockKind::Unknown(_) => {
            let block = page.tree.get(id);
            let message = format!("Unknown block type {}", block.describe());
            let pos = block.open_pos;
            page.warn(pos, message);
            parse_children(page, id);
        }
        BlockKind::Paragraph
        | BlockKind::Toc
        | BlockKind::Code
        | BlockKind::Html
        | BlockKind::Fmt
        | BlockKind::Clear
        | BlockKind::Invisible
        | BlockKind::Conditional(_)
        | BlockKind::Variable => parse_children(page, id),
    }

    let block = page.tree.get_mut(id);
    if block.unclosed {
        block.unclosed = false;
        let message = format!("{} not closed before end of input", block.describe());
        let pos = block.open_pos;
        page.warn(pos, message);
    }
}

pub(crate) fn parse_children(page: &mut Page, id: BlockId) {
    let children: Vec<BlockId> = page.tree.get(id).child_blocks().collect();
    for child in children {
        parse(page, child);
    }
}

/// The element every block starts from: a `div` carrying the block's
/// type class, element id and user classes.
fn base_element(block: &Block) -> Element {
    let mut el = Element::new("div", block.typ.clone());
    el.set_id(block.element_id.clone());
    for class in &block.classes {
        el.add_class(format!("!qc-{}", class));
    }
    if block.needs_id {
        el.add_meta(Meta::NeedId);
    }
    el
}

/// Render a block into a fresh element.
///
/// Every call builds a new element, so a block rendered more than once
/// (inside a `for{}`) never shares output with an earlier rendering.
pub(crate) fn render(page: &mut Page, id: BlockId) -> Element {
    parse(page, id);
    let mut el = base_element(page.tree.get(id));
    if page.tree.get(id).parse_failed {
        el.add_meta(Meta::Invisible);
        return el;
    }

    match page.tree.get(id).kind {
        BlockKind::Main => content::render_main(page, id, &mut el),
        BlockKind::Section(_) => content::render_section(page, id, &mut el),
        BlockKind::Paragraph => content::render_paragraph(page, id, &mut el),
        BlockKind::Toc => content::render_toc(page, &mut el),
        BlockKind::Map(_) => el.add_meta(Meta::Invisible),
        BlockKind::List(_) => map::render_list(page, id, &mut el),
        BlockKind::Infobox(_) => infobox::render_infobox(page, id, &mut el),
        BlockKind::Infosec(_) => infobox::render_infosec(page, id, &mut el),
        BlockKind::History(_) => infobox::render_history(page, id, &mut el),
        BlockKind::Image(_) => image::render_image(page, id, &mut el),
        BlockKind::Gallery(_) => image::render_gallery(page, id, &mut el),
        BlockKind::For(_) => control::render_for(page, id, &mut el),
        BlockKind::Model(_) => control::render_model(page, id, &mut el),
        BlockKind::Code => raw::render_code(page, id, &mut el),
        BlockKind::Html => raw::render_html(page, id, &mut el),
        BlockKind::Fmt => raw::render_fmt(page, id, &mut el),
        BlockKind::Clear => {}
        BlockKind::Style(_)
        | BlockKind::Invisible
        | BlockKind::Conditional(_)
        | BlockKind::Variable
        | BlockKind::Unknown(_) => el.add_meta(Meta::Invisible),
    }
    el
}

// ----------------------------------------------------------------------------
// Shared rendering helpers
// ----------------------------------------------------------------------------

/// Render a stored value: strings are formatted in `scope`, blocks are
/// rendered, sequences are flattened.
pub(crate) fn value_nodes(page: &mut Page, scope: ScopeId, value: &Value, pos: Position) -> Vec<Node> {
    match value {
        Value::Str(s) => vec![Node::Html(format_text(page, scope, s, FmtOpts::at(pos)))],
        Value::Html(html) => vec![Node::Html(html.clone())],
        Value::Bool(b) => vec![Node::Text(b.to_string())],
        Value::Block(id) => vec![Node::Element(render(page, *id))],
        Value::Seq(items) => items
            .iter()
            .flat_map(|item| value_nodes(page, scope, item, pos))
            .collect(),
    }
}

/// Render mixed content: runs of text become paragraphs, split at blank
/// lines, and child blocks are rendered in place.
pub(crate) fn render_generic_content(page: &mut Page, id: BlockId, el: &mut Element) {
    let content = page.tree.get(id).content.clone();
    let mut buffer: Vec<PosContent> = Vec::new();

    for pc in content {
        match pc.content {
            Content::Block(child) => {
                flush_paragraph(page, id, el, &mut buffer);
                let child_el = render(page, child);
                el.add_child(child_el);
            }
            Content::Text(text) => {
                let mut pos = pc.pos;
                let mut current = String::new();
                let mut current_pos = pos;
                for line in text.split_inclusive('\n') {
                    if line.trim().is_empty() {
                        if !current.is_empty() {
                            buffer.push(PosContent::text(std::mem::take(&mut current), current_pos));
                        }
                        flush_paragraph(page, id, el, &mut buffer);
                    } else {
                        if current.is_empty() {
                            current_pos = pos;
                        }
                        current.push_str(line);
                    }
                    pos = Position::new(pos.line + 1, 1);
                }
                if !current.is_empty() {
                    buffer.push(PosContent::text(current, current_pos));
                }
            }
        }
    }
    flush_paragraph(page, id, el, &mut buffer);
}

fn flush_paragraph(page: &mut Page, parent: BlockId, el: &mut Element, buffer: &mut Vec<PosContent>) {
    if buffer.is_empty() {
        return;
    }
    let pos = buffer[0].pos;
    let p = page.tree.create("p", "", "", Vec::new(), Some(parent), pos);
    page.tree.get_mut(p).content = std::mem::take(buffer);
    let p_el = render(page, p);
    el.add_child(p_el);
}
