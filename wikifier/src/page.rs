//! A single document: source in, block tree, HTML and CSS out.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::block::{self, BlockId, StyleRule, Tree};
use crate::error::{ParseError, VarError};
use crate::format::link::parse_link;
use crate::format::{FmtOpts, format_text};
use crate::host::{ImageSizer, LinkResolver, ModelSource};
use crate::lexer::Lexer;
use crate::opts::PageOpts;
use crate::position::{Position, Warning};
use crate::scope::ScopeId;
use crate::util::{escape_text, strip_tags};
use crate::value::{Html, Value};

/// What a page records about a model it included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub file: String,
}

/// Metadata of a parsed page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub draft: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Html::is_empty")]
    pub fmt_title: Html,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

/// A page of wiki markup.
///
/// Parsing builds the block tree and collects page variables, styles and
/// warnings. Rendering then walks the tree; its HTML is cached, so only
/// the first [`Page::html`] call does any work.
pub struct Page {
    pub(crate) tree: Tree,
    pub(crate) opts: PageOpts,
    pub(crate) sizer: Option<Arc<dyn ImageSizer>>,
    pub(crate) links: Option<Arc<dyn LinkResolver>>,
    pub(crate) model_source: Option<Arc<dyn ModelSource>>,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) section_count: usize,
    heading_ids: HashMap<String, usize>,
    pub(crate) styles: Vec<StyleRule>,
    pub(crate) images: IndexMap<String, Vec<[u32; 2]>>,
    pub(crate) models: IndexMap<String, ModelInfo>,
    /// Nesting depth of model pages; zero for a top-level page.
    pub(crate) depth: usize,
    source: String,
    path: Option<PathBuf>,
    name: String,
    vars_only: bool,
    parsed: bool,
    html: Option<Html>,
}

impl Page {
    /// A page over in-memory source with default options.
    pub fn new(source: impl Into<String>) -> Self {
        Page::with_opts(source, PageOpts::default())
    }

    pub fn with_opts(source: impl Into<String>, opts: PageOpts) -> Self {
        Page {
            tree: Tree::new(),
            opts,
            sizer: None,
            links: None,
            model_source: None,
            warnings: Vec::new(),
            section_count: 0,
            heading_ids: HashMap::new(),
            styles: Vec::new(),
            images: IndexMap::new(),
            models: IndexMap::new(),
            depth: 0,
            source: source.into(),
            path: None,
            name: String::new(),
            vars_only: false,
            parsed: false,
            html: None,
        }
    }

    /// Read a page from disk. Its name is the file name.
    pub fn open(path: impl AsRef<Path>, opts: PageOpts) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let mut page = Page::with_opts(source, opts);
        page.name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        page.path = Some(path.to_path_buf());
        Ok(page)
    }

    /// Set the page name, such as `guides/intro.page`. Its directory part
    /// prefixes relative links.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Only lex the source and collect variables; block content is left
    /// unparsed.
    pub fn vars_only(mut self) -> Self {
        self.vars_only = true;
        self
    }

    pub fn set_sizer(&mut self, sizer: Arc<dyn ImageSizer>) {
        self.sizer = Some(sizer);
    }

    pub fn set_links(&mut self, links: Arc<dyn LinkResolver>) {
        self.links = Some(links);
    }

    pub fn set_model_source(&mut self, models: Arc<dyn ModelSource>) {
        self.model_source = Some(models);
    }

    // ------------------------------------------------------------------------
    // Parsing and output
    // ------------------------------------------------------------------------

    /// Lex and parse the source. A second call does nothing.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        if self.parsed {
            return Ok(());
        }
        self.parsed = true;

        let source = self.source.clone();
        let mut lexer = Lexer::new();
        for line in source.lines() {
            lexer.feed_line(self, line)?;
        }
        lexer.finish(self);

        if !self.vars_only {
            block::parse(self, BlockId::MAIN);
        }
        debug!(
            page = %self.name,
            blocks = self.tree.len(),
            warnings = self.warnings.len(),
            "page parsed"
        );
        Ok(())
    }

    /// The rendered page.
    pub fn html(&mut self) -> Html {
        if let Some(html) = &self.html {
            return html.clone();
        }
        let html = block::render(self, BlockId::MAIN).generate();
        self.html = Some(html.clone());
        html
    }

    /// The stylesheet produced by the page's `style{}` blocks.
    pub fn css(&self) -> String {
        let main_id = self.tree.get(BlockId::MAIN).element_id();
        block::generate_css(main_id, &self.styles)
    }

    /// Format `text` as it would be formatted in the page body.
    pub fn format(&mut self, text: &str) -> Html {
        let scope = self.tree.root_scope();
        format_text(self, scope, text, FmtOpts::default())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn opts(&self) -> &PageOpts {
        &self.opts
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Image files used by the page, with the size of each use.
    pub fn images(&self) -> &IndexMap<String, Vec<[u32; 2]>> {
        &self.images
    }

    pub fn models(&self) -> &IndexMap<String, ModelInfo> {
        &self.models
    }

    /// Outline of the block tree.
    pub fn hierarchy(&self) -> String {
        self.tree.hierarchy(BlockId::MAIN)
    }

    /// The page title with its formatting.
    pub fn fmt_title(&self) -> Html {
        match self.get("page.title") {
            Ok(Some(Value::Html(html))) => html,
            Ok(Some(Value::Str(s))) => Html::new(escape_text(&s)),
            _ => Html::default(),
        }
    }

    /// The page title as plain text.
    pub fn title(&self) -> String {
        strip_tags(self.fmt_title().as_str())
    }

    pub fn author(&self) -> String {
        self.plain("page.author")
    }

    pub fn description(&self) -> String {
        let desc = self.plain("page.desc");
        if desc.is_empty() {
            self.plain("page.description")
        } else {
            desc
        }
    }

    pub fn draft(&self) -> bool {
        self.get_bool("page.draft").unwrap_or(false)
    }

    pub fn generated(&self) -> bool {
        self.get_bool("page.generated").unwrap_or(false)
    }

    /// `@page.created`, as written.
    pub fn created(&self) -> Option<String> {
        Some(self.plain("page.created")).filter(|created| !created.is_empty())
    }

    /// Link target of `@page.redirect`, when it resolves.
    pub fn redirect(&mut self) -> Option<String> {
        let target = self.plain("page.redirect");
        if target.is_empty() {
            return None;
        }
        let scope = self.tree.root_scope();
        parse_link(self, scope, &target, Position::default())
            .filter(|link| link.ok)
            .map(|link| link.target)
    }

    /// Keys of the `@category` map.
    pub fn categories(&self) -> Vec<String> {
        match self.get("category") {
            Ok(Some(Value::Block(id))) => self
                .tree
                .get(id)
                .kind()
                .map()
                .map(|map| map.keys().map(str::to_string).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn info(&mut self) -> PageInfo {
        PageInfo {
            created: self.created(),
            draft: self.draft(),
            generated: self.generated(),
            redirect: self.redirect(),
            fmt_title: self.fmt_title(),
            title: self.title(),
            author: self.author(),
            description: self.description(),
            categories: self.categories(),
        }
    }

    // ------------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------------

    /// Look up a page variable. Dotted paths descend into maps.
    pub fn get(&self, path: &str) -> Result<Option<Value>, VarError> {
        self.try_lookup(self.tree.root_scope(), path)
    }

    /// A string or HTML variable's text.
    pub fn get_str(&self, path: &str) -> Result<Option<String>, VarError> {
        match self.get(path)? {
            None => Ok(None),
            Some(value) => match value.as_text() {
                Some(text) => Ok(Some(text.to_string())),
                None => Err(VarError::WrongType {
                    path: path.to_string(),
                    expected: "string",
                    found: value.type_name(),
                }),
            },
        }
    }

    /// A boolean variable, or `None` when unset or of another type.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).ok().flatten().and_then(|value| value.as_bool())
    }

    /// Set a page variable, creating intermediate maps for dotted paths.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), VarError> {
        self.assign(path, value)
    }

    fn plain(&self, path: &str) -> String {
        self.get_str(path)
            .ok()
            .flatten()
            .map(|text| strip_tags(&text).trim().to_string())
            .unwrap_or_default()
    }

    pub(crate) fn try_lookup(&self, scope: ScopeId, path: &str) -> Result<Option<Value>, VarError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        if first.is_empty() {
            return Err(VarError::EmptyName);
        }
        let Some(mut value) = self.tree.scopes.lookup(scope, first).cloned() else {
            return Ok(None);
        };
        for segment in segments {
            let map = value
                .as_block()
                .and_then(|id| self.tree.get(id).kind().map())
                .ok_or_else(|| VarError::NotMap {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })?;
            match map.get(segment) {
                Some(next) => value = next.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(value))
    }

    pub(crate) fn lookup(&self, scope: ScopeId, path: &str) -> Option<Value> {
        self.try_lookup(scope, path).ok().flatten()
    }

    /// Write a page-scope variable. `a.b.c` stores `c` in map `@a.b`.
    pub(crate) fn assign(&mut self, path: &str, value: Value) -> Result<(), VarError> {
        let root = self.tree.root_scope();
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(VarError::EmptyName);
        }
        let Some((last, parents)) = segments.split_last() else {
            return Err(VarError::EmptyName);
        };
        if parents.is_empty() {
            self.tree.scopes.set_own(root, *last, value);
            return Ok(());
        }

        let first = parents[0];
        let mut map_id = match self.tree.scopes.get_own(root, first) {
            Some(Value::Block(id)) if self.tree.get(*id).kind().map().is_some() => *id,
            Some(other) => {
                return Err(VarError::NotMap {
                    path: path.to_string(),
                    segment: format!("{} ({})", first, other.type_name()),
                });
            }
            None => {
                let id = self.new_map();
                self.tree.scopes.set_own(root, first, Value::Block(id));
                id
            }
        };

        for segment in &parents[1..] {
            let existing = self
                .tree
                .get(map_id)
                .kind()
                .map()
                .and_then(|map| map.get(segment))
                .cloned();
            map_id = match existing {
                Some(Value::Block(id)) if self.tree.get(id).kind().map().is_some() => id,
                Some(_) => {
                    return Err(VarError::NotMap {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    });
                }
                None => {
                    let id = self.new_map();
                    self.set_in_map(map_id, segment, Value::Block(id));
                    id
                }
            };
        }

        self.set_in_map(map_id, last, value);
        Ok(())
    }

    /// A map created by assignment. It has no source, so it is marked
    /// parsed to keep its entries.
    fn new_map(&mut self) -> BlockId {
        let id = self.tree.create("map", "", "", Vec::new(), Some(BlockId::MAIN), Position::default());
        self.tree.get_mut(id).parsed = true;
        id
    }

    fn set_in_map(&mut self, id: BlockId, key: &str, value: Value) {
        if let Some(map) = self.tree.get_mut(id).kind.map_mut() {
            map.set(key, value);
        }
    }

    // ------------------------------------------------------------------------
    // Crate internals
    // ------------------------------------------------------------------------

    /// Record a warning. A loop body parsed once per item reports the
    /// same problem at the same place only once.
    pub(crate) fn warn(&mut self, pos: Position, message: impl Into<String>) {
        let warning = Warning::new(message, pos);
        if self.warnings.contains(&warning) {
            return;
        }
        debug!(page = %self.name, %warning, "warning");
        self.warnings.push(warning);
    }

    /// The first section is the page title unless `@page.enable.title`
    /// or the options say otherwise.
    pub(crate) fn enable_title(&self) -> bool {
        self.get_bool("page.enable.title")
            .unwrap_or(self.opts.page.enable_title)
    }

    /// Reserve a heading anchor, suffixing `-2`, `-3`, ... on reuse.
    pub(crate) fn unique_heading_id(&mut self, id: &str) -> String {
        let count = self.heading_ids.entry(id.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            id.to_string()
        } else {
            format!("{}-{}", id, count)
        }
    }

    /// Note one use of an image at a concrete size.
    pub(crate) fn record_image(&mut self, file: &str, width: u32, height: u32) {
        self.images
            .entry(file.to_string())
            .or_default()
            .push([width, height]);
    }

    /// Directory part of the page name, for relative links.
    pub(crate) fn prefix(&self) -> Option<String> {
        let name = self.name.replace('\\', "/");
        name.rsplit_once('/')
            .map(|(dir, _)| dir.trim_end_matches('/').to_string())
            .filter(|dir| !dir.is_empty() && dir != ".")
    }

    /// A page for an included model, sharing this page's options and
    /// capabilities.
    pub(crate) fn model_page(&self, name: &str, source: String) -> Page {
        let mut model = Page::with_opts(source, self.opts.clone());
        model.name = format!("{}.model", name);
        model.sizer = self.sizer.clone();
        model.links = self.links.clone();
        model.model_source = self.model_source.clone();
        model.depth = self.depth + 1;
        model
    }

    /// Expose a model's arguments as `@m.<key>`.
    pub(crate) fn set_model_args(&mut self, args: Vec<(String, Html)>) {
        for (key, html) in args {
            let path = format!("m.{}", key);
            if let Err(err) = self.assign(&path, Value::Html(html)) {
                self.warn(Position::default(), err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dotted_assignment_creates_maps() {
        let mut page = Page::new("");
        page.set("page.title", Value::from("Hello")).unwrap();
        page.set("page.author", Value::from("Ann")).unwrap();
        assert_eq!(page.get_str("page.title").unwrap().as_deref(), Some("Hello"));
        assert_eq!(page.author(), "Ann");
        assert!(matches!(page.get("page").unwrap(), Some(Value::Block(_))));
    }

    #[test]
    fn descending_into_a_string_fails() {
        let mut page = Page::new("");
        page.set("name", Value::from("x")).unwrap();
        assert!(matches!(page.get("name.first"), Err(VarError::NotMap { .. })));
        assert!(page.set("name.first", Value::from("y")).is_err());
        assert_eq!(page.get("missing.key").unwrap(), None);
    }

    #[test]
    fn heading_ids_are_suffixed() {
        let mut page = Page::new("");
        assert_eq!(page.unique_heading_id("intro"), "intro");
        assert_eq!(page.unique_heading_id("intro"), "intro-2");
        assert_eq!(page.unique_heading_id("intro"), "intro-3");
    }

    #[test]
    fn prefix_from_name() {
        assert_eq!(Page::new("").with_name("guides/intro.page").prefix().as_deref(), Some("guides"));
        assert_eq!(Page::new("").with_name("intro.page").prefix(), None);
    }

    #[test]
    fn parse_is_idempotent() {
        let mut page = Page::new("{ a: 1; a: 2; }");
        page.parse().unwrap();
        let warnings = page.warnings().len();
        let blocks = page.tree().len();
        page.parse().unwrap();
        assert_eq!(page.warnings().len(), warnings);
        assert_eq!(page.tree().len(), blocks);
    }
}
