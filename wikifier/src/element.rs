use std::cell::OnceCell;
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::util::{escape, escape_text};
use crate::value::Html;

const INDENT: &str = "    ";

/// Flags that change how an element is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Meta {
    /// Emit children only, without the element's own tags.
    NoTags,
    /// Children start at column zero.
    NoIndent,
    /// Self-closing tag with no content.
    NonContainer,
    /// Prefix the class list with `q-<id>` so styles can target it.
    NeedId,
    /// Skip the element entirely.
    Invisible,
    /// Rows produced by an `infosec{}` for its enclosing infobox table.
    Infosec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    /// Present as a bare attribute when true.
    Bool(bool),
}

#[derive(Debug, Clone)]
pub enum Node {
    /// Plain text, escaped on output.
    Text(String),
    Html(Html),
    Element(Element),
}

/// A node of the render tree.
///
/// Cloning an element copies its whole subtree; no two elements share
/// children.
#[derive(Debug, Clone, Default)]
pub struct Element {
    tag: String,
    id: String,
    typ: String,
    classes: Vec<String>,
    attrs: IndexMap<String, AttrValue>,
    styles: IndexMap<String, String>,
    metas: HashSet<Meta>,
    content: Vec<Node>,
    generated: OnceCell<Html>,
}

impl Element {
    /// A new element whose type class is `q-<typ>` (none when empty).
    pub fn new(tag: impl Into<String>, typ: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            typ: typ.into(),
            ..Element::default()
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.generated.take();
        self.tag = tag.into();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.generated.take();
        self.id = id.into();
    }

    pub fn typ(&self) -> &str {
        &self.typ
    }

    /// Add a class. Names are namespaced as `q-<name>` unless they start
    /// with `!`, which is stripped and the rest used verbatim.
    pub fn add_class(&mut self, class: impl Into<String>) {
        self.generated.take();
        self.classes.push(class.into());
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.generated.take();
        self.attrs.insert(key.into(), AttrValue::Str(value.into()));
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn set_bool_attr(&mut self, key: impl Into<String>, value: bool) {
        self.generated.take();
        self.attrs.insert(key.into(), AttrValue::Bool(value));
    }

    pub fn set_style(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.generated.take();
        self.styles.insert(key.into(), value.into());
    }

    pub fn add_meta(&mut self, meta: Meta) {
        self.generated.take();
        self.metas.insert(meta);
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.add_meta(meta);
        self
    }

    pub fn has_meta(&self, meta: Meta) -> bool {
        self.metas.contains(&meta)
    }

    pub fn add_text(&mut self, text: impl Into<String>) {
        self.generated.take();
        self.content.push(Node::Text(text.into()));
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.add_text(text);
        self
    }

    pub fn add_html(&mut self, html: Html) {
        self.generated.take();
        self.content.push(Node::Html(html));
    }

    pub fn with_html(mut self, html: Html) -> Self {
        self.add_html(html);
        self
    }

    pub fn add_child(&mut self, child: Element) {
        self.generated.take();
        self.content.push(Node::Element(child));
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.add_child(child);
        self
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) {
        self.generated.take();
        self.content.extend(nodes);
    }

    pub fn content(&self) -> &[Node] {
        &self.content
    }

    /// Child elements, skipping text.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.content.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Serialized HTML, computed once and cached until the next change.
    pub fn generate(&self) -> Html {
        self.generated
            .get_or_init(|| {
                let mut out = String::new();
                for (line, indent) in self.generate_indented(0) {
                    for _ in 0..indent {
                        out.push_str(INDENT);
                    }
                    out.push_str(&line);
                    if !line.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Html::new(out)
            })
            .clone()
    }

    /// Lines of output paired with their indentation level.
    pub fn generate_indented(&self, indent: usize) -> Vec<(String, usize)> {
        let mut lines = Vec::new();
        let tags = !self.has_meta(Meta::NoTags);

        if tags {
            let mut open = format!("<{}", self.tag);
            let classes = self.class_list();
            if !classes.is_empty() {
                open.push_str(&format!(" class=\"{}\"", escape(&classes.join(" "))));
            }
            if !self.styles.is_empty() {
                let styles: String = self
                    .styles
                    .iter()
                    .map(|(key, value)| format!("{}:{}; ", key, value))
                    .collect();
                open.push_str(&format!(" style=\"{}\"", escape(&styles)));
            }
            for (key, value) in &self.attrs {
                match value {
                    AttrValue::Str(s) => open.push_str(&format!(" {}=\"{}\"", key, escape(s))),
                    AttrValue::Bool(true) => open.push_str(&format!(" {}", key)),
                    AttrValue::Bool(false) => {}
                }
            }
            if self.has_meta(Meta::NonContainer) {
                lines.push((open + " />", indent));
                return lines;
            }
            lines.push((open + ">", indent));
        }

        let inner = if tags { indent + 1 } else { indent };
        let text_indent = if self.has_meta(Meta::NoIndent) { 0 } else { inner };
        for node in &self.content {
            match node {
                Node::Element(child) => {
                    if child.has_meta(Meta::Invisible) {
                        continue;
                    }
                    let child_indent = if child.has_meta(Meta::NoIndent) { 0 } else { inner };
                    lines.extend(child.generate_indented(child_indent));
                }
                Node::Text(text) => lines.push((escape_text(text).into_owned(), text_indent)),
                Node::Html(html) => lines.push((html.as_str().to_string(), text_indent)),
            }
        }

        if tags {
            lines.push((format!("</{}>", self.tag), indent));
        }
        lines
    }

    fn class_list(&self) -> Vec<String> {
        let mut classes = Vec::with_capacity(self.classes.len() + 2);
        if self.has_meta(Meta::NeedId) && !self.id.is_empty() {
            classes.push(format!("q-{}", self.id));
        }
        if !self.typ.is_empty() {
            classes.push(format!("q-{}", self.typ));
        }
        for class in &self.classes {
            match class.strip_prefix('!') {
                Some(raw) => classes.push(raw.to_string()),
                None => classes.push(format!("q-{}", class)),
            }
        }
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nested_elements_indent() {
        let el = Element::new("ul", "list")
            .with_child(Element::new("li", "list-item").with_text("one"))
            .with_child(Element::new("li", "list-item").with_text("a < b"));
        assert_eq!(
            el.generate().as_str(),
            "<ul class=\"q-list\">\n    <li class=\"q-list-item\">\n        one\n    </li>\n    \
             <li class=\"q-list-item\">\n        a &lt; b\n    </li>\n</ul>\n"
        );
    }

    #[test]
    fn classes_ids_and_attributes() {
        let mut el = Element::new("div", "sec");
        el.set_id("sec-2");
        el.add_meta(Meta::NeedId);
        el.add_class("!qc-wide");
        el.add_class("extra");
        el.set_attr("title", "say \"hi\"");
        el.set_bool_attr("hidden", true);
        el.set_style("width", "20px");
        let html = el.generate();
        assert!(html.as_str().starts_with(
            "<div class=\"q-sec-2 q-sec qc-wide q-extra\" style=\"width:20px; \" \
             title=\"say &quot;hi&quot;\" hidden>"
        ));
    }

    #[test]
    fn non_container_self_closes() {
        let img = Element::new("img", "image-img")
            .with_attr("src", "/images/a.png")
            .with_meta(Meta::NonContainer);
        assert_eq!(
            img.generate().as_str(),
            "<img class=\"q-image-img\" src=\"/images/a.png\" />\n"
        );
    }

    #[test]
    fn no_tags_and_invisible() {
        let wrapper = Element::new("div", "fmt")
            .with_meta(Meta::NoTags)
            .with_html(Html::new("<b>x</b>"))
            .with_child(Element::new("div", "style").with_meta(Meta::Invisible));
        assert_eq!(wrapper.generate().as_str(), "<b>x</b>\n");
    }

    #[test]
    fn no_indent_children_start_at_column_zero() {
        let pre = Element::new("pre", "code")
            .with_meta(Meta::NoIndent)
            .with_text("x = 1\n");
        let sec = Element::new("div", "sec").with_child(pre);
        assert_eq!(
            sec.generate().as_str(),
            "<div class=\"q-sec\">\n<pre class=\"q-code\">\nx = 1\n</pre>\n</div>\n"
        );
    }

    #[test]
    fn copies_are_independent() {
        let original = Element::new("p", "p").with_text("shared");
        let mut copy = original.clone();
        copy.add_text("more");
        assert_eq!(original.content().len(), 1);
        assert_eq!(copy.content().len(), 2);
    }

    #[test]
    fn cache_invalidated_on_change() {
        let mut el = Element::new("p", "p");
        let before = el.generate();
        el.add_text("later");
        assert_ne!(before, el.generate());
    }
}
