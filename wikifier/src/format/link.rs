//! `[[display|target]]` link resolution.

use std::sync::LazyLock;

use regex::Regex;

use super::{FmtOpts, format_text};
use crate::opts::ExternalKind;
use crate::page::Page;
use crate::position::Position;
use crate::scope::ScopeId;
use crate::util::{category_name_ne, escape, escape_text, page_name_link, page_name_ne};
use crate::value::Html;

static OTHER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^((\w+)://|\$)\s*").unwrap());
static MAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9._%+-]+@(?:[A-Z0-9-]+\.)+[A-Z]{2,63}$").unwrap());
static WIKI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\w+):(.*)$").unwrap());

/// A resolved link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// False when the target is known not to exist.
    pub ok: bool,
    pub target: String,
    /// One of `other`, `contact`, `external`, `category` or `internal`.
    pub kind: &'static str,
    pub tooltip: String,
    pub display: Html,
}

/// Resolve `display|target` (or a bare target). Empty input yields `None`.
pub(crate) fn parse_link(page: &mut Page, scope: ScopeId, text: &str, pos: Position) -> Option<Link> {
    if text.trim().is_empty() {
        return None;
    }

    let (display, target) = match text.split_once('|') {
        Some((display, target)) => {
            let display = format_text(page, scope, display.trim(), FmtOpts::at(pos));
            (Some(display), target.trim().to_string())
        }
        None => (None, text.trim().to_string()),
    };

    let mut link = Link {
        ok: true,
        tooltip: target.clone(),
        target,
        kind: "internal",
        display: Html::default(),
    };
    let mut display_default = link.target.clone();

    if let Some(caps) = OTHER.captures(&link.target) {
        link.kind = "other";
        link.tooltip.clear();
        display_default = link.target[caps[0].len()..].to_string();
        if link.target.starts_with('$') {
            link.target = display_default.clone();
        }
    } else if let Some(email) = link.target.strip_prefix("mailto:") {
        link.kind = "contact";
        link.tooltip = format!("Email {}", email);
        display_default = email.to_string();
    } else if MAIL.is_match(&link.target) {
        link.kind = "contact";
        link.tooltip = format!("Email {}", link.target);
        link.target = format!("mailto:{}", link.target);
    } else if let Some(caps) = WIKI.captures(&link.target) {
        let code = caps[1].trim().to_string();
        let page_name = caps[2].trim().to_string();
        link.kind = "external";
        display_default = page_name.clone();
        external_link(page, &mut link, &code, &page_name, pos);
    } else if let Some(category) = link.target.strip_prefix('~') {
        let category = category.trim().to_string();
        link.kind = "category";
        link.target = format!("{}/{}", page.opts.root.category, category_name_ne(&category));
        if let Some(links) = &page.links {
            link.ok = links.category_exists(&category_name_ne(&category));
        }
        link.tooltip = category.clone();
        display_default = category;
    } else {
        internal_link(page, &mut link);
    }

    link.display = display.unwrap_or_else(|| Html::new(escape_text(&display_default)));
    link.target = link.target.trim().to_string();
    link.tooltip = link.tooltip.trim().to_string();
    Some(link)
}

fn internal_link(page: &Page, link: &mut Link) {
    let mut target = link.target.as_str();
    let prefix = match target.strip_prefix('/') {
        Some(rest) if !rest.is_empty() => {
            target = rest;
            String::new()
        }
        _ => match page.prefix() {
            Some(prefix) => format!("{}/", prefix),
            None => String::new(),
        },
    };

    let (name, section) = match target.split_once('#') {
        Some((name, section)) => (name.trim(), Some(page_name_ne(section.trim()))),
        None => (target.trim(), None),
    };

    if name.is_empty() {
        if let Some(section) = section {
            link.target = format!("#{}", section);
            return;
        }
    }

    let page_name = format!("{}{}", prefix, page_name_ne(name));
    if let Some(links) = &page.links {
        link.ok = links.page_exists(&page_name);
    }
    link.target = match section {
        Some(section) => format!("{}/{}#{}", page.opts.root.page, page_name, section),
        None => format!("{}/{}", page.opts.root.page, page_name),
    };
}

fn external_link(page: &mut Page, link: &mut Link, code: &str, page_name: &str, pos: Position) {
    let Some(wiki) = page.opts.external.get(code).cloned() else {
        page.warn(pos, format!("External wiki '{}' does not exist", code));
        link.ok = false;
        link.tooltip = code.to_string();
        link.target = page_name.to_string();
        return;
    };

    let (name, section) = match page_name.split_once('#') {
        Some((name, section)) => (name.trim(), section.trim()),
        None => (page_name, ""),
    };
    link.tooltip = if section.is_empty() {
        format!("{}: {}", wiki.name, name)
    } else {
        format!("{} # {}", name, section)
    };

    let normalize = |s: &str| match wiki.kind {
        ExternalKind::Quiki => page_name_link(s),
        ExternalKind::Mediawiki => s.replace(' ', "_"),
        ExternalKind::None => s.to_string(),
    };
    link.target = format!("{}/{}", wiki.root, normalize(name));
    if !section.is_empty() {
        link.target.push('#');
        link.target.push_str(&normalize(section));
    }
}

/// Render a link token as an anchor.
pub(crate) fn link_html(page: &mut Page, scope: ScopeId, text: &str, pos: Position) -> Html {
    let Some(link) = parse_link(page, scope, text, pos) else {
        return Html::default();
    };
    let invalid = if link.ok { "" } else { " invalid" };
    let title = if link.tooltip.is_empty() {
        String::new()
    } else {
        format!(r#" title="{}""#, escape(&link.tooltip))
    };
    Html::new(format!(
        r#"<a class="q-link-{}{}" href="{}"{}>{}</a>"#,
        link.kind,
        invalid,
        escape(&link.target),
        title,
        link.display
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn link(text: &str) -> Link {
        let mut page = Page::new("");
        let scope = page.tree.root_scope();
        parse_link(&mut page, scope, text, Position::default()).unwrap()
    }

    #[test]
    fn internal_pages_and_sections() {
        let l = link("Some Page");
        assert_eq!(l.kind, "internal");
        assert_eq!(l.target, "/page/Some_Page");
        assert_eq!(l.display.as_str(), "Some Page");

        let l = link("Intro|Some Page#History");
        assert_eq!(l.target, "/page/Some_Page#History");
        assert_eq!(l.display.as_str(), "Intro");

        assert_eq!(link("#Usage Notes").target, "#Usage_Notes");
    }

    #[test]
    fn other_and_contact() {
        let l = link("https://example.com/x");
        assert_eq!(l.kind, "other");
        assert_eq!(l.target, "https://example.com/x");
        assert_eq!(l.display.as_str(), "example.com/x");
        assert!(l.tooltip.is_empty());

        let l = link("$/downloads");
        assert_eq!(l.target, "/downloads");

        let l = link("someone@example.com");
        assert_eq!(l.kind, "contact");
        assert_eq!(l.target, "mailto:someone@example.com");
        assert_eq!(l.tooltip, "Email someone@example.com");
    }

    #[test]
    fn external_wikis() {
        let l = link("wp: Rust (programming language)");
        assert_eq!(l.kind, "external");
        assert!(l.ok);
        assert_eq!(l.target, "http://en.wikipedia.org/wiki/Rust_(programming_language)");
        assert_eq!(l.tooltip, "Wikipedia: Rust (programming language)");

        let l = link("nowhere:Page");
        assert!(!l.ok);
    }

    #[test]
    fn categories() {
        let l = link("~Cool Things");
        assert_eq!(l.kind, "category");
        assert_eq!(l.target, "/topic/Cool_Things");
        assert_eq!(l.display.as_str(), "Cool Things");
    }

    #[test]
    fn anchor_markup() {
        let mut page = Page::new("");
        let scope = page.tree.root_scope();
        let html = link_html(&mut page, scope, "Home|Main Page", Position::default());
        assert_eq!(
            html.as_str(),
            r#"<a class="q-link-internal" href="/page/Main_Page" title="Main Page">Home</a>"#
        );
    }
}
