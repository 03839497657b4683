use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Options a wiki passes to each of its pages.
///
/// Every field has a default, so a configuration file only needs the keys
/// it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageOpts {
    /// Wiki name.
    pub name: String,
    pub page: PageSection,
    pub root: RootOpts,
    pub image: ImageOpts,
    /// External wikis addressable as `[[text|code:Page]]`.
    pub external: IndexMap<String, ExternalWiki>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSection {
    /// Treat the first section as the page heading.
    pub enable_title: bool,
}

/// Web paths the generated markup points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootOpts {
    pub wiki: String,
    pub image: String,
    pub category: String,
    pub page: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOpts {
    /// Pixel-density multipliers offered through `srcset`.
    pub retina: Vec<u32>,
    pub size_method: SizeMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeMethod {
    /// Emit a placeholder width and let client script resize.
    #[default]
    Javascript,
    /// Ask the host's image sizer for final dimensions and paths.
    Server,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalWiki {
    pub name: String,
    pub root: String,
    #[serde(rename = "type", default)]
    pub kind: ExternalKind,
}

/// How page names are normalized for an external wiki.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalKind {
    /// Non-path characters become `_`.
    Quiki,
    /// Spaces become `_`.
    #[default]
    Mediawiki,
    None,
}

impl Default for PageOpts {
    fn default() -> Self {
        let mut external = IndexMap::new();
        external.insert(
            "wp".to_string(),
            ExternalWiki {
                name: "Wikipedia".to_string(),
                root: "http://en.wikipedia.org/wiki".to_string(),
                kind: ExternalKind::Mediawiki,
            },
        );
        PageOpts {
            name: String::new(),
            page: PageSection::default(),
            root: RootOpts::default(),
            image: ImageOpts::default(),
            external,
        }
    }
}

impl Default for PageSection {
    fn default() -> Self {
        PageSection { enable_title: true }
    }
}

impl Default for RootOpts {
    fn default() -> Self {
        RootOpts {
            wiki: String::new(),
            image: "/images".to_string(),
            category: "/topic".to_string(),
            page: "/page".to_string(),
        }
    }
}

impl Default for ImageOpts {
    fn default() -> Self {
        ImageOpts {
            retina: vec![2, 3],
            size_method: SizeMethod::Javascript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = PageOpts::default();
        assert!(opts.page.enable_title);
        assert_eq!(opts.root.image, "/images");
        assert_eq!(opts.root.category, "/topic");
        assert_eq!(opts.root.page, "/page");
        assert_eq!(opts.image.retina, vec![2, 3]);
        assert_eq!(opts.image.size_method, SizeMethod::Javascript);
        assert_eq!(opts.external["wp"].name, "Wikipedia");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: PageOpts =
            serde_json::from_str(r#"{"image": {"size_method": "server"}, "page": {"enable_title": false}}"#)
                .unwrap();
        assert_eq!(opts.image.size_method, SizeMethod::Server);
        assert_eq!(opts.image.retina, vec![2, 3]);
        assert!(!opts.page.enable_title);
        assert_eq!(opts.root.page, "/page");
    }
}
