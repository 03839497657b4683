//! `image{}`, `imagebox{}` and `gallery{}`.
//!
//! Dimensions are resolved at parse time. In `server` mode the page's
//! [`ImageSizer`](crate::host::ImageSizer) picks the final size and path
//! and every concrete size is recorded on the page; in `javascript` mode
//! a placeholder width is emitted and client script does the rest.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::warn;

use super::map::{MapData, MapEntry, parse_map};
use super::{BlockId, BlockKind, value_nodes};
use crate::element::{Element, Meta};
use crate::format::link::parse_link;
use crate::opts::SizeMethod;
use crate::page::Page;
use crate::position::Position;
use crate::util::{scale_string, strip_tags};
use crate::value::Value;

static EXTERNAL_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)://").unwrap());

/// Width of images in an infobox that specify no size.
const INFOBOX_IMAGE_WIDTH: u32 = 270;
/// Placeholder width replaced by client script.
const JAVASCRIPT_IMAGE_WIDTH: u32 = 200;
const DEFAULT_THUMB_HEIGHT: u32 = 220;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageData {
    /// `imagebox{}` rather than `image{}`.
    pub boxed: bool,
    pub map: MapData,
    pub file: String,
    /// Web path of the image as displayed.
    pub path: String,
    pub alt: String,
    pub link: String,
    pub align: String,
    pub author: String,
    pub license: String,
    pub width: u32,
    pub height: u32,
    /// Width is a placeholder for client-side resizing.
    pub use_js: bool,
    pub full_size: bool,
    /// Retina multipliers available for `srcset`.
    pub scales: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryImage {
    pub full_path: String,
    pub thumb_path: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryData {
    pub map: MapData,
    pub thumb_height: u32,
    pub images: Vec<GalleryImage>,
}

impl Default for GalleryData {
    fn default() -> Self {
        GalleryData {
            map: MapData::default(),
            thumb_height: DEFAULT_THUMB_HEIGHT,
            images: Vec::new(),
        }
    }
}

/// A map value as plain text, without markup or entities.
fn plain(map: &MapData, key: &str) -> String {
    map.get_str(key).map(strip_tags).unwrap_or_default()
}

fn key_pos(map: &MapData, key: &str, default: Position) -> Position {
    map.entry(key).map(|entry| entry.pos).unwrap_or(default)
}

/// A pixel dimension such as `120` or `120px`; zero when absent.
fn px(page: &mut Page, map: &MapData, key: &str, default: Position) -> u32 {
    let value = plain(map, key);
    let value = value.trim();
    if value.is_empty() {
        return 0;
    }
    match value.strip_suffix("px").unwrap_or(value).trim().parse() {
        Ok(n) => n,
        Err(_) => {
            page.warn(key_pos(map, key, default), format!("{}: expected integer", key));
            0
        }
    }
}

fn description(map: &MapData) -> Option<&Value> {
    map.get("description").or_else(|| map.get("desc"))
}

// ----------------------------------------------------------------------------
// image / imagebox
// ----------------------------------------------------------------------------

pub(crate) fn parse_image(page: &mut Page, id: BlockId) {
    parse_map(page, id);

    let block = page.tree.get(id);
    let open_pos = block.open_pos;
    let in_infobox = block
        .parent
        .is_some_and(|parent| matches!(page.tree.get(parent).kind, BlockKind::Infobox(_)));
    let BlockKind::Image(image) = &block.kind else {
        return;
    };
    let mut image = (**image).clone();

    image.file = plain(&image.map, "file");
    image.alt = plain(&image.map, "alt");
    image.link = plain(&image.map, "link");
    image.align = plain(&image.map, "align");
    if image.align.is_empty() {
        image.align = plain(&image.map, "float");
    }
    image.author = plain(&image.map, "author");
    image.license = plain(&image.map, "license");
    image.width = px(page, &image.map, "width", open_pos);
    image.height = px(page, &image.map, "height", open_pos);

    if image.alt.is_empty() {
        image.alt = image.file.clone();
    }
    if image.width == 0 && image.height == 0 && in_infobox {
        image.width = INFOBOX_IMAGE_WIDTH;
    }

    let resolved = resolve_image(page, &mut image, open_pos);
    let block = page.tree.get_mut(id);
    block.parse_failed = !resolved;
    block.kind = BlockKind::Image(Box::new(image));
}

/// Fill in the display path and dimensions, warning and returning false
/// when the image cannot be shown.
fn resolve_image(page: &mut Page, image: &mut ImageData, open_pos: Position) -> bool {
    if image.file.is_empty() {
        page.warn(key_pos(&image.map, "file", open_pos), "No file specified for image");
        return false;
    }
    image.path = image.file.clone();
    if EXTERNAL_IMAGE.is_match(&image.file) {
        return true;
    }

    match page.opts.image.size_method {
        SizeMethod::Javascript => {
            if image.width == 0 {
                image.use_js = true;
                image.width = JAVASCRIPT_IMAGE_WIDTH;
            }
            image.path = format!("{}/{}", page.opts.root.image, image.file);
        }
        SizeMethod::Server => {
            let Some(sizer) = page.sizer.clone() else {
                warn!(file = %image.file, "server image sizing requested without an image sizer");
                page.warn(open_pos, "image.sizer and image.calc required with image.size_method 'server'");
                return false;
            };
            let dims = sizer.dimensions(&image.file, image.width, image.height);
            image.path = sizer.sized_path(&image.file, dims.width, dims.height);
            image.full_size = dims.full_size;
            image.width = dims.width;
            image.height = dims.height;
            page.record_image(&image.file, dims.width, dims.height);

            let retina = page.opts.image.retina.clone();
            image.scales = retina
                .into_iter()
                .filter(|scale| {
                    !sizer
                        .dimensions(&image.file, dims.width * scale, dims.height * scale)
                        .full_size
                })
                .collect();
        }
    }
    true
}

pub(crate) fn render_image(page: &mut Page, id: BlockId, el: &mut Element) {
    let block = page.tree.get(id);
    let (scope, open_pos) = (block.scope, block.open_pos);
    let BlockKind::Image(image) = &block.kind else {
        return;
    };
    let image = (**image).clone();

    let srcset = if !image.full_size && !EXTERNAL_IMAGE.is_match(&image.path) && !image.scales.is_empty() {
        scale_string(&image.path, &image.scales)
    } else {
        String::new()
    };

    let (href, new_window) = match image.link.as_str() {
        "none" => (None, false),
        "" => (Some(image.path.clone()), false),
        link => {
            let pos = key_pos(&image.map, "link", open_pos);
            match parse_link(page, scope, link, pos) {
                Some(parsed) if parsed.ok => (Some(parsed.target), true),
                _ => (None, false),
            }
        }
    };

    let mut img = Element::new("img", if image.boxed { "imagebox-img" } else { "image-img" })
        .with_meta(Meta::NonContainer)
        .with_attr("src", image.path.clone())
        .with_attr("alt", image.alt.clone());
    if !srcset.is_empty() {
        img.set_attr("srcset", srcset);
    }
    if image.boxed && image.use_js {
        img.set_attr("onload", "quiki.imageResize(this);");
    }

    let linked = match href {
        Some(href) => {
            let mut a = Element::new("a", "image-a").with_attr("href", href);
            if new_window {
                a.set_attr("target", "_blank");
            }
            a.with_child(img)
        }
        None => img,
    };

    if !image.boxed {
        if !image.align.is_empty() {
            el.add_class(format!("image-{}", image.align));
        }
        el.add_child(linked);
        return;
    }

    let align = if image.align.is_empty() { "right" } else { &image.align };
    el.add_class(format!("imagebox-{}", align));
    let mut inner = Element::new("div", "imagebox-inner");
    inner.set_style("width", format!("{}px", image.width));
    inner.add_child(linked);
    if let Some(desc) = description(&image.map).cloned() {
        let mut desc_inner = Element::new("div", "imagebox-description-inner");
        desc_inner.add_nodes(value_nodes(page, scope, &desc, open_pos));
        inner.add_child(Element::new("div", "imagebox-description").with_child(desc_inner));
    }
    el.add_child(inner);
}

// ----------------------------------------------------------------------------
// gallery
// ----------------------------------------------------------------------------

pub(crate) fn parse_gallery(page: &mut Page, id: BlockId) {
    parse_map(page, id);

    let BlockKind::Gallery(gallery) = &page.tree.get(id).kind else {
        return;
    };
    let mut gallery = gallery.clone();
    let entries: Vec<MapEntry> = gallery.map.iter().cloned().collect();

    for entry in entries {
        if entry.key == "thumb_height" {
            match entry.value.as_text().map(|s| strip_tags(s).trim().parse::<u32>()) {
                Some(Ok(height)) => gallery.thumb_height = height,
                _ => page.warn(entry.pos, "thumb_height: expected integer"),
            }
            continue;
        }
        if !entry.key.starts_with("anon_") {
            page.warn(entry.pos, format!("Invalid key '{}'", entry.key));
            continue;
        }
        let image = entry.value.as_block().and_then(|child| match &page.tree.get(child).kind {
            BlockKind::Image(image) if !image.boxed && !page.tree.get(child).parse_failed => {
                Some((image.file.clone(), description(&image.map).cloned()))
            }
            _ => None,
        });
        let Some((file, desc)) = image else {
            page.warn(entry.pos, format!("{}: expected Block<image{{}}>", entry.key));
            continue;
        };
        let description = desc
            .as_ref()
            .and_then(Value::as_text)
            .map(strip_tags)
            .unwrap_or_default();
        let image = gallery_image(page, &file, gallery.thumb_height, description);
        gallery.images.push(image);
    }

    page.tree.get_mut(id).kind = BlockKind::Gallery(gallery);
}

fn gallery_image(page: &mut Page, file: &str, thumb_height: u32, description: String) -> GalleryImage {
    let full_path = format!("{}/{}", page.opts.root.image, file);
    let retina = page.opts.image.retina.iter().copied().max().unwrap_or(1).max(1);
    let thumb_path = match (page.opts.image.size_method, page.sizer.clone()) {
        (SizeMethod::Server, Some(sizer)) if !EXTERNAL_IMAGE.is_match(file) => {
            let dims = sizer.dimensions(file, 0, thumb_height * retina);
            page.record_image(file, dims.width, dims.height);
            sizer.sized_path(file, dims.width, dims.height)
        }
        _ => full_path.clone(),
    };
    GalleryImage {
        full_path,
        thumb_path,
        description,
    }
}

pub(crate) fn render_gallery(page: &mut Page, id: BlockId, el: &mut Element) {
    let block = page.tree.get(id);
    let BlockKind::Gallery(gallery) = &block.kind else {
        return;
    };
    let options = json!({
        "thumbHeight": gallery.thumb_height.to_string(),
        "thumbnailWidth": "auto",
        "thumbnailBorderVertical": 0,
        "thumbnailBorderHorizontal": 0,
        "colorScheme": {
            "thumbnail": { "borderColor": "rgba(0,0,0,0)" }
        },
        "thumbnailDisplayTransition": "flipUp",
        "thumbnailDisplayTransitionDuration": 500,
        "thumbnailLabel": {
            "displayDescription": true,
            "descriptionMultiLine": true
        },
        "thumbnailHoverEffect2": "descriptionSlideUp",
        "thumbnailAlignment": "center",
        "thumbnailGutterWidth": 10,
        "thumbnailGutterHeight": 10
    });
    el.set_attr("data-nanogallery2", options.to_string());
    el.set_attr("id", format!("q-{}", block.element_id));
    for image in &gallery.images {
        el.add_child(
            Element::new("a", "")
                .with_attr("href", image.full_path.clone())
                .with_attr("data-ngthumb", image.thumb_path.clone())
                .with_attr("data-ngdesc", image.description.clone()),
        );
    }
}
