use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use wikifier::{ImageDimensions, ImageSizer, LinkResolver, ModelSource, Page, PageOpts, scale_dimensions};

/// Contents of a `--config` TOML file: page options plus the directories
/// and image sizes the CLI stands in for a wiki with.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub page: PageOpts,

    pub dir: DirConfig,

    /// Full-size dimensions of known images, `file = [width, height]`.
    pub images: BTreeMap<String, [u32; 2]>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirConfig {
    /// Pages that links may point to.
    pub page: Option<PathBuf>,
    /// Source of `$name{}` models, as `<name>.model` files.
    pub model: Option<PathBuf>,
    /// Categories, as `<name>.cat` files.
    pub category: Option<PathBuf>,
}

impl Config {
    /// Load a TOML configuration. Relative directories resolve against the
    /// file's own directory.
    pub fn load(path: &Path) -> Result<Config, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let mut config = Config::parse(&text).map_err(|e| format!("{}: {}", path.display(), e))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for dir in [&mut config.dir.page, &mut config.dir.model, &mut config.dir.category] {
            if let Some(dir) = dir {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        debug!(config = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Config, String> {
        toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
    }

    /// Hand the page whatever capabilities this configuration backs.
    pub fn apply(&self, page: &mut Page) {
        if self.dir.page.is_some() || self.dir.category.is_some() {
            page.set_links(Arc::new(DirLinks {
                pages: self.dir.page.clone(),
                categories: self.dir.category.clone(),
            }));
        }
        if let Some(dir) = &self.dir.model {
            page.set_model_source(Arc::new(DirModels { dir: dir.clone() }));
        }
        if !self.images.is_empty() {
            page.set_sizer(Arc::new(StaticSizer {
                root: self.page.root.image.clone(),
                images: self.images.clone(),
            }));
        }
    }
}

// ----------------------------------------------------------------------------
// Capabilities
// ----------------------------------------------------------------------------

struct DirLinks {
    pages: Option<PathBuf>,
    categories: Option<PathBuf>,
}

impl LinkResolver for DirLinks {
    fn page_exists(&self, name: &str) -> bool {
        match &self.pages {
            Some(dir) => dir.join(format!("{}.page", name)).is_file() || dir.join(name).is_file(),
            None => true,
        }
    }

    fn category_exists(&self, name: &str) -> bool {
        match &self.categories {
            Some(dir) => dir.join(format!("{}.cat", name)).is_file(),
            None => true,
        }
    }
}

struct DirModels {
    dir: PathBuf,
}

impl ModelSource for DirModels {
    fn model_source(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.dir.join(format!("{}.model", name))).ok()
    }
}

/// Sizes images from the dimensions listed in the configuration. Scaled
/// copies are named `<width>x<height>-<file>`.
struct StaticSizer {
    root: String,
    images: BTreeMap<String, [u32; 2]>,
}

impl ImageSizer for StaticSizer {
    fn dimensions(&self, file: &str, width: u32, height: u32) -> ImageDimensions {
        match self.images.get(file) {
            Some([full_width, full_height]) => scale_dimensions(*full_width, *full_height, width, height),
            None => ImageDimensions {
                width,
                height,
                full_size: width == 0 && height == 0,
            },
        }
    }

    fn sized_path(&self, file: &str, width: u32, height: u32) -> String {
        if self.dimensions(file, width, height).full_size {
            format!("{}/{}", self.root, file)
        } else {
            format!("{}/{}x{}-{}", self.root, width, height, file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_options_and_cli_keys_share_a_file() {
        let config = Config::parse(
            r#"
name = "Docs"

[page]
enable_title = false

[image]
size_method = "server"

[dir]
model = "models"

[images]
"cat.png" = [400, 300]
"#,
        )
        .unwrap();
        assert_eq!(config.page.name, "Docs");
        assert!(!config.page.page.enable_title);
        assert_eq!(config.page.root.image, "/images");
        assert_eq!(config.dir.model, Some(PathBuf::from("models")));
        assert_eq!(config.images.get("cat.png"), Some(&[400, 300]));
    }

    #[test]
    fn static_sizer_scales_known_images() {
        let sizer = StaticSizer {
            root: "/images".to_string(),
            images: BTreeMap::from([("cat.png".to_string(), [400, 300])]),
        };
        let dims = sizer.dimensions("cat.png", 200, 0);
        assert_eq!((dims.width, dims.height, dims.full_size), (200, 150, false));
        assert_eq!(sizer.sized_path("cat.png", 200, 150), "/images/200x150-cat.png");
        assert_eq!(sizer.sized_path("cat.png", 400, 300), "/images/cat.png");
    }
}
