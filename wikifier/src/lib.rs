//! Wikifier: a brace-delimited wiki markup language rendered to HTML and CSS.
//!
//! A [`Page`] lexes its source into a tree of blocks, parses each block
//! into its typed form, then renders the tree to an element tree that
//! serializes to indented HTML. Style blocks contribute CSS.
//!
//! ```
//! use wikifier::Page;
//!
//! let mut page = Page::new("Hello [b]world[/b].");
//! page.parse().unwrap();
//! assert!(page.html().as_str().contains("<span style=\"font-weight: bold;\">world</span>"));
//! ```

pub mod block;
pub mod element;
pub mod error;
pub mod format;
pub mod host;
mod lexer;
pub mod opts;
pub mod page;
pub mod position;
pub mod scope;
mod util;
pub mod value;

pub use block::{BlockId, BlockKind};
pub use element::{Element, Meta};
pub use error::{ParseError, VarError};
pub use host::{ImageDimensions, ImageSizer, LinkResolver, ModelSource, scale_dimensions};
pub use opts::PageOpts;
pub use page::{ModelInfo, Page, PageInfo};
pub use position::{Position, Warning};
pub use util::{category_name_ne, page_name_link, page_name_ne, scale_string};
pub use value::{Html, Value};
