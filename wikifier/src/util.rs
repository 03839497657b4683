use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static NON_PAGE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w.\-/]").unwrap());
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

const PAGE_EXTENSIONS: &[&str] = &[".page", ".model", ".conf", ".md"];

/// Escape text for a quoted attribute value.
pub(crate) fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(text)
}

/// Escape text for an HTML text node.
pub(crate) fn escape_text(text: &str) -> Cow<'_, str> {
    html_escape::encode_text(text)
}

/// Replace every character that is not an ASCII word character with `_`.
pub(crate) fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `Some Article` becomes `Some_Article`.
pub fn page_name_link(name: &str) -> String {
    let name = name.trim().replace('\\', "/");
    NON_PAGE_CHARS.replace_all(&name, "_").into_owned()
}

/// A page name with any page-like extension removed.
pub fn page_name_ne(name: &str) -> String {
    let mut name = page_name_link(name);
    for ext in PAGE_EXTENSIONS {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped.to_string();
        }
    }
    name
}

pub fn category_name_ne(name: &str) -> String {
    let name = page_name_link(name);
    name.strip_suffix(".cat").map(str::to_string).unwrap_or(name)
}

/// Remove markup tags and decode entities, leaving plain text.
pub(crate) fn strip_tags(html: &str) -> String {
    let stripped = TAGS.replace_all(html, "");
    html_escape::decode_html_entities(&stripped).into_owned()
}

/// Retina `srcset` entries: `a.jpg` with scales 2 and 3 becomes
/// `a@2x.jpg 2x, a@3x.jpg 3x`.
pub fn scale_string(name: &str, retina: &[u32]) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    };
    retina
        .iter()
        .map(|scale| format!("{}@{}x{} {}x", stem, scale, ext, scale))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_normalize_non_word_chars() {
        assert_eq!(normalize_key("First Name"), "First_Name");
        assert_eq!(normalize_key("a-b.c"), "a_b_c");
        assert_eq!(normalize_key("héllo"), "h_llo");
    }

    #[test]
    fn page_names() {
        assert_eq!(page_name_link("  Some Article "), "Some_Article");
        assert_eq!(page_name_ne("Some Article.page"), "Some_Article");
        assert_eq!(page_name_ne("dir/Other"), "dir/Other");
        assert_eq!(category_name_ne("My Topic.cat"), "My_Topic");
    }

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            strip_tags("<span style=\"font-weight: bold;\">Tom</span> &amp; Jerry"),
            "Tom & Jerry"
        );
    }

    #[test]
    fn retina_scales() {
        assert_eq!(scale_string("a.jpg", &[2, 3]), "a@2x.jpg 2x, a@3x.jpg 3x");
        assert_eq!(scale_string("noext", &[2]), "noext@2x 2x");
    }
}
