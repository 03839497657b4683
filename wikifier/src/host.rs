//! Capabilities a host application injects into a page.
//!
//! All of them are pure from the page's point of view: they answer
//! questions about the outside world and never mutate the page.

use serde::Serialize;

/// Final dimensions chosen for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
    /// The requested size is the image's natural size.
    pub full_size: bool,
}

/// Computes image dimensions and derived file paths for `server` sizing.
pub trait ImageSizer: Send + Sync {
    /// Fill in whichever of `width`/`height` is zero.
    fn dimensions(&self, file: &str, width: u32, height: u32) -> ImageDimensions;

    /// Web path of `file` scaled to exactly `width` x `height`.
    fn sized_path(&self, file: &str, width: u32, height: u32) -> String;
}

/// Answers whether link targets exist.
pub trait LinkResolver: Send + Sync {
    fn page_exists(&self, name: &str) -> bool;
    fn category_exists(&self, name: &str) -> bool;
}

/// Supplies the source of `$name{}` model blocks.
pub trait ModelSource: Send + Sync {
    fn model_source(&self, name: &str) -> Option<String>;
}

/// Scale a full-size image to the requested box, preserving aspect ratio.
///
/// A zero `width` or `height` is derived from the other (rounding half
/// up); both zero means the natural size.
pub fn scale_dimensions(full_width: u32, full_height: u32, width: u32, height: u32) -> ImageDimensions {
    let (width, height) = match (width, height) {
        (0, 0) => (full_width, full_height),
        (0, h) if full_height != 0 => (ratio(full_width, h, full_height), h),
        (w, 0) if full_width != 0 => (w, ratio(full_height, w, full_width)),
        (w, h) => (w, h),
    };
    ImageDimensions {
        width,
        height,
        full_size: width == full_width && height == full_height,
    }
}

fn ratio(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(numerator);
    let denominator = u64::from(denominator);
    ((scaled * 2 + denominator) / (denominator * 2)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_missing_dimension() {
        assert_eq!(
            scale_dimensions(400, 300, 200, 0),
            ImageDimensions { width: 200, height: 150, full_size: false }
        );
        assert_eq!(
            scale_dimensions(400, 300, 0, 100),
            ImageDimensions { width: 133, height: 100, full_size: false }
        );
    }

    #[test]
    fn rounds_half_up() {
        // 3 * 5 / 2 = 7.5
        assert_eq!(scale_dimensions(2, 3, 5, 0).height, 8);
    }

    #[test]
    fn natural_size() {
        assert_eq!(
            scale_dimensions(640, 480, 0, 0),
            ImageDimensions { width: 640, height: 480, full_size: true }
        );
    }
}
