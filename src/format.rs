//! The format registry: the closed set of image formats this engine knows.
//!
//! Tokens are matched case-insensitively and `jpeg` is folded into `jpg`,
//! so `"JPEG"`, `"jpeg"` and `"jpg"` all resolve to [`Format::Jpg`].
//!
//! Two formats are *optimize-only*: SVG (vector) and GIF (animated). The
//! engine never resizes them and never converts them to another raster
//! format — the only operation they ever receive is an optional
//! compression pass.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Svg,
    Gif,
    Png,
    Jpg,
    Webp,
    Avif,
}

impl Format {
    /// Resolve a format token (an extension without the dot).
    ///
    /// Returns `None` for anything outside the registry — never an error.
    pub fn from_token(token: &str) -> Option<Self> {
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "svg" => Some(Format::Svg),
            "gif" => Some(Format::Gif),
            "png" => Some(Format::Png),
            "jpg" | "jpeg" => Some(Format::Jpg),
            "webp" => Some(Format::Webp),
            "avif" => Some(Format::Avif),
            _ => None,
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Svg => "svg",
            Format::Gif => "gif",
            Format::Png => "png",
            Format::Jpg => "jpg",
            Format::Webp => "webp",
            Format::Avif => "avif",
        }
    }

    /// Vector formats have no fixed pixel grid to resize.
    pub fn is_vector_only(self) -> bool {
        matches!(self, Format::Svg)
    }

    /// Animated formats would lose frames under a single-frame re-encode.
    pub fn is_animated_only(self) -> bool {
        matches!(self, Format::Gif)
    }

    /// Optimize-only formats are never resized or cross-converted.
    pub fn is_optimize_only(self) -> bool {
        self.is_vector_only() || self.is_animated_only()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Check whether a token names a supported format.
pub fn is_supported_type(token: &str) -> bool {
    Format::from_token(token).is_some()
}
