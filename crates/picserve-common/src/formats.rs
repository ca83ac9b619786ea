//! Image format registry.
//!
//! Maps file extensions to the formats picserve accepts, the content type each
//! one is served with, and the conversion target for formats browsers cannot
//! render. Lookups are case-insensitive; extensions are normalized to the
//! uppercase, dot-prefixed form (`.HEIC`).

use std::fmt;
use std::path::Path;

/// An image format on the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Gif,
    Png,
    Jpeg,
    Webp,
    /// Accepted as input only; always converted before serving.
    Heic,
}

impl ImageFormat {
    /// Look up a format by extension. Accepts `.heic`, `heic`, `HEIC`, ...
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        match ext.to_ascii_uppercase().as_str() {
            "GIF" => Some(Self::Gif),
            "PNG" => Some(Self::Png),
            "JPEG" | "JPG" => Some(Self::Jpeg),
            "WEBP" => Some(Self::Webp),
            "HEIC" => Some(Self::Heic),
            _ => None,
        }
    }

    /// Look up the format of a path by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Content type used when serving this format, `None` if it is never
    /// served directly.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Gif => Some("image/gif"),
            Self::Png => Some("image/png"),
            Self::Jpeg => Some("image/jpeg"),
            Self::Webp => Some("image/webp"),
            Self::Heic => None,
        }
    }

    /// The format this one must be converted to before serving, if any.
    pub fn conversion_target(&self) -> Option<ImageFormat> {
        match self {
            Self::Heic => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Whether a request for this format requires conversion.
    pub fn needs_conversion(&self) -> bool {
        self.conversion_target().is_some()
    }

    /// Canonical file extension for files written in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Heic => "heic",
        }
    }

    /// Format tag understood by the conversion tool (`JPEG:out.jpeg`).
    pub fn magick_format(&self) -> &'static str {
        match self {
            Self::Gif => "GIF",
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Webp => "WEBP",
            Self::Heic => "HEIC",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.magick_format())
    }
}

/// Uppercase, dot-prefixed extension of `path` (`.HEIC`), or an empty string.
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_uppercase()))
        .unwrap_or_default()
}

/// Check if a path has an extension on the allow-list.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use picserve_common::formats::is_allowed;
///
/// assert!(is_allowed(Path::new("cat.JPG")));
/// assert!(is_allowed(Path::new("/pics/dog.heic")));
/// assert!(!is_allowed(Path::new("malware.exe")));
/// ```
pub fn is_allowed(path: &Path) -> bool {
    ImageFormat::from_path(path).is_some()
}

/// Content type a path is served with, derived from its extension.
///
/// Returns `None` for extensions outside the allow-list and for input-only
/// formats such as HEIC.
pub fn content_type(path: &Path) -> Option<&'static str> {
    ImageFormat::from_path(path).and_then(|format| format.content_type())
}

/// All allow-listed formats.
#[must_use]
pub fn allowed_formats() -> &'static [ImageFormat] {
    &[
        ImageFormat::Gif,
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Webp,
        ImageFormat::Heic,
    ]
}
