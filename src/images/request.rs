//! Client-requested image paths.

use std::path::{Component, Path, PathBuf};

use picserve_common::formats::{self, ImageFormat};
use picserve_common::{Error, Result};

/// An image path as requested by a client, anchored under the image root.
///
/// Construction rejects anything that could leave the root: `..`, absolute
/// components and drive prefixes. Leading slashes and `.` segments are
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedImage {
    requested_path: PathBuf,
    requested_abs_path: PathBuf,
    extension: String,
}

impl RequestedImage {
    /// Anchor `requested` under `image_root`.
    pub fn new(image_root: &Path, requested: &str) -> Result<Self> {
        let requested_path = sanitize_relative(requested)?;
        let requested_abs_path = image_root.join(&requested_path);
        let extension = formats::extension(&requested_path);

        Ok(Self {
            requested_path,
            requested_abs_path,
            extension,
        })
    }

    /// Relative path as requested (sanitized).
    pub fn requested_path(&self) -> &Path {
        &self.requested_path
    }

    /// Absolute path of the original under the image root.
    pub fn requested_abs_path(&self) -> &Path {
        &self.requested_abs_path
    }

    /// Uppercase, dot-prefixed extension (`.HEIC`), empty if none.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The allow-listed format of the request, if any.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_extension(&self.extension)
    }
}

/// Turn a client-supplied path into a relative path that stays below the
/// directory it is joined to.
///
/// An empty result is allowed and refers to the root itself.
pub fn sanitize_relative(requested: &str) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(requested.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::not_allowed(
                    requested,
                    "parent directory segments are not allowed",
                ))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::not_allowed(requested, "absolute paths are not allowed"))
            }
        }
    }
    Ok(clean)
}
