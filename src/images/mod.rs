//! Image resolution and the conversion cache.
//!
//! A request path is anchored under the image root ([`RequestedImage`]),
//! checked for existence and against the format allow-list, and, for formats
//! that need conversion, mapped to a cache location ([`planner`]) that the
//! [`Converter`] fills on a miss. [`ImageResolver`] ties the steps together.

mod converter;
pub mod planner;
mod request;
mod resolver;

#[cfg(test)]
mod test_fixtures;

pub use converter::{ConvertError, Converter};
pub use planner::CachePlan;
pub use request::{sanitize_relative, RequestedImage};
pub use resolver::{ConvertedImage, ImageResolver, ServableImage};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::ImagesConfig;

/// The two directories resolution works against, both absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRoots {
    /// Directory holding the originals.
    pub image_root: PathBuf,
    /// Directory holding converted copies.
    pub cache_root: PathBuf,
}

impl ImageRoots {
    /// Resolve the configured directories to absolute paths.
    ///
    /// The image root must exist; the cache root is created if missing.
    pub fn resolve(config: &ImagesConfig) -> Result<Self> {
        let root = config
            .root
            .as_deref()
            .context("No image root configured (pass ROOT or set images.root)")?;

        let image_root = std::fs::canonicalize(root)
            .with_context(|| format!("Image root is not accessible: {:?}", root))?;
        if !image_root.is_dir() {
            anyhow::bail!("Image root is not a directory: {:?}", image_root);
        }

        let cache_dir = expand(&config.cache_dir);
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", cache_dir))?;
        let cache_root = std::fs::canonicalize(&cache_dir)
            .with_context(|| format!("Cache directory is not accessible: {:?}", cache_dir))?;

        if cache_root.starts_with(&image_root) {
            tracing::warn!(
                "Cache directory {:?} is inside the image root; converted files will be browsable",
                cache_root
            );
        }

        Ok(Self {
            image_root,
            cache_root,
        })
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}
