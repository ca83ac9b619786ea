//! Cache path planning.
//!
//! Converted images live under the cache root at the same relative path as
//! the request, with the extension swapped for the target format:
//! `a/b/photo.heic` is cached at `<cache_root>/a/b/photo.jpeg`.

use std::io;
use std::path::{Path, PathBuf};

use picserve_common::ImageFormat;

/// Where a converted image goes and whether it is already there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePlan {
    /// Absolute path of the converted file.
    pub target: PathBuf,
    /// A regular file already exists at `target`.
    pub cached: bool,
}

/// Cache location of `requested` (relative) once converted to `format`.
pub fn cache_path(cache_root: &Path, requested: &Path, format: ImageFormat) -> PathBuf {
    cache_root.join(requested.with_extension(format.extension()))
}

/// Whether `path` is a regular file (symlinks followed).
pub fn is_cached_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Plan the cache target for `requested` converted to `format`.
///
/// On a cache hit nothing on disk is touched. Otherwise the parent directory
/// is created, replacing any plain file that sits where a directory of the
/// cache tree should be, and a directory squatting on the target itself is
/// removed.
pub fn plan_target(cache_root: &Path, requested: &Path, format: ImageFormat) -> io::Result<CachePlan> {
    let target = cache_path(cache_root, requested, format);

    match std::fs::metadata(&target) {
        Ok(meta) if meta.is_file() => {
            tracing::debug!(target = %target.display(), "cache hit");
            return Ok(CachePlan {
                target,
                cached: true,
            });
        }
        Ok(meta) if meta.is_dir() => {
            tracing::warn!(target = %target.display(), "removing directory at cache target");
            std::fs::remove_dir_all(&target)?;
        }
        Ok(_) => {}
        // Missing, or an ancestor is not a directory; repaired below.
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = target.parent() {
        repair_ancestors(cache_root, parent)?;
        std::fs::create_dir_all(parent)?;
    }

    Ok(CachePlan {
        target,
        cached: false,
    })
}

/// Remove non-directory entries on the way from `cache_root` down to `dir`.
fn repair_ancestors(cache_root: &Path, dir: &Path) -> io::Result<()> {
    let Ok(relative) = dir.strip_prefix(cache_root) else {
        return Ok(());
    };

    let mut current = cache_root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => {}
            Ok(meta) if meta.file_type().is_symlink() && current.is_dir() => {}
            Ok(_) => {
                tracing::warn!(
                    path = %current.display(),
                    "cache directory is a file, replacing it"
                );
                std::fs::remove_file(&current)?;
                // Everything below was unreachable anyway.
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
