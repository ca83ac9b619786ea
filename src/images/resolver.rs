//! Request path → servable file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use picserve_common::{Error, ImageFormat, Result};

use super::converter::Converter;
use super::planner::{self, CachePlan};
use super::request::RequestedImage;
use super::ImageRoots;

/// Content type used if a servable path somehow has no registry entry.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A file ready to be streamed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServableImage {
    /// Absolute path of the original or of the converted copy.
    pub path: PathBuf,
    /// Content type derived from the extension of `path`.
    pub content_type: &'static str,
}

impl ServableImage {
    fn from_path(path: PathBuf) -> Self {
        let content_type =
            picserve_common::formats::content_type(&path).unwrap_or(FALLBACK_CONTENT_TYPE);
        Self { path, content_type }
    }
}

/// A converted copy of a requested image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    /// Location under the cache root.
    pub converted_abs_path: PathBuf,
    /// A valid file exists at `converted_abs_path`.
    pub is_converted: bool,
}

/// Resolves requested paths against the image root, converting on demand.
///
/// Cheap to share: hold it in an `Arc` and call [`resolve`](Self::resolve)
/// from as many tasks as needed.
pub struct ImageResolver {
    roots: ImageRoots,
    converter: Arc<Converter>,
}

impl ImageResolver {
    pub fn new(roots: ImageRoots, converter: Arc<Converter>) -> Self {
        Self { roots, converter }
    }

    pub fn roots(&self) -> &ImageRoots {
        &self.roots
    }

    /// Resolve `requested` (relative to the image root) to a servable file.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAllowed`] if the path escapes the image root
    /// - [`Error::NotFound`] if nothing exists at the path
    /// - [`Error::NotAllowed`] if the extension is not on the allow-list
    /// - [`Error::Internal`] if preparing the cache or converting fails
    pub async fn resolve(&self, requested: &str) -> Result<ServableImage> {
        let image = RequestedImage::new(&self.roots.image_root, requested)?;

        if !is_regular_file(image.requested_abs_path()).await? {
            return Err(Error::not_found(image.requested_path()));
        }

        let Some(format) = image.format() else {
            return Err(Error::not_allowed(
                image.requested_path(),
                format!("extension {:?} is not allowed", image.extension()),
            ));
        };

        let servable = match format.conversion_target() {
            Some(target_format) => {
                let converted = self.convert(&image, target_format).await?;
                if !converted.is_converted {
                    return Err(Error::internal(
                        format!("failed to convert {}", image.requested_path().display()),
                        format!(
                            "no file at {} after conversion",
                            converted.converted_abs_path.display()
                        ),
                    ));
                }
                ServableImage::from_path(converted.converted_abs_path)
            }
            None => ServableImage::from_path(image.requested_abs_path().to_path_buf()),
        };

        tracing::debug!(
            requested = %image.requested_path().display(),
            path = %servable.path.display(),
            content_type = servable.content_type,
            "resolved image"
        );
        Ok(servable)
    }

    async fn convert(
        &self,
        image: &RequestedImage,
        target_format: ImageFormat,
    ) -> Result<ConvertedImage> {
        let plan = self.plan(image.requested_path(), target_format).await?;

        if !plan.cached {
            self.converter
                .convert(image.requested_abs_path(), &plan.target, target_format)
                .await
                .map_err(|e| {
                    Error::internal(
                        format!("failed to convert {}", image.requested_path().display()),
                        e,
                    )
                })?;
        }

        let is_converted = is_regular_file(&plan.target).await?;
        Ok(ConvertedImage {
            converted_abs_path: plan.target,
            is_converted,
        })
    }

    async fn plan(&self, requested: &Path, target_format: ImageFormat) -> Result<CachePlan> {
        let cache_root = self.roots.cache_root.clone();
        let requested = requested.to_path_buf();

        tokio::task::spawn_blocking(move || {
            planner::plan_target(&cache_root, &requested, target_format).map_err(|e| {
                Error::internal(
                    format!("failed to prepare cache entry for {}", requested.display()),
                    e,
                )
            })
        })
        .await
        .map_err(|e| Error::internal("cache planning task failed", e))?
    }
}

/// Whether `path` is a regular file, following symlinks. Directories and
/// dangling links count as missing.
async fn is_regular_file(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        // A file where a directory was expected (`cat.jpg/x.png`).
        Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => Ok(false),
        Err(e) => Err(Error::internal(format!("failed to stat {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::test_fixtures::RecordingTranscoder;
    use assert_matches::assert_matches;
    use std::time::Duration;

    struct Fixture {
        _root: tempfile::TempDir,
        _cache: tempfile::TempDir,
        roots: ImageRoots,
        fake: Arc<RecordingTranscoder>,
        resolver: Arc<ImageResolver>,
    }

    fn fixture_with(fake: RecordingTranscoder, max_concurrent: usize) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let roots = ImageRoots {
            image_root: root.path().to_path_buf(),
            cache_root: cache.path().to_path_buf(),
        };
        let fake = Arc::new(fake);
        let converter = Arc::new(Converter::new(fake.clone(), max_concurrent));
        let resolver = Arc::new(ImageResolver::new(roots.clone(), converter));
        Fixture {
            _root: root,
            _cache: cache,
            roots,
            fake,
            resolver,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingTranscoder::new(), 1)
    }

    impl Fixture {
        fn put(&self, rel: &str, data: &[u8]) {
            let path = self.roots.image_root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, data).unwrap();
        }
    }

    #[tokio::test]
    async fn serves_jpeg_as_is() {
        let f = fixture();
        f.put("cat.jpg", b"jpeg");

        let servable = f.resolver.resolve("/cat.jpg").await.unwrap();

        assert_eq!(
            servable,
            ServableImage {
                path: f.roots.image_root.join("cat.jpg"),
                content_type: "image/jpeg",
            }
        );
        assert_eq!(f.fake.call_count(), 0);
    }

    #[tokio::test]
    async fn converts_heic_into_cache() {
        let f = fixture();
        f.put("dog.heic", b"heic");

        let servable = f.resolver.resolve("/dog.heic").await.unwrap();

        let expected = f.roots.cache_root.join("dog.jpeg");
        assert_eq!(servable.path, expected);
        assert_eq!(servable.content_type, "image/jpeg");
        let calls = f.fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, f.roots.image_root.join("dog.heic"));
        assert_eq!(std::fs::read(expected).unwrap(), b"converted:heic");
    }

    #[tokio::test]
    async fn second_resolution_hits_cache() {
        let f = fixture();
        f.put("a/b/photo.HEIC", b"heic");

        let first = f.resolver.resolve("a/b/photo.HEIC").await.unwrap();
        let modified = std::fs::metadata(&first.path).unwrap().modified().unwrap();
        let second = f.resolver.resolve("a/b/photo.HEIC").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.path, f.roots.cache_root.join("a/b/photo.jpeg"));
        assert_eq!(f.fake.call_count(), 1);
        assert_eq!(std::fs::metadata(&second.path).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let f = fixture();
        let err = f.resolver.resolve("/missing.png").await.unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        // Existence is checked before the allow-list.
        let err = f.resolver.resolve("/missing.exe").await.unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
    }

    #[tokio::test]
    async fn disallowed_extension_is_not_allowed() {
        let f = fixture();
        f.put("malware.exe", b"MZ");
        f.put("notes", b"text");

        let err = f.resolver.resolve("/malware.exe").await.unwrap_err();
        assert_matches!(err, Error::NotAllowed { .. });
        assert!(err.to_string().contains(".EXE"));

        let err = f.resolver.resolve("/notes").await.unwrap_err();
        assert_matches!(err, Error::NotAllowed { .. });
    }

    #[tokio::test]
    async fn directory_named_like_an_image_is_not_found() {
        let f = fixture();
        std::fs::create_dir_all(f.roots.image_root.join("album.jpg")).unwrap();
        std::fs::create_dir_all(f.roots.image_root.join("burst.heic")).unwrap();

        let err = f.resolver.resolve("album.jpg").await.unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        let err = f.resolver.resolve("burst.heic").await.unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
        assert_eq!(f.fake.call_count(), 0);
    }

    #[tokio::test]
    async fn traversal_is_not_allowed() {
        let f = fixture();
        let err = f.resolver.resolve("/../etc/passwd.png").await.unwrap_err();
        assert_matches!(err, Error::NotAllowed { .. });
    }

    #[tokio::test]
    async fn repairs_file_at_cache_parent() {
        let f = fixture();
        f.put("album/pic.heic", b"heic");
        std::fs::write(f.roots.cache_root.join("album"), b"garbage").unwrap();

        let servable = f.resolver.resolve("album/pic.heic").await.unwrap();

        assert!(f.roots.cache_root.join("album").is_dir());
        assert!(servable.path.is_file());
        assert_eq!(servable.path, f.roots.cache_root.join("album/pic.jpeg"));
    }

    #[tokio::test]
    async fn conversion_failure_is_internal() {
        let f = fixture_with(RecordingTranscoder::failing(), 1);
        f.put("dog.heic", b"heic");

        let err = f.resolver.resolve("dog.heic").await.unwrap_err();

        assert_matches!(err, Error::Internal { .. });
        assert!(err.to_string().contains("failed to convert dog.heic"));
        assert!(!f.roots.cache_root.join("dog.jpeg").exists());
    }

    #[tokio::test]
    async fn missing_conversion_tool_only_affects_heic() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let roots = ImageRoots {
            image_root: root.path().to_path_buf(),
            cache_root: cache.path().to_path_buf(),
        };
        let converter = Arc::new(Converter::new(
            Arc::new(picserve_convert::UnavailableTranscoder::new("magick")),
            1,
        ));
        let resolver = ImageResolver::new(roots.clone(), converter);
        std::fs::write(root.path().join("cat.jpg"), b"jpeg").unwrap();
        std::fs::write(root.path().join("dog.heic"), b"heic").unwrap();

        let servable = resolver.resolve("cat.jpg").await.unwrap();
        assert_eq!(servable.path, roots.image_root.join("cat.jpg"));

        let err = resolver.resolve("dog.heic").await.unwrap_err();
        assert_matches!(err, Error::Internal { .. });
        assert!(std::fs::read_dir(cache.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn request_during_conversion_waits_for_complete_file() {
        let f = fixture_with(
            RecordingTranscoder::in_two_steps(Duration::from_millis(300)),
            1,
        );
        f.put("dog.heic", b"heic");

        let first = {
            let resolver = f.resolver.clone();
            tokio::spawn(async move { resolver.resolve("dog.heic").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = f.resolver.resolve("dog.heic").await.unwrap();
        assert_eq!(std::fs::read(&second.path).unwrap(), b"converted:heic");

        let first = first.await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(f.fake.call_count(), 1);
    }

    #[tokio::test]
    async fn cache_write_failure_is_internal() {
        let f = fixture();
        f.put("dog.heic", b"heic");
        // A cache root beneath a regular file can never be created.
        let blocker = f.roots.image_root.join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let roots = ImageRoots {
            image_root: f.roots.image_root.clone(),
            cache_root: blocker.join("cache"),
        };
        let resolver = ImageResolver::new(
            roots,
            Arc::new(Converter::new(f.fake.clone(), 1)),
        );

        let err = resolver.resolve("dog.heic").await.unwrap_err();

        assert_matches!(err, Error::Internal { .. });
        assert_eq!(f.fake.call_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unwritable_cache_is_internal() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture();
        f.put("a/dog.heic", b"heic");
        let cache = &f.roots.cache_root;
        std::fs::set_permissions(cache, std::fs::Permissions::from_mode(0o500)).unwrap();
        // Privileged users ignore directory modes.
        if std::fs::create_dir(cache.join("write-check")).is_ok() {
            std::fs::set_permissions(cache, std::fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }

        let result = f.resolver.resolve("a/dog.heic").await;
        std::fs::set_permissions(cache, std::fs::Permissions::from_mode(0o700)).unwrap();

        assert_matches!(result, Err(Error::Internal { .. }));
        assert_eq!(f.fake.call_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_distinct_images_all_convert_once() {
        let f = fixture_with(RecordingTranscoder::with_delay(Duration::from_millis(20)), 3);
        for i in 0..8 {
            f.put(&format!("batch/img{i}.heic"), format!("heic{i}").as_bytes());
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let resolver = f.resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver.resolve(&format!("batch/img{i}.heic")).await
            }));
        }

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap().path);
        }
        paths.sort();
        paths.dedup();

        assert_eq!(paths.len(), 8);
        assert_eq!(f.fake.call_count(), 8);
        let mut targets: Vec<_> = f.fake.calls().into_iter().map(|(_, t)| t).collect();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), 8);
        for i in 0..8 {
            let path = f.roots.cache_root.join(format!("batch/img{i}.jpeg"));
            assert_eq!(std::fs::read(path).unwrap(), format!("converted:heic{i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn concurrent_same_image_converts_once() {
        let f = fixture_with(RecordingTranscoder::with_delay(Duration::from_millis(20)), 3);
        f.put("dog.heic", b"heic");

        let mut handles = Vec::new();
        for _ in 0..6 {
            let resolver = f.resolver.clone();
            handles.push(tokio::spawn(async move { resolver.resolve("dog.heic").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(f.fake.call_count(), 1);
    }
}
