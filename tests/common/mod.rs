//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which lays out an image root and a cache root in
//! temporary directories and wires a [`FakeTranscoder`] into a full
//! [`AppContext`]. The [`TestHarness::with_server`] constructor starts Axum on
//! a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use picserve::config::Config;
use picserve::images::{Converter, ImageResolver, ImageRoots};
use picserve::server::{create_router, AppContext};
use picserve_common::ImageFormat;
use picserve_convert::Transcoder;
use tempfile::TempDir;

/// Transcoder that writes `converted:<source bytes>` instead of running
/// ImageMagick, and fails on sources whose content starts with `broken`.
#[derive(Default)]
pub struct FakeTranscoder {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeTranscoder {
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcode(
        &self,
        source: &Path,
        target: &Path,
        _format: ImageFormat,
    ) -> picserve_convert::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), target.to_path_buf()));

        let data = tokio::fs::read(source).await?;
        if data.starts_with(b"broken") {
            return Err(picserve_convert::Error::tool_failed(
                "fake",
                "improper image header",
            ));
        }

        let mut out = b"converted:".to_vec();
        out.extend(data);
        tokio::fs::write(target, out).await?;
        Ok(())
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] over temporary
/// image and cache directories.
pub struct TestHarness {
    pub ctx: AppContext,
    pub roots: ImageRoots,
    pub transcoder: Arc<FakeTranscoder>,
    _image_dir: TempDir,
    _cache_dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a new harness with a custom configuration. The image and cache
    /// roots are always temporary directories.
    pub fn with_config(mut config: Config) -> Self {
        let image_dir = tempfile::tempdir().expect("failed to create image dir");
        let cache_dir = tempfile::tempdir().expect("failed to create cache dir");

        config.images.root = Some(image_dir.path().to_path_buf());
        config.images.cache_dir = cache_dir.path().to_path_buf();
        let roots = ImageRoots::resolve(&config.images).expect("failed to resolve roots");

        let transcoder = Arc::new(FakeTranscoder::default());
        let converter = Arc::new(Converter::new(
            transcoder.clone(),
            config.conversion.max_concurrent,
        ));
        let resolver = Arc::new(ImageResolver::new(roots.clone(), converter));

        Self {
            ctx: AppContext::new(config, resolver),
            roots,
            transcoder,
            _image_dir: image_dir,
            _cache_dir: cache_dir,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Write an image (or any file) under the image root.
    pub fn put(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.roots.image_root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Path of a cache entry.
    pub fn cached(&self, relative: &str) -> PathBuf {
        self.roots.cache_root.join(relative)
    }
}
