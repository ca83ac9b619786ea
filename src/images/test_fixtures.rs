use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use picserve_common::ImageFormat;
use picserve_convert::Transcoder;

/// Transcoder that records its calls and writes a marker file instead of
/// running ImageMagick.
#[derive(Default)]
pub struct RecordingTranscoder {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    delay: Duration,
    fail: bool,
    two_step: bool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Writes the first half of its output, waits `delay`, then writes the
    /// rest, the way a real encoder fills its output file.
    pub fn in_two_steps(delay: Duration) -> Self {
        Self {
            delay,
            two_step: true,
            ..Self::default()
        }
    }

    /// Writes a partial file, then fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of transcodes observed running at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for RecordingTranscoder {
    fn name(&self) -> &str {
        "recording"
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

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let mut data = b"converted:".to_vec();
        data.extend(tokio::fs::read(source).await?);

        if self.two_step {
            tokio::fs::write(target, &data[..data.len() / 2]).await?;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            tokio::fs::write(target, b"partial").await?;
            return Err(picserve_convert::Error::tool_failed(
                "recording",
                "no decode delegate for this image format `HEIC'",
            ));
        }

        tokio::fs::write(target, data).await?;
        Ok(())
    }
}
