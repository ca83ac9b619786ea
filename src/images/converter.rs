//! Coalescing front-end to the external conversion capability.
//!
//! One conversion runs per distinct target path. Concurrent requests for the
//! same target wait on the conversion that is already in flight; conversions
//! of different targets run in parallel, bounded by a semaphore. Each
//! conversion runs on its own task so a disconnecting client never cancels
//! it half way.
//!
//! The transcoder writes into a hidden staging file next to the target, which
//! is renamed into place only once the conversion succeeded. A regular file
//! at the target path is therefore always a complete conversion.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use picserve_common::ImageFormat;
use picserve_convert::Transcoder;
use tempfile::TempPath;
use tokio::sync::{watch, Semaphore};

/// Prefix of staging files; the leading dot keeps them out of listings.
const STAGING_PREFIX: &str = ".picserve-";

/// Why a conversion did not produce a file.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    /// The external capability failed; its error is shared by every waiter.
    #[error(transparent)]
    Transcode(Arc<picserve_convert::Error>),

    /// Staging the output or moving it into place failed.
    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// The conversion task went away without reporting a result.
    #[error("conversion of {} ended without a result", .0.display())]
    Abandoned(PathBuf),
}

impl ConvertError {
    fn output(path: &Path, source: io::Error) -> Self {
        Self::Output {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }
}

type Outcome = Result<(), ConvertError>;
type InFlight = DashMap<PathBuf, watch::Receiver<Option<Outcome>>>;

/// Runs conversions through a [`Transcoder`], at most one per target.
pub struct Converter {
    transcoder: Arc<dyn Transcoder>,
    in_flight: Arc<InFlight>,
    permits: Arc<Semaphore>,
}

impl Converter {
    /// `max_concurrent` bounds how many conversions run at once; 1 serializes
    /// every conversion in the process.
    pub fn new(transcoder: Arc<dyn Transcoder>, max_concurrent: usize) -> Self {
        Self {
            transcoder,
            in_flight: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Number of targets currently being converted.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Convert `source` to `format`, writing `target`.
    ///
    /// Returns without doing work if `target` is already a regular file by
    /// the time the conversion is allowed to run.
    pub async fn convert(&self, source: &Path, target: &Path, format: ImageFormat) -> Outcome {
        let rx = match self.in_flight.entry(target.to_path_buf()) {
            Entry::Occupied(e) => {
                tracing::debug!(target = %target.display(), "joining in-flight conversion");
                e.get().clone()
            }
            Entry::Vacant(e) => {
                let (tx, rx) = watch::channel(None);
                e.insert(rx.clone());
                self.spawn_conversion(tx, source.to_path_buf(), target.to_path_buf(), format);
                rx
            }
        };

        wait_for_outcome(rx, target).await
    }

    fn spawn_conversion(
        &self,
        tx: watch::Sender<Option<Outcome>>,
        source: PathBuf,
        target: PathBuf,
        format: ImageFormat,
    ) {
        let transcoder = self.transcoder.clone();
        let permits = self.permits.clone();
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            target: target.clone(),
        };

        tokio::spawn(async move {
            let outcome = run_conversion(transcoder.as_ref(), &permits, &source, &target, format).await;
            tx.send_replace(Some(outcome));
            drop(guard);
        });
    }
}

/// Removes the in-flight entry when the conversion task ends, including by
/// panic.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    target: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.target);
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<Option<Outcome>>, target: &Path) -> Outcome {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(ConvertError::Abandoned(target.to_path_buf())))
}

async fn run_conversion(
    transcoder: &dyn Transcoder,
    permits: &Semaphore,
    source: &Path,
    target: &Path,
    format: ImageFormat,
) -> Outcome {
    let _permit = permits
        .acquire()
        .await
        .map_err(|_| ConvertError::Abandoned(target.to_path_buf()))?;

    if let Ok(meta) = tokio::fs::metadata(target).await {
        if meta.is_file() {
            tracing::debug!(target = %target.display(), "already converted");
            return Ok(());
        }
    }

    let staged = staging_file(target).map_err(|e| ConvertError::output(target, e))?;

    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        transcoder = transcoder.name(),
        "converting image"
    );
    let started = Instant::now();

    match transcoder.transcode(source, &staged, format).await {
        Ok(()) => {
            staged
                .persist(target)
                .map_err(|e| ConvertError::output(target, e.error))?;
            tracing::info!(
                target = %target.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "conversion finished"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                source = %source.display(),
                target = %target.display(),
                error = %e,
                "conversion failed"
            );
            discard(staged);
            Err(ConvertError::Transcode(Arc::new(e)))
        }
    }
}

/// Create an empty staging file in the target's directory, keeping the
/// target's extension.
fn staging_file(target: &Path) -> io::Result<TempPath> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::other("conversion target has no parent directory"))?;
    let suffix = target
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let file = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(&suffix)
        .tempfile_in(parent)?;
    Ok(file.into_temp_path())
}

fn discard(staged: TempPath) {
    let path = staged.to_path_buf();
    match staged.close() {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove partial output: {e}"),
    }
}
