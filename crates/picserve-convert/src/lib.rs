//! # picserve-convert
//!
//! The external image-conversion capability used by picserve.
//!
//! This crate provides:
//! - The [`Transcoder`] trait: "convert file A to file B in format F, or fail"
//! - [`MagickTranscoder`], which shells out to ImageMagick
//! - [`UnavailableTranscoder`], which fails every conversion
//! - External tool detection for the `check-tools` command
//!
//! ## Example
//!
//! ```no_run
//! use picserve_common::ImageFormat;
//! use picserve_convert::{MagickTranscoder, Transcoder};
//! use std::path::Path;
//!
//! # async fn example() -> picserve_convert::Result<()> {
//! let transcoder = MagickTranscoder::discover(None)?;
//! transcoder
//!     .transcode(Path::new("dog.heic"), Path::new("dog.jpeg"), ImageFormat::Jpeg)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod command;
mod error;
mod magick;
pub mod tools;
mod unavailable;

use std::path::Path;

use async_trait::async_trait;
use picserve_common::ImageFormat;

// Re-exports
pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use magick::MagickTranscoder;
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};
pub use unavailable::UnavailableTranscoder;

/// An opaque image transcode capability.
///
/// Implementations write a file at `target` encoded as `format`, or fail.
/// They are not required to be safe for concurrent use on the same target;
/// callers serialize invocations per target.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Convert `source` into `format`, writing the result to `target`.
    async fn transcode(&self, source: &Path, target: &Path, format: ImageFormat) -> Result<()>;
}
