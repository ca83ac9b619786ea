//! ImageMagick-backed transcoder.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use picserve_common::ImageFormat;

use crate::command::ToolCommand;
use crate::tools::find_conversion_tool;
use crate::{Error, Result, Transcoder};

/// Converts images by running `magick <source> <FORMAT>:<target>`.
#[derive(Debug, Clone)]
pub struct MagickTranscoder {
    program: PathBuf,
}

impl MagickTranscoder {
    /// Use the given executable (either `magick` or the legacy `convert`).
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Locate ImageMagick, preferring `configured` over a PATH search.
    pub fn discover(configured: Option<&Path>) -> Result<Self> {
        let program = find_conversion_tool(configured)?;
        tracing::debug!(program = %program.display(), "using ImageMagick");
        Ok(Self::new(program))
    }

    /// Path of the executable this transcoder runs.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, source: &Path, target: &Path, format: ImageFormat) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.arg(source.to_string_lossy())
            .arg(format!("{}:{}", format.magick_format(), target.to_string_lossy()));
        cmd
    }
}

#[async_trait]
impl Transcoder for MagickTranscoder {
    fn name(&self) -> &str {
        "imagemagick"
    }

    async fn transcode(&self, source: &Path, target: &Path, format: ImageFormat) -> Result<()> {
        if format.content_type().is_none() {
            return Err(Error::Unsupported(format!("{format} is not a servable output format")));
        }

        let cmd = self.command(source, target, format);
        tracing::info!(command = %cmd.display(), "converter: start");
        cmd.execute().await?;

        // The caller may hand over an empty, pre-created file.
        match tokio::fs::metadata(target).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => {
                return Err(Error::MissingOutput {
                    tool: self.program.display().to_string(),
                    path: target.to_path_buf(),
                })
            }
        }

        tracing::info!(command = %cmd.display(), "converter: finished");
        Ok(())
    }
}
