//! Stand-in transcoder for hosts without ImageMagick.

use std::path::Path;

use async_trait::async_trait;
use picserve_common::ImageFormat;

use crate::{Error, Result, Transcoder};

/// Fails every conversion with [`Error::ToolNotFound`].
///
/// Lets the server start and keep serving browser-native images when no
/// conversion tool could be found.
#[derive(Debug, Clone)]
pub struct UnavailableTranscoder {
    tool: String,
}

impl UnavailableTranscoder {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

#[async_trait]
impl Transcoder for UnavailableTranscoder {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn transcode(&self, source: &Path, _target: &Path, format: ImageFormat) -> Result<()> {
        tracing::warn!(
            source = %source.display(),
            %format,
            tool = %self.tool,
            "conversion requested but no conversion tool is installed"
        );
        Err(Error::tool_not_found(self.tool.clone()))
    }
}
