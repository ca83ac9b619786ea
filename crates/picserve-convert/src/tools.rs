//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Conversion tools picserve knows how to drive, in order of preference.
///
/// ImageMagick 7 ships `magick`; ImageMagick 6 only has `convert`.
pub const CONVERSION_TOOLS: &[&str] = &["magick", "convert"];

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available and get its information.
///
/// # Example
///
/// ```no_run
/// use picserve_convert::check_tool;
///
/// let info = check_tool("magick");
/// if info.available {
///     println!("magick version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "-version")
}

/// Check if a tool is available using a custom version argument.
fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let result = Command::new(name).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(name).ok();

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check all conversion tools.
pub fn check_tools() -> Vec<ToolInfo> {
    CONVERSION_TOOLS.iter().map(|name| check_tool(name)).collect()
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to the conversion tool, preferring a configured path over
/// PATH lookup.
pub fn find_conversion_tool(config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            path = %path.display(),
            "configured conversion tool does not exist, searching PATH"
        );
    }

    CONVERSION_TOOLS
        .iter()
        .find_map(|name| require_tool(name).ok())
        .ok_or_else(|| Error::tool_not_found(CONVERSION_TOOLS.join(" or ")))
}
