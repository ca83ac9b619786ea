use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Route prefix under which images are served (no trailing slash)
    #[serde(default = "default_image_path_prefix")]
    pub image_path_prefix: String,

    /// Route prefix of the directory browser (no trailing slash)
    #[serde(default = "default_browse_path_prefix")]
    pub browse_path_prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_image_path_prefix() -> String {
    "/images".to_string()
}
fn default_browse_path_prefix() -> String {
    "/browse".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            image_path_prefix: default_image_path_prefix(),
            browse_path_prefix: default_browse_path_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagesConfig {
    /// Directory holding the original images. Usually given on the command line.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Directory where converted images are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./converted")
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            root: None,
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Maximum number of conversions running at once (1 = fully serialized)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    2
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Explicit path to `magick` (or the legacy `convert`)
    #[serde(default)]
    pub magick_path: Option<PathBuf>,
}
