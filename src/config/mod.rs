mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./picserve.toml",
        "./config.toml",
        "~/.config/picserve/config.toml",
        "/etc/picserve/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let image_prefix = &config.server.image_path_prefix;
    let browse_prefix = &config.server.browse_path_prefix;
    for (name, prefix) in [
        ("image_path_prefix", image_prefix),
        ("browse_path_prefix", browse_prefix),
    ] {
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            anyhow::bail!(
                "{} must start with '/', must not end with '/' and must not be empty: {:?}",
                name,
                prefix
            );
        }
    }
    if image_prefix == browse_prefix {
        anyhow::bail!("image_path_prefix and browse_path_prefix must differ");
    }

    if config.conversion.max_concurrent == 0 {
        anyhow::bail!("conversion.max_concurrent must be at least 1");
    }

    if let Some(root) = &config.images.root {
        if !root.exists() {
            tracing::warn!("Image root does not exist: {:?}", root);
        }
    }

    Ok(())
}
