use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "picserve")]
#[command(author, version, about = "Serve a photo directory over HTTP, converting HEIC on demand")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve images and the directory browser
    Start {
        /// Directory holding the images (overrides images.root)
        root: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for converted images (overrides images.cache_dir)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Convert every image that needs it ahead of time
    Warm {
        /// Directory holding the images (overrides images.root)
        root: Option<PathBuf>,

        /// Directory for converted images (overrides images.cache_dir)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Check that the external conversion tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
