mod cli;

use picserve::{
    config::{self, Config},
    images::{planner, Converter, ImageResolver, ImageRoots},
    server,
};
use picserve_common::ImageFormat;
use picserve_convert::{MagickTranscoder, Transcoder, UnavailableTranscoder};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pick the transcoder: ImageMagick when installed, otherwise a stand-in
/// that fails every conversion if `require_magick` is off.
fn build_transcoder(config: &Config, require_magick: bool) -> Result<Arc<dyn Transcoder>> {
    match MagickTranscoder::discover(config.tools.magick_path.as_deref()) {
        Ok(transcoder) => {
            tracing::info!("Using ImageMagick at {:?}", transcoder.program());
            Ok(Arc::new(transcoder))
        }
        Err(e) if !require_magick => {
            tracing::warn!(
                "ImageMagick not available ({}); HEIC requests will fail until it is installed",
                e
            );
            Ok(Arc::new(UnavailableTranscoder::new("magick")))
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context("ImageMagick is required to convert HEIC images (run `picserve check-tools`)")),
    }
}

/// Wire the configured transcoder, converter and resolver together.
fn build_resolver(config: &Config, require_magick: bool) -> Result<Arc<ImageResolver>> {
    let roots = ImageRoots::resolve(&config.images)?;
    tracing::info!("Image root: {:?}", roots.image_root);
    tracing::info!("Cache directory: {:?}", roots.cache_root);

    let transcoder = build_transcoder(config, require_magick)?;
    let converter = Arc::new(Converter::new(transcoder, config.conversion.max_concurrent));
    Ok(Arc::new(ImageResolver::new(roots, converter)))
}

fn apply_overrides(config: &mut Config, root: Option<PathBuf>, cache_dir: Option<PathBuf>) {
    if let Some(root) = root {
        config.images.root = Some(root);
    }
    if let Some(cache_dir) = cache_dir {
        config.images.cache_dir = cache_dir;
    }
}

async fn start_server(config: Config) -> Result<()> {
    config::validate_config(&config)?;

    tracing::info!("Starting picserve");
    let resolver = build_resolver(&config, false)?;

    tracing::info!(
        "Serving images under {} and the browser under {}",
        config.server.image_path_prefix,
        config.server.browse_path_prefix
    );

    server::start_server(config, resolver).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "picserve=trace,picserve_convert=trace,tower_http=debug".to_string()
        } else {
            "picserve=debug,picserve_convert=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start {
            root,
            host,
            port,
            cache_dir,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            apply_overrides(&mut config, root, cache_dir);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(config))
        }
        Commands::Warm { root, cache_dir } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            apply_overrides(&mut config, root, cache_dir);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(warm_cache(config))
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("picserve {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Relative paths of every file under `root` that needs conversion.
fn convertible_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            ImageFormat::from_path(entry.path()).is_some_and(|f| f.needs_conversion())
        })
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}

async fn warm_cache(config: Config) -> Result<()> {
    config::validate_config(&config)?;
    let resolver = build_resolver(&config, true)?;
    let roots = resolver.roots().clone();

    let files = tokio::task::spawn_blocking({
        let root = roots.image_root.clone();
        move || convertible_files(&root)
    })
    .await?;

    println!("Found {} images needing conversion", files.len());

    let mut cached = 0usize;
    let mut tasks = tokio::task::JoinSet::new();
    for relative in files {
        let already = ImageFormat::from_path(&relative)
            .and_then(|f| f.conversion_target())
            .map(|target| planner::cache_path(&roots.cache_root, &relative, target))
            .is_some_and(|path| planner::is_cached_file(&path));
        if already {
            cached += 1;
            continue;
        }

        let resolver = resolver.clone();
        tasks.spawn(async move {
            let requested = relative.to_string_lossy().into_owned();
            let result = resolver.resolve(&requested).await;
            (relative, result)
        });
    }

    let mut converted = 0usize;
    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (relative, result) = joined?;
        match result {
            Ok(image) => {
                converted += 1;
                println!("✓ {} -> {}", relative.display(), image.path.display());
            }
            Err(e) => {
                failed += 1;
                println!("✗ {}: {}", relative.display(), e);
            }
        }
    }

    println!();
    println!("Converted: {}", converted);
    println!("Already cached: {}", cached);
    println!("Failed: {}", failed);

    if failed > 0 {
        anyhow::bail!("{} images failed to convert", failed);
    }
    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = picserve_convert::check_tools();
    let mut any_ok = false;

    for tool in &tools {
        let status = if tool.available {
            any_ok = true;
            "✓"
        } else {
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if any_ok {
        println!("ImageMagick is available, HEIC conversion is enabled.");
    } else {
        println!("ImageMagick was not found. Install it to serve HEIC images.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_summary(&Config::default());
        }
    }

    Ok(())
}

fn print_summary(config: &Config) {
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Image prefix: {}", config.server.image_path_prefix);
    println!("  Browse prefix: {}", config.server.browse_path_prefix);
    match config.images.root {
        Some(ref root) => println!("  Image root: {:?}", root),
        None => println!("  Image root: (not set)"),
    }
    println!("  Cache dir: {:?}", config.images.cache_dir);
    println!("  Max concurrent conversions: {}", config.conversion.max_concurrent);
    if let Some(ref magick) = config.tools.magick_path {
        println!("  ImageMagick: {:?}", magick);
    }
}
