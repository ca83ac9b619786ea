//! HTML directory browser.
//!
//! Renders one page per directory of the image root: sub-directories as
//! tiles linking deeper into the browser, allowed images as `<img>` tags
//! served through the image route.

use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Router,
};
use picserve_common::{formats, Error};

use super::error::AppError;
use super::{bad_request, AppContext};
use crate::images::sanitize_relative;

const HEADER: &str = r#"<!doctype html>
<html lang=en>
<head>
<meta charset=utf-8>
<script src="https://cdn.tailwindcss.com"></script>
<title>Picture Browser</title>
</head>
<body style="background: black;">
<div class="m-4">
<div class="flex flex-wrap w-full gap-4">
"#;

const FOOTER: &str = "</div></div></body></html>";

/// Create the browser routes under `prefix` (e.g. `/browse`).
pub fn browse_routes(prefix: &str) -> Router<AppContext> {
    Router::new()
        .route(prefix, get(browse_root).fallback(bad_request))
        .route(
            &format!("{}/*path", prefix),
            get(browse_dir).fallback(bad_request),
        )
}

async fn browse_root(State(ctx): State<AppContext>) -> Result<Html<String>, AppError> {
    browse(&ctx, "").await
}

async fn browse_dir(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Html<String>, AppError> {
    browse(&ctx, &path).await
}

/// A directory entry worth showing.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Tile {
    Directory(String),
    Image(String),
}

async fn browse(ctx: &AppContext, requested: &str) -> Result<Html<String>, AppError> {
    let relative = sanitize_relative(requested)?;
    let dir = ctx.resolver.roots().image_root.join(&relative);

    match tokio::fs::metadata(&dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(Error::not_found(&relative).into()),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
            ) =>
        {
            return Err(Error::not_found(&relative).into());
        }
        Err(e) => {
            return Err(Error::internal(format!("failed to stat {}", dir.display()), e).into());
        }
    }

    let tiles = read_tiles(&dir)
        .await
        .map_err(|e| Error::internal(format!("failed to list {}", dir.display()), e))?;

    tracing::debug!(dir = %dir.display(), entries = tiles.len(), "browsing directory");

    let base = relative_url(&relative);
    Ok(Html(render(
        &tiles,
        &base,
        &ctx.config.server.image_path_prefix,
        &ctx.config.server.browse_path_prefix,
    )))
}

async fn read_tiles(dir: &FsPath) -> std::io::Result<Vec<Tile>> {
    let mut tiles = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        // Follow symlinks so linked albums show up as directories.
        let is_dir = match tokio::fs::metadata(entry.path()).await {
            Ok(meta) => meta.is_dir(),
            Err(_) => continue,
        };

        if is_dir {
            tiles.push(Tile::Directory(name));
        } else if formats::is_allowed(FsPath::new(&name)) {
            tiles.push(Tile::Image(name));
        }
    }

    tiles.sort();
    Ok(tiles)
}

fn relative_url(relative: &FsPath) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn render(tiles: &[Tile], base: &str, image_prefix: &str, browse_prefix: &str) -> String {
    let mut html = String::from(HEADER);

    for tile in tiles {
        match tile {
            Tile::Directory(name) => {
                let href = join_url(browse_prefix, base, name);
                html.push_str(&format!(
                    "<a href=\"{}\"><div class=\"flex-initial flex items-center justify-center w-80 h-60 border border-blue-600 text-slate-100\">{}</div></a>",
                    escape_html(&href),
                    escape_html(name)
                ));
            }
            Tile::Image(name) => {
                let src = join_url(image_prefix, base, name);
                html.push_str(&format!(
                    "<img class=\"flex-initial items-center justify-center w-80 h-60\" style=\"object-fit:contain\" src=\"{}\" alt=\"{}\" />",
                    escape_html(&src),
                    escape_html(name)
                ));
            }
        }
        html.push('\n');
    }

    html.push_str(FOOTER);
    html
}

fn join_url(prefix: &str, base: &str, name: &str) -> String {
    let mut url = String::from(prefix);
    for segment in base.split('/').filter(|s| !s.is_empty()).chain([name]) {
        url.push('/');
        url.push_str(&encode_segment(segment));
    }
    url
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Escape HTML entities for safe embedding.
fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
