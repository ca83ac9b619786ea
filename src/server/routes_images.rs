//! Image serving route.
//!
//! `GET <image_path_prefix>/<relative path>` resolves the path against the
//! image root, converting on demand, and streams the resulting file.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use picserve_common::Error;
use tokio_util::io::ReaderStream;

use super::error::AppError;
use super::{bad_request, AppContext};

/// Create the image route under `prefix` (e.g. `/images`).
pub fn image_routes(prefix: &str) -> Router<AppContext> {
    Router::new().route(
        &format!("{}/*path", prefix),
        get(serve_image).fallback(bad_request),
    )
}

async fn serve_image(
    State(ctx): State<AppContext>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(path = %path, "requested image");

    let image = ctx.resolver.resolve(&path).await?;

    let file = match tokio::fs::File::open(&image.path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(&path).into());
        }
        Err(e) => {
            return Err(Error::internal(format!("failed to open {}", image.path.display()), e).into());
        }
    };
    let length = file
        .metadata()
        .await
        .map_err(|e| Error::internal(format!("failed to stat {}", image.path.display()), e))?
        .len();

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, image.content_type.to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        body,
    )
        .into_response())
}
