use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;
use tracing::debug;

use super::AppState;

/// Stylesheet and client script, compiled into the binary.
#[derive(RustEmbed)]
#[folder = "static/"]
struct Assets;

/// `GET /static/{*path}` — serve an embedded asset.
pub async fn static_asset(UrlPath(path): UrlPath<String>) -> Response {
    match Assets::get(&path) {
        Some(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref().to_owned())],
                file.data.into_owned(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Fallback: serve local images referenced from rendered documents.
///
/// Only requests the browser marks as image loads are served, and only for
/// files inside the watch root; everything else is a 404.
pub async fn local_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let is_image = headers
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|dest| dest == "image");
    if !is_image {
        return StatusCode::NOT_FOUND.into_response();
    }

    let relative = uri.path().trim_start_matches('/');
    let path = state.target(relative);
    if relative.is_empty() || !state.within_root(&path) {
        return StatusCode::NOT_FOUND.into_response();
    }

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_owned())], bytes).into_response()
        }
        Err(err) => {
            debug!(path = %path.display(), "image not served: {err}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
