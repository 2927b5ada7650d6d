//! HTTP front end: page shell, sidebar, Markdown fragments and the watch socket.

pub mod assets;
pub mod pages;
pub mod ws;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::bus::EventBus;
use crate::render::RenderGateway;
use crate::resolver::normalize;
use crate::watcher::WatchListHandle;

/// Everything request handlers need from the core.
pub struct AppState {
    pub root: PathBuf,
    pub watch_list: WatchListHandle,
    pub bus: EventBus,
    pub gateway: Arc<dyn RenderGateway>,
}

impl AppState {
    /// Map a `filename` query value onto the absolute path used in the watch list.
    pub fn target(&self, filename: &str) -> PathBuf {
        normalize(&self.root.join(filename))
    }

    /// Whether `path` is inside the watch root once normalized.
    pub fn within_root(&self, path: &Path) -> bool {
        normalize(path).starts_with(&self.root)
    }
}

/// Build the complete router.
///
/// - `GET /` — page shell
/// - `GET /sidebar` — file index fragment
/// - `GET /markdown` — rendered file fragment
/// - `GET /watch` — viewer session WebSocket
/// - `GET /static/{*path}` — embedded assets
/// - anything else — local images referenced by documents, else 404
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/sidebar", get(pages::sidebar))
        .route("/markdown", get(pages::markdown))
        .route("/watch", get(ws::watch_socket))
        .route("/static/{*path}", get(assets::static_asset))
        .fallback(assets::local_image)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Send the client back to the index page. Covers both plain navigation and
/// the client script, which follows the `HX-Redirect` header.
pub fn redirect_home() -> Response {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, "/"), (header::HeaderName::from_static("hx-redirect"), "/")],
    )
        .into_response()
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `filename=<value>`, form-encoded for use after `?` in a link or socket URL.
pub fn filename_query(name: &str) -> String {
    // Serializing a sequence of string pairs has no failure case.
    serde_urlencoded::to_string([("filename", name)]).unwrap_or_default()
}


#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;

    use super::AppState;
    use crate::bus::EventBus;
    use crate::render::MarkdownRenderer;
    use crate::resolver::{PatternSet, normalize};
    use crate::watcher::WatchSet;
    use crate::watcher::testing::RecordingSubscriber;

    /// App state over `root` whose watch list holds the files matching `patterns`.
    pub fn state_for(root: &Path, patterns: &[&str]) -> Arc<AppState> {
        let root = normalize(root);
        let bus = EventBus::new();
        let (mut watch_set, watch_list) = WatchSet::new(
            RecordingSubscriber::default(),
            root.clone(),
            "http://127.0.0.1:0".to_owned(),
            bus.clone(),
        );
        if !patterns.is_empty() {
            let set = PatternSet::new(patterns.iter().copied(), &root).unwrap();
            watch_set.reconcile(&set.resolve().unwrap());
        }
        Arc::new(AppState {
            root,
            watch_list,
            bus,
            gateway: Arc::new(MarkdownRenderer::new()),
        })
    }
}
