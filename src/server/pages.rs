use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use super::{AppState, escape_html, filename_query, redirect_home};

/// `?filename=` as used by the page, fragment and socket routes.
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub filename: Option<String>,
}

/// `?current=` sent by the client script when polling the sidebar.
#[derive(Debug, Default, Deserialize)]
pub struct SidebarQuery {
    #[serde(default)]
    pub current: Option<String>,
}

/// `GET /` — the page shell. The client script fills in the sidebar and, if a
/// file is selected, the viewer.
pub async fn index(Query(query): Query<FileQuery>) -> Html<String> {
    let filename = query.filename.unwrap_or_default();
    let title = if filename.is_empty() {
        "remark".to_owned()
    } else {
        format!("remark - {}", escape_html(&filename))
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<link rel="stylesheet" href="/static/markdown.css">
<script src="/static/remark.js" defer></script>
</head>
<body data-filename="{filename}">
<div class="layout">
<nav id="sidebar"></nav>
<main id="viewer"></main>
</div>
</body>
</html>
"#,
        filename = escape_html(&filename),
    ))
}

/// `GET /sidebar` — one link per watched file, current file highlighted.
pub async fn sidebar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SidebarQuery>,
) -> Html<String> {
    let current = query.current.unwrap_or_default();
    let snapshot = state.watch_list.snapshot();

    let mut out = String::from("<div class=\"file-list\">\n");
    if snapshot.is_empty() {
        out.push_str("<p class=\"empty\">No matching files yet.</p>\n");
    }
    for name in snapshot.display_order() {
        let class = if name == current { " class=\"current\"" } else { "" };
        out.push_str(&format!(
            "<a href=\"/?{}\"{class}>{}</a>\n",
            escape_html(&filename_query(&name)),
            escape_html(&name),
        ));
    }
    out.push_str("</div>\n");
    Html(out)
}

/// `GET /markdown` — the rendered file plus the socket address for live updates.
///
/// Files not in the watch list redirect to the index instead of erroring.
pub async fn markdown(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Response {
    let filename = query.filename.unwrap_or_default();
    let target = state.target(&filename);
    if filename.is_empty() || !state.watch_list.snapshot().contains(&target) {
        return redirect_home();
    }

    let gateway = Arc::clone(&state.gateway);
    let rendered = tokio::task::spawn_blocking(move || gateway.render(&target)).await;
    match rendered {
        Ok(Ok(html)) => Html(format!(
            "<div id=\"preview\" data-watch=\"/watch?{}\">\n{html}</div>\n",
            escape_html(&filename_query(&filename)),
        ))
        .into_response(),
        Ok(Err(err)) => {
            warn!("{err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            warn!("render task failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
