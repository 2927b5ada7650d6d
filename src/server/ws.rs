//! `WebSocket` transport for viewer sessions.
//!
//! Clients connect to `GET /watch?filename=…` and receive the freshly rendered
//! HTML of that file as a text frame every time it changes. Anything the
//! client sends is treated as a liveness signal only.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::error::TransportError;
use crate::session::{PushSink, Signal, SignalSource, ViewerSession};

use super::pages::FileQuery;
use super::{AppState, redirect_home};

/// Outbound half of an upgraded socket.
pub struct WsSink(SplitSink<WebSocket, Message>);

impl PushSink for WsSink {
    async fn push(&mut self, html: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(html.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Inbound half of an upgraded socket.
pub struct WsSource(SplitStream<WebSocket>);

impl SignalSource for WsSource {
    async fn next_signal(&mut self) -> Option<Signal> {
        match self.0.next().await {
            None => None,
            Some(Ok(Message::Close(_))) => Some(Signal::Close),
            Some(Err(err)) => {
                debug!("WebSocket error: {err}");
                Some(Signal::Close)
            }
            Some(Ok(_)) => Some(Signal::Message),
        }
    }
}

/// `GET /watch` — validate the target, then upgrade and run a viewer session.
///
/// The watch-list check happens before the upgrade so an unknown file is
/// redirected rather than accepted.
pub async fn watch_socket(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
) -> Response {
    let filename = query.filename.unwrap_or_default();
    let target = state.target(&filename);
    let snapshot = state.watch_list.snapshot();

    let session =
        match ViewerSession::connect(target, &snapshot, &state.bus, Arc::clone(&state.gateway)) {
            Ok(session) => session,
            Err(err) => {
                debug!("rejecting viewer: {err}");
                return redirect_home();
            }
        };

    debug!(file = %filename, viewers = state.bus.subscriber_count(), "viewer connecting");

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    upgrade.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        session.run(WsSink(sink), WsSource(stream)).await;
    })
}
