//! Viewer sessions: one live connection displaying one watched file.
//!
//! A session moves `Connecting → Active → Closed`. While active it runs two
//! loops in the same scope: a close-detection loop reading inbound transport
//! messages, and a push loop reading the event bus. Either loop may close the
//! session; the first to do so wins and the other exits without further
//! action.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Subscription};
use crate::error::{RenderError, SessionError, TransportError};
use crate::render::RenderGateway;
use crate::watcher::WatchList;
use crate::watcher::event::ChangeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the connection ended.
    ClientClosed,
    /// Writing a push to the transport failed.
    TransportFailed,
    /// The event bus shut down.
    BusClosed,
}

/// An inbound liveness signal. Client payloads are never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Message,
    Close,
}

/// Outbound half of a session transport.
pub trait PushSink: Send + 'static {
    fn push(&mut self, html: String) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Inbound half of a session transport.
pub trait SignalSource: Send + 'static {
    /// The next signal, or `None` once the connection is gone.
    fn next_signal(&mut self) -> impl Future<Output = Option<Signal>> + Send;
}

/// Shared session state with a guarded, one-shot close transition.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<watch::Sender<SessionState>>,
}

impl Lifecycle {
    fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Connecting);
        Self { state: Arc::new(tx) }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// `Connecting → Active`. Returns `false` if the session already moved on.
    fn activate(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Connecting {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        })
    }

    /// Move to `Closed`. Exactly one caller ever gets `true`; that caller owns
    /// the teardown.
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        })
    }

    /// Resolve once the session is closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: CloseReason,
    pub pushes: usize,
}

/// A viewer connected to one watched file.
pub struct ViewerSession {
    target: PathBuf,
    display_name: String,
    lifecycle: Lifecycle,
    events: Subscription,
    gateway: Arc<dyn RenderGateway>,
}

impl ViewerSession {
    /// Open a session for `target`, which must be in the current watch list.
    ///
    /// The bus subscription starts here, so events published between this
    /// call and the transport handshake are delivered once the session runs.
    pub fn connect(
        target: PathBuf,
        watch_list: &WatchList,
        bus: &EventBus,
        gateway: Arc<dyn RenderGateway>,
    ) -> Result<Self, SessionError> {
        if !watch_list.contains(&target) {
            return Err(SessionError::NotWatched(target));
        }
        Ok(Self {
            display_name: watch_list.display_name(&target),
            target,
            lifecycle: Lifecycle::new(),
            events: bus.subscribe(),
            gateway,
        })
    }

    #[cfg(test)]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Activate the session over an established transport and serve it until
    /// it closes.
    pub async fn run<K, S>(mut self, mut sink: K, source: S) -> SessionReport
    where
        K: PushSink,
        S: SignalSource,
    {
        if !self.lifecycle.activate() {
            debug!(file = %self.display_name, state = ?self.lifecycle.state(), "session ended before activation");
            return SessionReport {
                reason: CloseReason::ClientClosed,
                pushes: 0,
            };
        }
        debug!(file = %self.display_name, "session active");

        let close_detection = tokio::spawn(detect_close(self.lifecycle.clone(), source));

        let mut pushes = 0;
        let mut reason = None;
        loop {
            tokio::select! {
                _ = self.lifecycle.closed() => break,
                event = self.events.next() => {
                    let Some(event) = event else {
                        if self.lifecycle.close() {
                            reason = Some(CloseReason::BusClosed);
                        }
                        break;
                    };
                    if event.path != self.target {
                        continue;
                    }
                    if event.kind == ChangeKind::Removed {
                        debug!(file = %self.display_name, "file removed, nothing to push");
                        continue;
                    }

                    let html = match self.render().await {
                        Ok(html) => html,
                        Err(err) => {
                            warn!("{err}");
                            continue;
                        }
                    };
                    if let Err(err) = sink.push(html).await {
                        if self.lifecycle.close() {
                            debug!(file = %self.display_name, "push failed: {err}");
                            reason = Some(CloseReason::TransportFailed);
                        }
                        break;
                    }
                    pushes += 1;
                }
            }
        }

        let detected = close_detection.await.ok().flatten();
        let reason = reason.or(detected).unwrap_or(CloseReason::ClientClosed);

        drop(self.events);
        drop(sink);
        info!(file = %self.display_name, ?reason, pushes, "session closed");

        SessionReport { reason, pushes }
    }

    async fn render(&self) -> Result<String, RenderError> {
        let gateway = Arc::clone(&self.gateway);
        let path = self.target.clone();
        tokio::task::spawn_blocking(move || gateway.render(&path)).await?
    }
}

/// Read inbound messages until the client goes away or the session closes.
///
/// Returns the close reason only if this loop performed the close.
async fn detect_close<S: SignalSource>(lifecycle: Lifecycle, mut source: S) -> Option<CloseReason> {
    loop {
        tokio::select! {
            _ = lifecycle.closed() => return None,
            signal = source.next_signal() => match signal {
                Some(Signal::Message) => continue,
                Some(Signal::Close) | None => {
                    return lifecycle.close().then_some(CloseReason::ClientClosed);
                }
            }
        }
    }
}
