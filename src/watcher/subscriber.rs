use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::WatchError;

use super::WatchCommand;
use super::event::classify;

/// The filesystem-watch primitive behind the watch set.
///
/// Owned exclusively by the watch set task; nothing else adds or removes
/// subscriptions.
pub trait Subscriber: Send + 'static {
    /// Begin watching a single file.
    fn subscribe(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Stop watching a file. Unknown paths are ignored.
    fn unsubscribe(&mut self, path: &Path);
}

/// Per-file, non-recursive subscriptions backed by the platform's notify watcher.
///
/// Keeps the OS watcher alive (dropping it stops watching) together with the
/// bridge task that classifies raw events and forwards them to the watch set.
pub struct NotifySubscriber {
    watcher: RecommendedWatcher,
    _bridge_task: JoinHandle<()>,
}

impl NotifySubscriber {
    /// Start the platform watcher and the bridge into `commands`.
    ///
    /// Failure here means the notification subsystem is unavailable, which is
    /// fatal to the process.
    pub fn start(commands: tokio_mpsc::Sender<WatchCommand>) -> Result<Self, WatchError> {
        let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();

        let watcher = notify::recommended_watcher(move |res| {
            let _ = std_tx.send(res);
        })
        .map_err(WatchError::Init)?;

        // Bridge: receive on the blocking pool, classify, forward to tokio.
        let bridge_task = tokio::task::spawn_blocking(move || {
            while let Ok(result) = std_rx.recv() {
                match result {
                    Ok(event) => {
                        for change in classify(&event) {
                            if commands.blocking_send(WatchCommand::Notify(change)).is_err() {
                                return; // watch set gone, shutdown
                            }
                        }
                    }
                    Err(err) => warn!("watcher error: {err}"),
                }
            }
        });

        Ok(Self {
            watcher,
            _bridge_task: bridge_task,
        })
    }
}

impl Subscriber for NotifySubscriber {
    fn subscribe(&mut self, path: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                path: path.to_path_buf(),
                source,
            })
    }

    fn unsubscribe(&mut self, path: &Path) {
        // The OS usually drops the watch itself on removal, so a failure
        // here only means there was nothing left to remove.
        let _ = self.watcher.unwatch(path);
    }
}
