pub mod event;
pub mod subscriber;

use std::collections::{BTreeSet, HashSet};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::server::filename_query;

use event::{ChangeEvent, ChangeKind};
use subscriber::Subscriber;

/// Input to the watch set owner task.
#[derive(Debug)]
pub enum WatchCommand {
    /// Latest resolver output.
    Reconcile(BTreeSet<PathBuf>),
    /// A classified filesystem notification.
    Notify(ChangeEvent),
}

/// Immutable snapshot of the files under observation.
///
/// Paths are absolute; `display_name` renders them relative to the watch root
/// for URLs and the sidebar.
#[derive(Debug, Clone, Default)]
pub struct WatchList {
    root: PathBuf,
    paths: BTreeSet<PathBuf>,
}

impl WatchList {
    pub fn new(root: PathBuf, paths: BTreeSet<PathBuf>) -> Self {
        Self { root, paths }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// The path as shown to users: relative to the root when inside it.
    pub fn display_name(&self, path: &Path) -> String {
        display_name(&self.root, path)
    }

    /// Display names ordered for the file index: case-insensitive, with files
    /// in subdirectories listed before top-level files.
    pub fn display_order(&self) -> Vec<String> {
        let mut names: Vec<String> = self.iter().map(|p| self.display_name(p)).collect();
        names.sort_by_key(|name| (!name.contains(MAIN_SEPARATOR), name.to_lowercase()));
        names
    }
}

fn display_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Read-only handle to the current watch list, cheap to clone.
#[derive(Debug, Clone)]
pub struct WatchListHandle {
    rx: watch::Receiver<Arc<WatchList>>,
}

impl WatchListHandle {
    /// The full list as of this instant; never a partially updated view.
    pub fn snapshot(&self) -> Arc<WatchList> {
        Arc::clone(&*self.rx.borrow())
    }
}

/// The authoritative, single-owner set of watched files.
///
/// Owns the filesystem subscriptions. All mutation happens through
/// `reconcile` and `handle`, normally driven by `run` on one task; readers see
/// the result through `WatchListHandle` snapshots published after each change.
pub struct WatchSet<S: Subscriber> {
    subscriber: S,
    root: PathBuf,
    paths: BTreeSet<PathBuf>,
    /// Paths whose subscription failed, so the warning is logged once.
    failed: HashSet<PathBuf>,
    base_url: String,
    bus: EventBus,
    snapshot_tx: watch::Sender<Arc<WatchList>>,
}

impl<S: Subscriber> WatchSet<S> {
    /// Create an empty watch set. `base_url` is used in discovery announcements.
    pub fn new(
        subscriber: S,
        root: PathBuf,
        base_url: String,
        bus: EventBus,
    ) -> (Self, WatchListHandle) {
        let initial = Arc::new(WatchList::new(root.clone(), BTreeSet::new()));
        let (snapshot_tx, rx) = watch::channel(initial);
        let set = Self {
            subscriber,
            root,
            paths: BTreeSet::new(),
            failed: HashSet::new(),
            base_url,
            bus,
            snapshot_tx,
        };
        (set, WatchListHandle { rx })
    }

    /// Start watching every matched path not already watched.
    ///
    /// Returns the newly discovered paths. Already-watched paths are left
    /// alone, so reconciling the same input twice is a no-op. Paths that
    /// dropped out of the match set stay watched until the filesystem reports
    /// their removal.
    pub fn reconcile(&mut self, matched: &BTreeSet<PathBuf>) -> Vec<PathBuf> {
        let mut discovered = Vec::new();
        for path in matched {
            if self.paths.contains(path) {
                continue;
            }
            match self.subscriber.subscribe(path) {
                Ok(()) => {
                    self.failed.remove(path);
                    self.announce(path);
                    self.paths.insert(path.clone());
                    discovered.push(path.clone());
                }
                Err(err) => {
                    if self.failed.insert(path.clone()) {
                        warn!("{err}");
                    }
                }
            }
        }
        if !discovered.is_empty() {
            self.publish();
        }
        discovered
    }

    /// Apply a filesystem notification and forward it to the bus.
    ///
    /// Returns `true` if the event was forwarded. Notifications for paths that
    /// are not being watched are dropped.
    pub fn handle(&mut self, event: ChangeEvent) -> bool {
        if !self.paths.contains(&event.path) {
            debug!(path = %event.path.display(), kind = ?event.kind, "ignoring unwatched path");
            return false;
        }

        match event.kind {
            ChangeKind::Modified => {}
            ChangeKind::Renamed => {
                // Many watch backends lose the subscription across a rename,
                // so subscribe again to survive rename-swap saves.
                self.subscriber.unsubscribe(&event.path);
                if let Err(err) = self.subscriber.subscribe(&event.path) {
                    warn!("{err}");
                    self.paths.remove(&event.path);
                    self.publish();
                }
            }
            ChangeKind::Removed => {
                info!("no longer watching {}", display_name(&self.root, &event.path));
                self.subscriber.unsubscribe(&event.path);
                self.paths.remove(&event.path);
                self.publish();
            }
        }

        let reached = self.bus.publish(event);
        debug!(reached, "change event published");
        true
    }

    /// Own the watch set until every command sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<WatchCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                WatchCommand::Reconcile(matched) => {
                    self.reconcile(&matched);
                }
                WatchCommand::Notify(event) => {
                    self.handle(event);
                }
            }
        }
    }

    fn announce(&self, path: &Path) {
        let name = display_name(&self.root, path);
        info!("watching {name}: {}/?{}", self.base_url, filename_query(&name));
    }

    fn publish(&self) {
        let list = WatchList::new(self.root.clone(), self.paths.clone());
        self.snapshot_tx.send_replace(Arc::new(list));
    }
}
