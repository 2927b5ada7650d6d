use std::path::PathBuf;

use notify::EventKind;
use notify::event::ModifyKind;

use crate::resolver::normalize;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Content changed in place.
    Modified,
    /// The file was renamed or replaced via a rename-swap save.
    Renamed,
    /// The file was deleted.
    Removed,
}

/// A single change notification, broadcast verbatim to every viewer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Map a raw notify event kind onto the three kinds the pipeline cares about.
///
/// Metadata-only changes (permissions, timestamps), access and create events
/// are ignored: a newly created file is picked up by the resolver instead.
fn classify_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

/// Classify a notify event into one change per path it references.
pub fn classify(event: &notify::Event) -> Vec<ChangeEvent> {
    let Some(kind) = classify_kind(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .map(|path| ChangeEvent::new(normalize(path), kind))
        .collect()
}
