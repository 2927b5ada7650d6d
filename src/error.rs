use std::path::PathBuf;

use thiserror::Error;

/// Failures while expanding the pattern set into concrete files.
///
/// Every variant is fatal: the tool cannot operate without a valid pattern set.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no glob patterns given")]
    NoPatterns,

    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to glob for files: {0}")]
    Access(#[from] glob::GlobError),

    #[error("resolver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures from the filesystem subscription layer.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The notification subsystem itself could not be started (fatal).
    #[error("failed to create filesystem watcher: {0}")]
    Init(#[source] notify::Error),

    /// A single path could not be subscribed (recoverable).
    #[error("failed to watch {}: {source}", path.display())]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Failures turning a watched file into its display form.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures writing to a viewer's transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
}

/// Reasons a viewer session could not be opened.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{} is not being watched", .0.display())]
    NotWatched(PathBuf),
}
