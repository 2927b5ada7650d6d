use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::error::ResolveError;
use crate::watcher::WatchCommand;

/// The immutable set of glob patterns supplied at startup.
///
/// Relative patterns are anchored at the watch root so that every resolved
/// path is absolute and comparable with the paths reported by the
/// filesystem notification layer.
#[derive(Debug, Clone)]
pub struct PatternSet {
    /// Patterns as the user wrote them, in order.
    patterns: Vec<String>,
    /// Patterns joined onto the escaped root, ready for `glob::glob`.
    anchored: Vec<String>,
    root: PathBuf,
}

impl PatternSet {
    /// Validate `patterns` and anchor them at `root`.
    ///
    /// Fails on an empty list or on the first pattern with invalid syntax.
    pub fn new<I, S>(patterns: I, root: &Path) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_owned())
            .collect();
        if patterns.is_empty() {
            return Err(ResolveError::NoPatterns);
        }

        let mut anchored = Vec::with_capacity(patterns.len());
        for pattern in &patterns {
            glob::Pattern::new(pattern).map_err(|source| ResolveError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            anchored.push(anchor(pattern, root));
        }

        Ok(Self {
            patterns,
            anchored,
            root: root.to_path_buf(),
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expand every pattern and return the regular files that currently match.
    ///
    /// Directories matched by a pattern are skipped, as are entries that vanish
    /// while the walk is in progress. Any other unreadable entry is an error
    /// rather than a silent omission.
    pub fn resolve(&self) -> Result<BTreeSet<PathBuf>, ResolveError> {
        let mut matched = BTreeSet::new();
        for (pattern, anchored) in self.patterns.iter().zip(&self.anchored) {
            let paths = glob::glob(anchored).map_err(|source| ResolveError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            for entry in paths {
                let path = match entry {
                    Ok(path) => path,
                    // Directories deleted mid-walk (build output, checkouts) are churn.
                    Err(err) if err.error().kind() == io::ErrorKind::NotFound => {
                        debug!(path = %err.path().display(), "skipping vanished entry");
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };
                if path.is_file() {
                    matched.insert(normalize(&path));
                }
            }
        }
        Ok(matched)
    }
}

/// Join a pattern onto the root, escaping the root so that directory names
/// containing `[`, `*` or `?` are matched literally.
fn anchor(pattern: &str, root: &Path) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_owned();
    }
    let pattern = pattern.trim_start_matches("./");
    let root = glob::Pattern::escape(&root.to_string_lossy());
    format!("{}/{}", root.trim_end_matches('/'), pattern)
}

/// Lexically normalize a path: drop `.` components and fold `..` into its parent.
///
/// The filesystem is never consulted, so symlinks are left as written. This
/// keeps resolver output and notification paths in the same form.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Spawn the fixed-interval resolution loop.
///
/// Each pass expands the pattern set on the blocking pool and hands the result
/// to the watch set owner. The loop ends with `Ok(())` once the owner goes
/// away, and with the error on the first failed pass; callers treat that as
/// fatal.
pub fn spawn_resolver(
    patterns: Arc<PatternSet>,
    interval: Duration,
    commands: mpsc::Sender<WatchCommand>,
) -> JoinHandle<Result<(), ResolveError>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let pass = Arc::clone(&patterns);
            let matched = match tokio::task::spawn_blocking(move || pass.resolve()).await? {
                Ok(matched) => matched,
                Err(err) => {
                    error!("{err}");
                    return Err(err);
                }
            };

            if commands.send(WatchCommand::Reconcile(matched)).await.is_err() {
                return Ok(());
            }
        }
    })
}
