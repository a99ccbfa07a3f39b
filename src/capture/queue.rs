// SPDX-License-Identifier: MIT
// Bounded screenshot queue — insertion order, capacity 2, oldest unlinked on
// overflow. Disk contents mirror the queue: a file exists iff its path is
// queued, so eviction, removal, and clearing all touch the filesystem.

use serde::Serialize;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum screenshots retained per queue.
pub const MAX_QUEUE_LEN: usize = 2;

/// A screenshot pushed out by an over-capacity `push`.
#[derive(Debug)]
pub struct Evicted {
    pub path: PathBuf,
    /// Set when the evicted file could not be unlinked (other than NotFound).
    pub unlink_error: Option<io::Error>,
}

/// Outcome of emptying a queue: which files went away, which refused to.
///
/// Callers surface this to the RPC client instead of dropping unlink errors
/// on the floor.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub error: String,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one (used when clearing both queues).
    pub fn absorb(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.failures.extend(other.failures);
    }
}

/// Insertion-ordered queue of screenshot files with a hard length bound.
pub struct ScreenshotQueue {
    dir: PathBuf,
    entries: VecDeque<PathBuf>,
    capacity: usize,
}

impl ScreenshotQueue {
    /// Open a queue rooted at `dir`, creating the directory if needed.
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        Self::with_capacity(dir, MAX_QUEUE_LEN)
    }

    pub fn with_capacity(dir: PathBuf, capacity: usize) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            entries: VecDeque::new(),
            capacity,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue contents, oldest first.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().cloned().collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|p| p == path)
    }

    /// Append a screenshot. When the bound is exceeded the oldest entry is
    /// evicted and its file unlinked; the eviction is returned so callers can
    /// log or report it.
    pub fn push(&mut self, path: PathBuf) -> Option<Evicted> {
        self.entries.push_back(path);
        if self.entries.len() <= self.capacity {
            return None;
        }
        let oldest = self.entries.pop_front()?;
        let unlink_error = match std::fs::remove_file(&oldest) {
            Ok(()) => None,
            // Already gone — the queue's view of disk was stale, not an error.
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %oldest.display(), err = %e, "failed to unlink evicted screenshot");
                Some(e)
            }
        };
        Some(Evicted {
            path: oldest,
            unlink_error,
        })
    }

    /// Drop `path` from the queue without touching its file.
    ///
    /// Returns whether the path was present. Unlinking is the caller's job so
    /// a vanished file can still be removed from the queue cleanly.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|p| p != path);
        self.entries.len() != before
    }

    /// Unlink every queued file and empty the queue.
    pub fn clear(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in self.entries.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.removed.push(path),
                Err(e) => report.failures.push(CleanupFailure {
                    path,
                    error: e.to_string(),
                }),
            }
        }
        report
    }
}
