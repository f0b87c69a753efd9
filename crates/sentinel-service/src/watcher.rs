//! Filesystem change notifications using the `notify` crate.
//!
//! Each tracked file is watched through its parent directory, so a file that
//! is deleted and recreated (or replaced by rename) keeps producing events.

use anyhow::Result;
use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
    /// Open, read or close without write
    Access,
    Other,
}

impl ChangeKind {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Access)
    }
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Create,
            EventKind::Modify(_) => Self::Modify,
            EventKind::Remove(_) => Self::Remove,
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => Self::Modify,
            EventKind::Access(_) => Self::Access,
            EventKind::Any | EventKind::Other => Self::Other,
        }
    }
}

static NEXT_NOTIFICATION: AtomicU64 = AtomicU64::new(1);

fn next_notification() -> u64 {
    NEXT_NOTIFICATION.fetch_add(1, Ordering::Relaxed)
}

/// One affected path from a change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Shared by every path split out of the same notification
    pub notification: u64,
    /// Notification as received, for the audit log
    pub raw: String,
}

impl ChangeEvent {
    /// Single-path notification
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        let path = path.into();
        let raw = format!("{kind:?} {}", path.display());
        Self {
            path,
            kind,
            notification: next_notification(),
            raw,
        }
    }
}

/// Source of change notifications consumed by the scheduler.
pub trait ChangeSource {
    /// Replace the watched set with `paths`.
    fn subscribe(&mut self, paths: &[PathBuf]) -> Result<()>;

    /// Next pending event, waiting at most `timeout`.
    fn poll(&mut self, timeout: Duration) -> Option<ChangeEvent>;
}

pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
    pending: VecDeque<ChangeEvent>,
    watched_dirs: BTreeSet<PathBuf>,
}

impl NotifyWatcher {
    pub fn new() -> Result<Self> {
        let (tx, events) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        Ok(Self {
            watcher,
            events,
            pending: VecDeque::new(),
            watched_dirs: BTreeSet::new(),
        })
    }

    fn enqueue(&mut self, event: Event) {
        let kind = ChangeKind::from(&event.kind);
        let raw = serde_json::to_string(&event).unwrap_or_else(|_| format!("{event:?}"));
        let notification = next_notification();
        for path in &event.paths {
            self.pending.push_back(ChangeEvent {
                path: path.clone(),
                kind,
                notification,
                raw: raw.clone(),
            });
        }
    }
}

impl ChangeSource for NotifyWatcher {
    fn subscribe(&mut self, paths: &[PathBuf]) -> Result<()> {
        let wanted: BTreeSet<PathBuf> = paths
            .iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();

        let stale: Vec<PathBuf> = self.watched_dirs.difference(&wanted).cloned().collect();
        for dir in stale {
            if let Err(e) = self.watcher.unwatch(&dir) {
                debug!(dir = %dir.display(), error = %e, "unwatch failed");
            }
            self.watched_dirs.remove(&dir);
        }

        for dir in wanted {
            if self.watched_dirs.contains(&dir) {
                continue;
            }
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "directory missing, cannot watch");
                continue;
            }
            self.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            info!(dir = %dir.display(), "watching");
            self.watched_dirs.insert(dir);
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Option<ChangeEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        match self.events.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                self.enqueue(event);
                self.pending.pop_front()
            }
            Ok(Err(e)) => {
                error!(error = %e, "file watcher error");
                None
            }
            Err(_) => None,
        }
    }
}
