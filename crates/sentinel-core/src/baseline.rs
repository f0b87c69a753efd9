//! Baseline capture for enrollment.
//!
//! A baseline is taken from a single read of the file: the digest is computed
//! over the same bytes that become the snapshot, so the two always agree.

use crate::hasher::ContentHasher;
use crate::models::FileMetadata;
use crate::probe::{EntryKind, MetadataProber};
use crate::{Result, SentinelError};
use std::path::{Component, Path, PathBuf};

/// Everything recorded for a file at enrollment time
#[derive(Debug, Clone)]
pub struct CapturedBaseline {
    pub path: String,
    pub digest: String,
    pub metadata: FileMetadata,
    pub snapshot: Vec<u8>,
}

/// Make `path` absolute and lexically clean without resolving links, so every
/// spelling of a file maps to one store key that matches the paths reported
/// by the filesystem watcher. `.` and repeated separators are dropped and
/// `..` removes the preceding component.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

/// Capture the baseline of `path`. Symbolic links and anything that is not a
/// regular file are rejected.
pub fn capture(
    path: &Path,
    hasher: &dyn ContentHasher,
    prober: &dyn MetadataProber,
) -> Result<CapturedBaseline> {
    let path = normalize_path(path)?;
    let observation = prober.probe(&path)?;
    match observation.kind {
        EntryKind::Regular => {}
        EntryKind::Symlink => return Err(SentinelError::Symlink(path.display().to_string())),
        EntryKind::Other => {
            return Err(SentinelError::NotRegularFile(path.display().to_string()))
        }
    }

    let snapshot = std::fs::read(&path).map_err(|e| SentinelError::unreadable(&path, e))?;
    let digest = hasher.hash_bytes(&snapshot);

    Ok(CapturedBaseline {
        path: path.display().to_string(),
        digest,
        metadata: observation.metadata,
        snapshot,
    })
}
