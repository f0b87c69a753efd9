//! Metadata probing. Links are never followed: a tracked path that has been
//! swapped for a symbolic link reports the link's own metadata.

use crate::models::FileMetadata;
use crate::{Result, SentinelError};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Symlink,
    Other,
}

/// What `lstat` reports for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub kind: EntryKind,
    pub metadata: FileMetadata,
}

pub trait MetadataProber {
    /// Probe `path` without following a final symbolic link. Fails with
    /// [`SentinelError::NotFound`] when nothing exists at `path`.
    fn probe(&self, path: &Path) -> Result<Observation>;

    /// True when `path` (following links) is a regular file.
    fn resolves_to_regular_file(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProber;

impl MetadataProber for SystemProber {
    fn probe(&self, path: &Path) -> Result<Observation> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SentinelError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_file() {
            EntryKind::Regular
        } else {
            EntryKind::Other
        };
        Ok(Observation {
            kind,
            metadata: metadata_of(&meta),
        })
    }
}

#[cfg(unix)]
pub(crate) fn metadata_of(meta: &fs::Metadata) -> FileMetadata {
    use std::os::unix::fs::MetadataExt;
    FileMetadata {
        permission: meta.mode() & 0o7777,
        owner: meta.uid(),
        group: meta.gid(),
        mod_time_ns: meta
            .mtime()
            .saturating_mul(1_000_000_000)
            .saturating_add(meta.mtime_nsec()),
    }
}

#[cfg(not(unix))]
pub(crate) fn metadata_of(meta: &fs::Metadata) -> FileMetadata {
    let mod_time_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    FileMetadata {
        permission: if meta.permissions().readonly() { 0o444 } else { 0o644 },
        owner: 0,
        group: 0,
        mod_time_ns,
    }
}
