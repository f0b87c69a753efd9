//! Data models for the baseline registry
//!
//! All structs are serializable and map to SQLite tables.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Enums
// ============================================================================

/// Classification tag written to the log for every check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MismatchKind {
    /// Path no longer resolves to a regular file
    Deletion,
    /// Content digest differs from baseline
    Checksum,
    /// Owner, group or permission bits differ from baseline
    Metadata,
    /// Only the modification time moved
    ModTimeOnly,
    /// Nothing differs
    Clean,
    /// The file could not be read during the check
    Unreadable,
}

impl MismatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deletion => "Deletion",
            Self::Checksum => "Checksum",
            Self::Metadata => "Metadata",
            Self::ModTimeOnly => "ModTime",
            Self::Clean => "Clean",
            Self::Unreadable => "Unreadable",
        }
    }

}

/// A log row carried a tag no [`MismatchKind`] maps to
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mismatch tag: {0}")]
pub struct UnknownMismatchTag(pub String);

impl FromStr for MismatchKind {
    type Err = UnknownMismatchTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deletion" => Ok(Self::Deletion),
            "Checksum" => Ok(Self::Checksum),
            "Metadata" => Ok(Self::Metadata),
            "ModTime" => Ok(Self::ModTimeOnly),
            "Clean" => Ok(Self::Clean),
            "Unreadable" => Ok(Self::Unreadable),
            other => Err(UnknownMismatchTag(other.to_string())),
        }
    }
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Database Models
// ============================================================================

/// Ownership, permission bits and modification time of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Permission bits only (`mode & 0o7777`)
    pub permission: u32,
    pub owner: u32,
    pub group: u32,
    /// Nanoseconds since the Unix epoch
    pub mod_time_ns: i64,
}

impl FileMetadata {
    pub fn mod_time(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.mod_time_ns)
    }

    /// Owner, group and permission all equal; modification time is ignored.
    pub fn same_ownership_and_mode(&self, other: &FileMetadata) -> bool {
        self.owner == other.owner
            && self.group == other.group
            && self.permission == other.permission
    }
}

/// Per-file remediation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub auto_restore: bool,
    pub auto_email: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            auto_restore: true,
            auto_email: false,
        }
    }
}

/// A tracked file and its last-known-good baseline.
///
/// The content snapshot itself is loaded on demand with
/// [`BaselineStore::snapshot`](crate::store::BaselineStore::snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    pub id: i64,
    pub path: String,
    pub good_digest: String,
    pub degraded: bool,
    pub policy: Policy,
    pub baseline: FileMetadata,
    pub snapshot_size: u64,
}

/// One audited check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub file_id: i64,
    pub path: String,
    pub mismatch: MismatchKind,
    pub timestamp: DateTime<Utc>,
}

/// Bad content captured on a Checksum verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicChecksumRecord {
    pub log_id: i64,
    pub bad_digest: String,
    pub bad_size: u64,
    #[serde(skip)]
    pub bad_raw_data: Vec<u8>,
}

/// Bad ownership and mode captured on a Metadata verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForensicMetadataRecord {
    pub log_id: i64,
    pub bad_owner: u32,
    pub bad_group: u32,
    pub bad_permission: u32,
}

/// Raw filesystem change notification received by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub raw_payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_tags_round_trip_through_storage_strings() {
        for kind in [
            MismatchKind::Deletion,
            MismatchKind::Checksum,
            MismatchKind::Metadata,
            MismatchKind::ModTimeOnly,
            MismatchKind::Clean,
            MismatchKind::Unreadable,
        ] {
            assert_eq!(kind.as_str().parse::<MismatchKind>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            "Tampered".parse::<MismatchKind>(),
            Err(UnknownMismatchTag("Tampered".into()))
        );
    }

    #[test]
    fn ownership_comparison_ignores_mod_time() {
        let a = FileMetadata {
            permission: 0o644,
            owner: 0,
            group: 0,
            mod_time_ns: 1,
        };
        let b = FileMetadata { mod_time_ns: 2, ..a };
        assert!(a.same_ownership_and_mode(&b));
        let c = FileMetadata { permission: 0o600, ..a };
        assert!(!a.same_ownership_and_mode(&c));
    }
}
