//! Verdict selection for a single check.
//!
//! Guards run in a fixed order and the first match wins. A content change
//! therefore hides any concurrent ownership or mode change until the next
//! check; restoring content reapplies the baseline metadata anyway.

use crate::models::{FileMetadata, MismatchKind, TrackedFile};
use crate::probe::{EntryKind, Observation};

/// State of a tracked path as observed at check time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// The path does not resolve to a regular file
    Missing,
    Present {
        /// Digest of the content reached through the path
        digest: String,
        /// `lstat` of the path itself
        observation: Observation,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Deletion,
    Checksum {
        observed_digest: String,
    },
    Metadata {
        observed: FileMetadata,
        /// The tracked path has been replaced by a symbolic link
        symlink: bool,
    },
    ModTimeOnly {
        observed_mod_time_ns: i64,
    },
    Clean,
}

impl Verdict {
    pub fn kind(&self) -> MismatchKind {
        match self {
            Self::Deletion => MismatchKind::Deletion,
            Self::Checksum { .. } => MismatchKind::Checksum,
            Self::Metadata { .. } => MismatchKind::Metadata,
            Self::ModTimeOnly { .. } => MismatchKind::ModTimeOnly,
            Self::Clean => MismatchKind::Clean,
        }
    }
}

pub fn classify(tracked: &TrackedFile, observed: &Observed) -> Verdict {
    let (digest, observation) = match observed {
        Observed::Missing => return Verdict::Deletion,
        Observed::Present {
            digest,
            observation,
        } => (digest, observation),
    };

    if *digest != tracked.good_digest {
        return Verdict::Checksum {
            observed_digest: digest.clone(),
        };
    }

    let symlink = observation.kind == EntryKind::Symlink;
    if symlink || !tracked.baseline.same_ownership_and_mode(&observation.metadata) {
        return Verdict::Metadata {
            observed: observation.metadata,
            symlink,
        };
    }

    if observation.metadata.mod_time_ns != tracked.baseline.mod_time_ns {
        return Verdict::ModTimeOnly {
            observed_mod_time_ns: observation.metadata.mod_time_ns,
        };
    }

    Verdict::Clean
}
