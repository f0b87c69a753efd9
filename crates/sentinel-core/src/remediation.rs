//! Remediation of a classified divergence.
//!
//! A full restore never writes the target in place:
//!
//! 1. Verify the stored snapshot against the baseline digest
//! 2. Remove the path if it has been swapped for a symbolic link
//! 3. Write a staging file in the target's directory (same filesystem)
//! 4. Apply baseline ownership and mode to the staging file, fsync it
//! 5. Rename over the target and fsync the directory
//! 6. Verify digest, ownership and mode of the result
//! 7. Refresh the baseline modification time to the restored file's

use crate::classifier::Verdict;
use crate::hasher::ContentHasher;
use crate::models::TrackedFile;
use crate::privilege::PrivilegeOps;
use crate::probe::{EntryKind, MetadataProber};
use crate::store::BaselineStore;
use crate::{Result, SentinelError};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Prefix of staging files, so orphans left by a crash can be recognised.
pub const STAGING_PREFIX: &str = ".sentinel_restore_";

/// Result of one check, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CheckOutcome {
    Clean,
    /// Baseline state was reapplied, or the baseline reconciled
    Remediated,
    /// The file was excluded from further automatic checks
    Degraded,
    /// Remediation was attempted and did not take effect
    RemediationFailed { reason: String },
}

impl CheckOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Remediated => "remediated",
            Self::Degraded => "degraded",
            Self::RemediationFailed { .. } => "remediation-failed",
        }
    }
}

pub struct RemediationEngine<'a> {
    pub store: &'a BaselineStore,
    pub hasher: &'a dyn ContentHasher,
    pub prober: &'a dyn MetadataProber,
    pub privileges: &'a dyn PrivilegeOps,
}

impl RemediationEngine<'_> {
    pub fn apply(&self, tracked: &TrackedFile, verdict: &Verdict) -> Result<CheckOutcome> {
        match verdict {
            Verdict::Clean => Ok(CheckOutcome::Clean),
            Verdict::ModTimeOnly {
                observed_mod_time_ns,
            } => {
                self.store
                    .refresh_baseline_mod_time(tracked.id, *observed_mod_time_ns)?;
                info!(path = %tracked.path, "baseline modification time reconciled");
                Ok(CheckOutcome::Remediated)
            }
            Verdict::Deletion | Verdict::Checksum { .. } => {
                if !tracked.policy.auto_restore {
                    return self.degrade(tracked);
                }
                Ok(self.outcome_of(tracked, self.restore(tracked)))
            }
            Verdict::Metadata { symlink, .. } => {
                if !tracked.policy.auto_restore {
                    return self.degrade(tracked);
                }
                let attempt = if *symlink {
                    self.restore(tracked)
                } else {
                    self.reapply_metadata(tracked)
                };
                Ok(self.outcome_of(tracked, attempt))
            }
        }
    }

    fn degrade(&self, tracked: &TrackedFile) -> Result<CheckOutcome> {
        self.store.mark_degraded(tracked.id)?;
        warn!(path = %tracked.path, "auto-restore disabled; file degraded");
        Ok(CheckOutcome::Degraded)
    }

    fn outcome_of(&self, tracked: &TrackedFile, attempt: Result<()>) -> CheckOutcome {
        match attempt {
            Ok(()) => CheckOutcome::Remediated,
            Err(e) => {
                error!(path = %tracked.path, error = %e, "remediation failed");
                CheckOutcome::RemediationFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Recreate the file from its baseline snapshot.
    pub fn restore(&self, tracked: &TrackedFile) -> Result<()> {
        let target = Path::new(&tracked.path);
        let snapshot = self.store.snapshot(tracked.id)?;
        let snapshot_digest = self.hasher.hash_bytes(&snapshot);
        if snapshot_digest != tracked.good_digest {
            return Err(SentinelError::Environment(format!(
                "baseline snapshot for {} is corrupted (expected {}, got {})",
                tracked.path, tracked.good_digest, snapshot_digest
            )));
        }

        if let Ok(observation) = self.prober.probe(target) {
            if observation.kind == EntryKind::Symlink {
                fs::remove_file(target)?;
                warn!(path = %tracked.path, "removed symbolic link planted over tracked file");
            }
        }

        let parent = target
            .parent()
            .ok_or_else(|| SentinelError::NotRegularFile(tracked.path.clone()))?;
        fs::create_dir_all(parent)?;

        let staging = parent.join(format!("{}{:08x}", STAGING_PREFIX, rand::random::<u32>()));
        if let Err(e) = self.write_staging(&staging, &snapshot, tracked) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        if let Err(e) = fs::rename(&staging, target) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        sync_dir(parent);

        self.verify(tracked)?;
        let restored = self.prober.probe(target)?;
        self.store
            .refresh_baseline_mod_time(tracked.id, restored.metadata.mod_time_ns)?;

        info!(path = %tracked.path, digest = %tracked.good_digest, "file restored from baseline");
        Ok(())
    }

    fn write_staging(&self, staging: &Path, snapshot: &[u8], tracked: &TrackedFile) -> Result<()> {
        let mut file = File::create(staging)?;
        file.write_all(snapshot)?;
        self.privileges
            .set_ownership(staging, tracked.baseline.owner, tracked.baseline.group)?;
        self.privileges
            .set_permission(staging, tracked.baseline.permission)?;
        file.sync_all()?;
        Ok(())
    }

    fn reapply_metadata(&self, tracked: &TrackedFile) -> Result<()> {
        let target = Path::new(&tracked.path);
        self.privileges
            .set_ownership(target, tracked.baseline.owner, tracked.baseline.group)?;
        self.privileges
            .set_permission(target, tracked.baseline.permission)?;

        let observation = self.prober.probe(target)?;
        if !tracked.baseline.same_ownership_and_mode(&observation.metadata) {
            return Err(SentinelError::Privilege {
                path: tracked.path.clone(),
                reason: "ownership or mode still differs after reapply".into(),
            });
        }
        info!(path = %tracked.path, "baseline ownership and mode reapplied");
        Ok(())
    }

    fn verify(&self, tracked: &TrackedFile) -> Result<()> {
        let target = Path::new(&tracked.path);
        let digest = self.hasher.hash_file(target)?;
        if digest != tracked.good_digest {
            return Err(SentinelError::Environment(format!(
                "post-restore verification failed for {}: expected {}, got {}",
                tracked.path, tracked.good_digest, digest
            )));
        }
        let observation = self.prober.probe(target)?;
        if observation.kind != EntryKind::Regular
            || !tracked.baseline.same_ownership_and_mode(&observation.metadata)
        {
            return Err(SentinelError::Privilege {
                path: tracked.path.clone(),
                reason: "restored file does not carry baseline ownership and mode".into(),
            });
        }
        Ok(())
    }
}

fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = OpenOptions::new().read(true).open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (dir, OpenOptions::new());
    }
}

/// Remove staging files orphaned by an interrupted restore in the
/// directories holding `paths`.
pub fn cleanup_staging(paths: &[PathBuf]) {
    let mut dirs: Vec<&Path> = paths.iter().filter_map(|p| p.parent()).collect();
    dirs.sort();
    dirs.dedup();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}
