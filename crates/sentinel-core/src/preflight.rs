//! Environment gate run before the daemon starts or a manual sweep.
//!
//! The data directory and the store must belong to the effective user and
//! must not be writable by group or others; otherwise anyone able to edit the
//! store could rewrite the baselines being enforced.

use crate::settings::SentinelSettings;
use crate::{Result, SentinelError};
use std::path::Path;

pub fn validate_environment(
    data_dir: &Path,
    store_path: &Path,
    settings: &SentinelSettings,
) -> Result<()> {
    let dir_meta = std::fs::metadata(data_dir).map_err(|e| {
        SentinelError::Environment(format!("data directory {}: {e}", data_dir.display()))
    })?;
    if !dir_meta.is_dir() {
        return Err(SentinelError::Environment(format!(
            "{} is not a directory",
            data_dir.display()
        )));
    }
    if !store_path.is_file() {
        return Err(SentinelError::StoreMissing(store_path.display().to_string()));
    }

    #[cfg(unix)]
    {
        check_ownership(data_dir)?;
        check_ownership(store_path)?;
    }

    settings.validate()
}

#[cfg(unix)]
fn check_ownership(path: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path)?;
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if meta.uid() != euid {
        return Err(SentinelError::Environment(format!(
            "{} is owned by uid {}, expected {}",
            path.display(),
            meta.uid(),
            euid
        )));
    }
    if meta.mode() & 0o022 != 0 {
        return Err(SentinelError::Environment(format!(
            "{} is writable by group or others (mode {:o})",
            path.display(),
            meta.mode() & 0o7777
        )));
    }
    Ok(())
}
