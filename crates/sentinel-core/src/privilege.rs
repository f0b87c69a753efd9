//! Ownership and permission changes, with the result reported to the caller.

use crate::{Result, SentinelError};
use std::path::Path;

pub trait PrivilegeOps {
    fn set_ownership(&self, path: &Path, owner: u32, group: u32) -> Result<()>;
    fn set_permission(&self, path: &Path, mode: u32) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPrivileges;

impl PrivilegeOps for SystemPrivileges {
    #[cfg(unix)]
    fn set_ownership(&self, path: &Path, owner: u32, group: u32) -> Result<()> {
        std::os::unix::fs::chown(path, Some(owner), Some(group)).map_err(|e| {
            SentinelError::Privilege {
                path: path.display().to_string(),
                reason: format!("chown {owner}:{group}: {e}"),
            }
        })
    }

    #[cfg(not(unix))]
    fn set_ownership(&self, _path: &Path, _owner: u32, _group: u32) -> Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn set_permission(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            SentinelError::Privilege {
                path: path.display().to_string(),
                reason: format!("chmod {mode:o}: {e}"),
            }
        })
    }

    #[cfg(not(unix))]
    fn set_permission(&self, path: &Path, mode: u32) -> Result<()> {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o222 == 0);
        std::fs::set_permissions(path, perms).map_err(|e| SentinelError::Privilege {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
