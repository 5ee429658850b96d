//! Whole-file artifact writes.
//!
//! The launch-agent and unit directories are shared, last-write-wins
//! resources, so artifacts are never patched in place: content goes to a
//! sibling temp file that is synced and renamed over the target.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, ServiceError};

/// Write `content` to `path` atomically with mode 0644
pub(crate) fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| ServiceError::InstallFailed(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| {
        ServiceError::InstallFailed(format!("Failed to create {}: {e}", parent.display()))
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{file_name}.tmp"));

    {
        let mut file = fs::File::create(&temp_path).map_err(|e| {
            ServiceError::InstallFailed(format!("Failed to create temp file: {e}"))
        })?;

        file.write_all(content.as_bytes())
            .map_err(|e| ServiceError::InstallFailed(format!("Failed to write temp file: {e}")))?;

        file.sync_all()
            .map_err(|e| ServiceError::InstallFailed(format!("Failed to sync temp file: {e}")))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o644)).map_err(|e| {
            ServiceError::InstallFailed(format!("Failed to set artifact permissions: {e}"))
        })?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        ServiceError::InstallFailed(format!("Failed to rename temp file: {e}"))
    })?;

    Ok(())
}

/// Remove `path`; returns whether a file was actually removed
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
