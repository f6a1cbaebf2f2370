//! Atomic replacement of output files.
//!
//! Writers stage their content in a uniquely named temporary file next to
//! the destination and then [`publish`] it with a single rename, so readers
//! see either the old file or the complete new one and concurrent writers to
//! the same destination never share a staging file.

use std::fs;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::core::errors::{BobbinError, Result};

/// Mode of every published file
#[cfg(unix)]
pub const PUBLISHED_MODE: u32 = 0o644;

/// Fresh staging file in the directory of `dest`, which is created if needed
pub fn stage_for(dest: &Path) -> Result<NamedTempFile> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| {
        BobbinError::io(format!("Failed to create directory: {}", parent.display()), e)
    })?;
    NamedTempFile::new_in(parent).map_err(|e| {
        BobbinError::io(format!("Failed to stage {} in {}", dest.display(), parent.display()), e)
    })
}

/// Move a staged file over `dest`.
///
/// Temporary files are created owner-only; the published file gets
/// [`PUBLISHED_MODE`] on unix.
pub fn publish(staged: NamedTempFile, dest: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        staged
            .as_file()
            .set_permissions(fs::Permissions::from_mode(PUBLISHED_MODE))
            .map_err(|e| {
                BobbinError::io(format!("Failed to set permissions for {}", dest.display()), e)
            })?;
    }
    staged.persist(dest).map_err(|e| {
        BobbinError::io(format!("Failed to move {} into place", dest.display()), e.error)
    })?;
    Ok(())
}

/// Copy `source` to `dest` through a staging file
pub fn copy_into_place(source: &Path, dest: &Path) -> Result<u64> {
    let staged = stage_for(dest)?;
    let size = fs::copy(source, staged.path()).map_err(|e| {
        BobbinError::io(
            format!("Failed to copy {} to {}", source.display(), dest.display()),
            e,
        )
    })?;
    publish(staged, dest)?;
    Ok(size)
}
