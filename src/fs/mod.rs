use std::ffi::CString;
use std::fs;
use std::fs::{OpenOptions, Permissions};
use std::os::unix::fs::PermissionsExt;

use crate::common::{DmError, Result};

/// Changes the ownership of a file or directory.
///
/// # Arguments
/// * `path` - The path to the file or directory.
/// * `uid` - The user ID to set as the owner.
/// * `gid` - The group ID to set as the owner.
///
/// # Returns
/// A `Result` indicating success or a `DmError` if the operation fails.
pub fn chown(path: &str, uid: u32, gid: u32) -> Result<()> {
    let cpath =
        CString::new(path).map_err(|error| DmError::SystemError(format!("{}", error)))?;
    match unsafe { libc::chown(cpath.as_ptr(), uid, gid) } {
        0 => Ok(()),
        code => Err(DmError::SystemError(format!("Error changing ownership of file {}: {}", path, code))),
    }
}

/// Creates a directory and all its parent directories if they do not exist.
pub fn mkdir(path: &str) -> Result<()> {
    if fs::create_dir_all(path).is_err() {
        return Err(DmError::SystemError(format!("Could not create directory for path: {}", path)));
    }
    Ok(())
}

/// Changes the permissions of a file or directory.
///
/// # Arguments
/// * `path` - The path to the file or directory.
/// * `mode` - The permissions to set, in octal format (e.g., `0o600`).
pub fn chmod(path: &str, mode: u32) -> Result<()> {
    let mode = Permissions::from_mode(mode);
    if fs::set_permissions(path, mode).is_err() {
        return Err(DmError::SystemError(format!("Could not change permissions: {}", path)));
    }
    Ok(())
}

/// Creates an empty file if one does not already exist at the path.
pub fn touch(path: &str) -> Result<()> {
    if OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .is_err()
    {
        return Err(DmError::SystemError(format!("Could not create file: {}", path)));
    }
    Ok(())
}
