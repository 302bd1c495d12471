use std::io::Write;
use std::process::{Command, Stdio};

use nix::unistd::User;

use crate::common::{DmError, Result};
use crate::fs;

/// Writes the cookie record for `display` into the authority file by
/// driving the external xauth tool. The on-disk format is versioned by the
/// X ecosystem, so the tool is authoritative for it.
///
/// The file is touched first: an empty authority file would disable access
/// control entirely.
///
/// # Arguments
/// * `xauth_path` - Path to the xauth executable.
/// * `file` - The authority file to rewrite.
/// * `display` - The display name the record is keyed on.
/// * `cookie` - The cookie value to store.
///
/// # Returns
/// A `Result` indicating success or `AuthWriteFailed`.
pub fn add_cookie(xauth_path: &str, file: &str, display: &str, cookie: &str) -> Result<()> {
    debug!("Adding cookie for display {} to {}", display, file);

    fs::touch(file)?;

    let mut child = Command::new(xauth_path)
        .args(["-f", file, "-q"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|error| DmError::AuthWriteFailed(format!("Failed to spawn {}: {}", xauth_path, error)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| DmError::AuthWriteFailed("xauth stdin is unavailable".to_string()))?;
    let batch = format!("remove {}\nadd {} . {}\nexit\n", display, display, cookie);
    stdin
        .write_all(batch.as_bytes())
        .map_err(|error| DmError::AuthWriteFailed(format!("Failed to write xauth commands: {}", error)))?;
    drop(stdin);

    let status = child
        .wait()
        .map_err(|error| DmError::AuthWriteFailed(format!("Failed to wait for xauth: {}", error)))?;
    if !status.success() {
        return Err(DmError::AuthWriteFailed(format!("xauth exited with {}", status)));
    }
    Ok(())
}

/// Transfers ownership of the authority file to the unprivileged service
/// user. A missing user leaves the file root-owned; the greeter may fail
/// later, which is reported there rather than here.
///
/// # Arguments
/// * `file` - The authority file.
/// * `service_user` - Name of the unprivileged service user.
pub fn change_owner(file: &str, service_user: &str) {
    match User::from_name(service_user) {
        Ok(Some(user)) => {
            if let Err(error) = fs::chown(file, user.uid.as_raw(), user.gid.as_raw()) {
                warn!("Failed to change owner of the auth file: {}", error);
            }
        }
        _ => {
            warn!("Failed to find the {} user. Owner of the auth file will not be changed.", service_user);
        }
    }
}
