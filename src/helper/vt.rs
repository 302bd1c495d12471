use std::fs::OpenOptions;
use std::os::fd::AsRawFd;

use crate::common::{DmError, Result};

const VT_OPENQRY: libc::c_ulong = 0x5605;

/// Asks the console multiplexer for the first free virtual terminal.
/// Wayland sessions are given a fresh terminal so they never share the
/// caller's.
///
/// # Returns
/// A `Result` containing the allocated terminal number.
pub fn allocate() -> Result<i32> {
    let tty = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty0")
        .map_err(|error| DmError::SystemError(format!("Could not open /dev/tty0: {}", error)))?;

    let mut vt: libc::c_int = 0;
    let rc = unsafe { libc::ioctl(tty.as_raw_fd(), VT_OPENQRY as _, &mut vt) };
    if rc < 0 || vt <= 0 {
        return Err(DmError::SystemError("No free virtual terminal is available".to_string()));
    }
    Ok(vt)
}
