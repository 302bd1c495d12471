//! Login accounting into the system databases. The live utmp database is
//! updated through the utmpx API; on Linux, records are additionally
//! appended to wtmp (successful logins and logouts) or btmp (failed
//! logins). On BSD variants the wtmp/btmp appends are silently skipped.

use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(target_os = "linux")]
const WTMP_PATH: &str = "/var/log/wtmp";
#[cfg(target_os = "linux")]
const BTMP_PATH: &str = "/var/log/btmp";

/// Records a login attempt for a session.
///
/// # Arguments
/// * `vt` - The virtual terminal number as a string; empty when the
///   session has no terminal of its own.
/// * `display` - The display name, stored in the host field.
/// * `user` - The authenticated (or rejected) user name.
/// * `pid` - The session process id; zero when authentication failed
///   before a session existed.
/// * `success` - Whether authentication succeeded.
pub fn login(vt: &str, display: &str, user: &str, pid: i64, success: bool) {
    let entry = build_entry(libc::USER_PROCESS as libc::c_short, vt, display, user, pid);
    write_utmp(&entry);
    append_login_log(&entry, success);
}

/// Records the logout paired with an earlier login.
///
/// # Arguments
/// * `vt` - The virtual terminal number the session ran on.
/// * `display` - The display name.
/// * `pid` - The pid cached when the login record was written.
pub fn logout(vt: &str, display: &str, pid: i64) {
    let entry = build_entry(libc::DEAD_PROCESS as libc::c_short, vt, display, "", pid);
    write_utmp(&entry);
    append_logout_log(&entry);
}

#[cfg(target_os = "linux")]
fn append_login_log(entry: &libc::utmpx, success: bool) {
    if success {
        append_log(WTMP_PATH, entry);
    } else {
        append_log(BTMP_PATH, entry);
    }
}

#[cfg(not(target_os = "linux"))]
fn append_login_log(_entry: &libc::utmpx, _success: bool) {}

#[cfg(target_os = "linux")]
fn append_logout_log(entry: &libc::utmpx) {
    append_log(WTMP_PATH, entry);
}

#[cfg(not(target_os = "linux"))]
fn append_logout_log(_entry: &libc::utmpx) {}

/// Fills a utmpx record. String fields are truncated to the database
/// field widths and are always NUL terminated.
fn build_entry(kind: libc::c_short, vt: &str, display: &str, user: &str, pid: i64) -> libc::utmpx {
    let mut entry: libc::utmpx = unsafe { std::mem::zeroed() };
    entry.ut_type = kind;
    entry.ut_pid = pid as libc::pid_t;

    if !vt.is_empty() {
        copy_truncated(&mut entry.ut_line, &format!("tty{}", vt));
    }
    copy_truncated(&mut entry.ut_host, display);
    copy_truncated(&mut entry.ut_user, user);

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    entry.ut_tv.tv_sec = now.as_secs() as _;
    entry.ut_tv.tv_usec = now.subsec_micros() as _;
    entry
}

/// Copies at most `dst.len() - 1` bytes so the terminator stays in place.
fn copy_truncated(dst: &mut [libc::c_char], src: &str) {
    let bytes = src.as_bytes();
    let length = bytes.len().min(dst.len() - 1);
    for (index, byte) in bytes[..length].iter().enumerate() {
        dst[index] = *byte as libc::c_char;
    }
    dst[length] = 0;
}

fn write_utmp(entry: &libc::utmpx) {
    unsafe {
        libc::setutxent();
        if libc::pututxline(entry).is_null() {
            warn!("Failed to write utmp entry: {}", std::io::Error::last_os_error());
        }
        libc::endutxent();
    }
}

#[cfg(target_os = "linux")]
extern "C" {
    fn updwtmpx(wtmpx_file: *const libc::c_char, utmpx: *const libc::utmpx);
}

#[cfg(target_os = "linux")]
fn append_log(path: &str, entry: &libc::utmpx) {
    let cpath = match std::ffi::CString::new(path) {
        Ok(cpath) => cpath,
        Err(_) => return,
    };
    unsafe { updwtmpx(cpath.as_ptr(), entry) };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_str(field: &[libc::c_char]) -> String {
        field
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8 as char)
            .collect()
    }

    #[test]
    fn entry_carries_line_host_and_user() {
        let entry = build_entry(libc::USER_PROCESS as libc::c_short, "7", ":1", "alice", 4242);

        assert_eq!(entry.ut_type, libc::USER_PROCESS as libc::c_short);
        assert_eq!(entry.ut_pid, 4242);
        assert_eq!(field_str(&entry.ut_line), "tty7");
        assert_eq!(field_str(&entry.ut_host), ":1");
        assert_eq!(field_str(&entry.ut_user), "alice");
        assert!(entry.ut_tv.tv_sec > 0);
    }

    #[test]
    fn logout_entry_has_no_user() {
        let entry = build_entry(libc::DEAD_PROCESS as libc::c_short, "7", ":1", "", 4242);
        assert_eq!(field_str(&entry.ut_user), "");
        assert_eq!(field_str(&entry.ut_line), "tty7");
    }

    #[test]
    fn empty_terminal_leaves_the_line_blank() {
        let entry = build_entry(libc::USER_PROCESS as libc::c_short, "", ":1", "alice", 1);
        assert_eq!(field_str(&entry.ut_line), "");
    }

    #[test]
    fn oversized_fields_are_truncated_and_terminated() {
        let mut buffer = [1 as libc::c_char; 8];
        copy_truncated(&mut buffer, "abcdefghijklmnop");
        assert_eq!(field_str(&buffer), "abcdefg");
        assert_eq!(buffer[7], 0);
    }
}
