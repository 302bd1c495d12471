use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use nix::unistd::{setgid, setgroups, setsid, setuid, Gid, Uid};

use crate::auth::Account;
use crate::common::{DmError, ProcessHandle, Result};

/// The `UserSession` struct owns the user-facing session process: the
/// merged environment it will see, the spawn under the target user's
/// identity, and the pid cached for logout accounting.
pub struct UserSession {
    exec: String,
    environment: HashMap<String, String>,
    process: Option<ProcessHandle>,
    cached_pid: i64,
}

impl UserSession {
    pub fn new(exec: &str) -> Self {
        UserSession {
            exec: exec.to_string(),
            environment: HashMap::new(),
            process: None,
            cached_pid: 0,
        }
    }

    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Replaces the session environment. Set once, after every
    /// contribution has been merged, so no stale view survives.
    pub fn set_environment(&mut self, environment: HashMap<String, String>) {
        self.environment = environment;
    }

    /// Returns the named environment value, or an empty string.
    pub fn env(&self, key: &str) -> String {
        self.environment.get(key).cloned().unwrap_or_default()
    }

    /// Spawns the session process as `account`, dropping privileges in the
    /// child. The command runs through the shell so session entries with
    /// arguments work unchanged.
    ///
    /// # Arguments
    /// * `account` - The identity the session runs under.
    ///
    /// # Returns
    /// A `Result` containing the session pid.
    pub fn spawn(&mut self, account: &Account) -> Result<i64> {
        let shell_command = format!("exec {}", self.exec);
        let workdir = if Path::new(account.home()).is_dir() {
            account.home()
        } else {
            "/"
        };

        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(&shell_command)
            .env_clear()
            .envs(&self.environment)
            .current_dir(workdir);

        // Convert u32 groups to Gid and set supplementary groups
        let gids: Vec<Gid> = account.groups().iter().map(|&g| Gid::from_raw(g)).collect();
        let uid = Uid::from_raw(account.uid());
        let gid = Gid::from_raw(account.gid());

        unsafe {
            // The `pre_exec` function drops privileges to the target user
            // before executing the command, and detaches the session from
            // the helper's process group.
            command.pre_exec(move || {
                setsid().map_err(std::io::Error::from)?;
                setgroups(&gids).map_err(std::io::Error::from)?;
                setgid(gid).map_err(std::io::Error::from)?;
                setuid(uid).map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        debug!("Spawning session command: {}", format!("{:?}", command).replace('\"', ""));
        let process = ProcessHandle::new(&mut command).map_err(|error| {
            error!("Failed to spawn session process: {}", error);
            DmError::SessionError(format!("Failed to spawn session: {}", error))
        })?;

        self.cached_pid = process.pid() as i64;
        self.process = Some(process);
        Ok(self.cached_pid)
    }

    /// The pid recorded at spawn time; stays valid for logout accounting
    /// after the process is gone.
    pub fn cached_pid(&self) -> i64 {
        self.cached_pid
    }

    /// Blocks until the session process exits.
    ///
    /// # Returns
    /// A `Result` containing the session's exit code.
    pub fn wait(&self) -> Result<i32> {
        match &self.process {
            Some(process) => {
                let status = process.wait()?;
                Ok(status.code().unwrap_or(1))
            }
            None => Err(DmError::SessionError("No session process to wait for".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_is_replaced_wholesale() {
        let mut session = UserSession::new("/usr/bin/true");
        let mut environment = HashMap::new();
        environment.insert("DISPLAY".to_string(), ":7".to_string());
        session.set_environment(environment);

        assert_eq!(session.env("DISPLAY"), ":7");
        assert_eq!(session.env("MISSING"), "");
    }
}
