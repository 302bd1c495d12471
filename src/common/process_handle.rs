use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use shared_child::SharedChild;

use crate::common::{DmError, Result};

/// The `ProcessHandle` struct represents a handle to a child process
/// supervised by the daemon. Clones share the underlying child, so one
/// thread can wait for it while another signals it.
#[derive(Clone)]
pub struct ProcessHandle {
    process: Arc<SharedChild>,
}

impl ProcessHandle {
    /// Creates a new `ProcessHandle` by spawning a process using the provided command.
    ///
    /// # Arguments
    /// * `command` - The command to execute.
    ///
    /// # Returns
    /// A `Result` containing the `ProcessHandle` or a `DmError` if the process could not be spawned.
    pub fn new(command: &mut Command) -> Result<ProcessHandle> {
        Ok(ProcessHandle {
            process: Arc::new(SharedChild::spawn(command)?),
        })
    }

    /// Returns the process ID (PID) of the process.
    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// Kills the process associated with this handle.
    pub fn kill(&self) -> Result<()> {
        match self.process.kill() {
            Ok(_) => Ok(()),
            Err(error) => Err(DmError::IoError(error)),
        }
    }

    /// Requests a polite termination by sending SIGTERM.
    pub fn terminate(&self) -> Result<()> {
        kill(Pid::from_raw(self.pid() as i32), Signal::SIGTERM)
            .map_err(|error| DmError::SystemError(format!("Failed to signal process {}: {}", self.pid(), error)))
    }

    pub fn is_running(&self) -> Option<bool> {
        let terminate_result = self.process.try_wait();
        match terminate_result {
            Ok(expected_status) => match expected_status {
                // Process already exited
                Some(_status) => Some(false),
                None => Some(true),
            },
            Err(error) => {
                warn!("Failed to wait for process [pid={}]. Error: {}", self.process.id(), error);
                None
            }
        }
    }

    /// Blocks until the process exits.
    pub fn wait(&self) -> Result<ExitStatus> {
        self.process.wait().map_err(DmError::IoError)
    }

    /// Polls the process until it exits or the timeout elapses.
    ///
    /// # Arguments
    /// * `timeout` - How long to wait before giving up.
    ///
    /// # Returns
    /// The exit status, or `None` if the process is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.process.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => {}
                Err(error) => {
                    warn!("Failed to wait for process [pid={}]. Error: {}", self.process.id(), error);
                    return None;
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}
