use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::unix::net::{UnixListener, UnixStream};
use std::process::Command;
use std::thread;
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::common::{DmError, ProcessHandle, Result, Settings};
use crate::display::Seat;
use crate::helper::{HELPER_AUTH_ERROR, HELPER_OTHER_ERROR, HELPER_SESSION_ERROR, HELPER_SUCCESS};
use crate::ipc::message::{Opcode, Request};
use crate::ipc::stream::FramedStream;
use crate::ipc::wire::{Reader, Writer};
use crate::session::{Greeter, SessionDescriptor, SessionType};

/// Result of one helper run, translated from its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    AuthenticationFailed,
    SessionFailed,
    HelperFailed,
    SessionExited(i32),
}

/// The `SessionLauncher` struct is the unprivileged side of the privilege
/// boundary. It spawns the setuid helper for one authentication attempt,
/// mediates the helper's message exchange and translates the helper's exit
/// code into an outcome. `run` borrows the launcher exclusively for the
/// whole attempt, so at most one helper is in flight per display.
pub struct SessionLauncher<'a> {
    settings: &'a Settings,
    display: String,
    cookie: String,
}

impl<'a> SessionLauncher<'a> {
    /// Creates a launcher for one display.
    ///
    /// # Arguments
    /// * `settings` - Configuration snapshot.
    /// * `display` - Display name of the seat's running X server.
    /// * `cookie` - That display's authority cookie.
    pub fn new(settings: &'a Settings, display: &str, cookie: &str) -> Self {
        SessionLauncher {
            settings,
            display: display.to_string(),
            cookie: cookie.to_string(),
        }
    }

    /// Runs one authentication attempt through the helper.
    ///
    /// # Arguments
    /// * `descriptor` - The session to authenticate for and launch.
    /// * `auth_path` - The daemon's authority file for the display.
    /// * `seat` - The seat the session binds to.
    /// * `greeter` - Prompt mediator.
    /// * `autologin` - Skip interactive authentication.
    /// * `start_session` - When false the helper only verifies credentials
    ///   and no session is launched; the reply cookie is left empty.
    ///
    /// # Returns
    /// A `Result` containing the translated `SessionOutcome`.
    pub fn run(
        &mut self,
        descriptor: &SessionDescriptor,
        auth_path: &str,
        seat: &Seat,
        greeter: &mut dyn Greeter,
        autologin: bool,
        start_session: bool,
    ) -> Result<SessionOutcome> {
        let socket_path = format!("{}/helper-{}", self.settings.runtime.dir, Uuid::new_v4().simple());
        let id: i64 = rand::rng().random_range(1..i64::MAX);

        // Listen before the helper exists so its connect cannot race us
        let listener = UnixListener::bind(&socket_path)?;
        listener.set_nonblocking(true)?;

        let args = helper_args(&socket_path, id, descriptor, autologin, start_session);
        debug!("Spawning helper: {} {}", self.settings.helper.path, args.join(" "));
        let mut command = Command::new(&self.settings.helper.path);
        command.args(&args);
        let helper = ProcessHandle::new(&mut command)
            .map_err(|error| DmError::HelperError(format!("Failed to spawn helper: {}", error)))?;

        let mut environment = descriptor.session_environment(&self.display, auth_path, seat);
        environment.insert("XCURSOR_THEME".to_string(), self.settings.theme.cursor_theme.clone());
        let cookie = if start_session { self.cookie.clone() } else { String::new() };

        let result = accept(&listener, &helper).and_then(|stream| {
            let mut stream = FramedStream::new(stream);
            drive(&mut stream, id, &environment, &cookie, greeter)
        });

        if let Err(error) = std::fs::remove_file(&socket_path) {
            warn!("Failed to remove helper socket {}: {}", socket_path, error);
        }

        let status = helper.wait()?;
        result?;

        Ok(match status.code() {
            Some(code) => outcome_from_status(code),
            None => SessionOutcome::HelperFailed,
        })
    }
}

/// Waits for the helper to connect, polling its liveness so a helper that
/// dies before connecting unblocks the daemon.
fn accept(listener: &UnixListener, helper: &ProcessHandle) -> Result<UnixStream> {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => {
                if helper.is_running() == Some(false) {
                    return Err(DmError::HelperError("Helper exited before connecting".to_string()));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(error) => return Err(DmError::IoError(error)),
        }
    }
}

/// Consumes the helper's frames until it hangs up. The HELLO id must match
/// the one this attempt was spawned with; an unknown peer is rejected.
fn drive(
    stream: &mut FramedStream,
    id: i64,
    environment: &HashMap<String, String>,
    cookie: &str,
    greeter: &mut dyn Greeter,
) -> Result<()> {
    loop {
        let (opcode, payload) = match stream.recv() {
            Ok(frame) => frame,
            Err(DmError::IoError(ref error)) if error.kind() == ErrorKind::UnexpectedEof => break,
            Err(error) => return Err(error),
        };
        let mut reader = Reader::new(&payload);

        match opcode {
            Opcode::Hello => {
                let peer = reader.get_i64()?;
                if peer != id {
                    return Err(DmError::ProtocolViolation(format!("helper announced id {} but {} was expected", peer, id)));
                }
                debug!("Helper {} connected", peer);
            }
            Opcode::Info => {
                let message = reader.get_str()?;
                let kind = reader.get_i32()?;
                greeter.info(&message, kind);
            }
            Opcode::Error => {
                let message = reader.get_str()?;
                let kind = reader.get_i32()?;
                greeter.error(&message, kind);
            }
            Opcode::Request => {
                let request = Request::decode(&mut reader)?;
                let answered = greeter.request(request);
                let mut writer = Writer::new();
                answered.encode(&mut writer);
                stream.send(Opcode::Request, writer)?;
            }
            Opcode::Authenticated => {
                let user = reader.get_str()?;
                if user.is_empty() {
                    info!("Authentication failed");
                    continue;
                }
                info!("User {} authenticated", user);
                let mut writer = Writer::new();
                writer.put_str(&user);
                writer.put_env(environment);
                writer.put_str(cookie);
                stream.send(Opcode::Authenticated, writer)?;
            }
            Opcode::SessionStatus => {
                let success = reader.get_bool()?;
                if success {
                    info!("Session opened");
                } else {
                    warn!("Session failed to open");
                }
                stream.send(Opcode::SessionStatus, Writer::new())?;
            }
        }
    }
    Ok(())
}

/// Assembles the helper's invocation parameters.
fn helper_args(
    socket_path: &str,
    id: i64,
    descriptor: &SessionDescriptor,
    autologin: bool,
    start_session: bool,
) -> Vec<String> {
    let mut args = vec![
        "--socket".to_string(),
        socket_path.to_string(),
        "--id".to_string(),
        id.to_string(),
    ];
    if !descriptor.user().is_empty() {
        args.push("--user".to_string());
        args.push(descriptor.user().to_string());
    }
    if start_session {
        args.push("--start".to_string());
        args.push(descriptor.exec().to_string());
    }
    if autologin {
        args.push("--autologin".to_string());
    }
    if descriptor.session_type() == SessionType::Greeter {
        args.push("--greeter".to_string());
    }
    args
}

fn outcome_from_status(code: i32) -> SessionOutcome {
    match code {
        HELPER_SUCCESS => SessionOutcome::Success,
        HELPER_AUTH_ERROR => SessionOutcome::AuthenticationFailed,
        HELPER_SESSION_ERROR => SessionOutcome::SessionFailed,
        HELPER_OTHER_ERROR => SessionOutcome::HelperFailed,
        status => SessionOutcome::SessionExited(status),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::ipc::message::Prompt;
    use crate::session::StaticGreeter;

    #[test]
    fn outcomes_follow_helper_exit_codes() {
        assert_eq!(outcome_from_status(0), SessionOutcome::Success);
        assert_eq!(outcome_from_status(1), SessionOutcome::AuthenticationFailed);
        assert_eq!(outcome_from_status(2), SessionOutcome::SessionFailed);
        assert_eq!(outcome_from_status(3), SessionOutcome::HelperFailed);
        assert_eq!(outcome_from_status(70), SessionOutcome::SessionExited(70));
    }

    #[test]
    fn helper_args_carry_the_invocation() {
        let descriptor = SessionDescriptor::new("/usr/bin/greeter", "seatdm", SessionType::Greeter);
        let args = helper_args("/run/s", 41, &descriptor, false, true);
        assert_eq!(
            args,
            [
                "--socket", "/run/s", "--id", "41", "--user", "seatdm", "--start",
                "/usr/bin/greeter", "--greeter"
            ]
            .map(String::from)
        );

        let check_only = helper_args("/run/s", 41, &descriptor, true, false);
        assert!(!check_only.contains(&"--start".to_string()));
        assert!(check_only.contains(&"--autologin".to_string()));
    }

    #[test]
    fn drive_mediates_a_full_helper_exchange() {
        let (daemon_side, helper_side) = UnixStream::pair().unwrap();
        let id = 77;
        let secret = "hunter2";

        let helper = std::thread::spawn(move || {
            let mut stream = FramedStream::new(helper_side);

            let mut hello = Writer::new();
            hello.put_i64(id);
            stream.send(Opcode::Hello, hello).unwrap();

            // One secret prompt, answered by the greeter
            let mut request = Writer::new();
            Request { prompts: vec![Prompt::secret("Password:")] }.encode(&mut request);
            stream.send(Opcode::Request, request).unwrap();
            let payload = stream.expect(Opcode::Request).unwrap();
            let reply = Request::decode(&mut Reader::new(&payload)).unwrap();
            assert_eq!(reply.prompts[0].response, secret);

            let mut authenticated = Writer::new();
            authenticated.put_str("alice");
            stream.send(Opcode::Authenticated, authenticated).unwrap();
            let payload = stream.expect(Opcode::Authenticated).unwrap();
            let mut reader = Reader::new(&payload);
            assert_eq!(reader.get_str().unwrap(), "alice");
            let environment = reader.get_env().unwrap();
            assert_eq!(environment["DISPLAY"], ":7");
            assert_eq!(reader.get_str().unwrap(), "c00kie");

            let mut status = Writer::new();
            status.put_bool(true);
            stream.send(Opcode::SessionStatus, status).unwrap();
            stream.expect(Opcode::SessionStatus).unwrap();
        });

        let mut environment = HashMap::new();
        environment.insert("DISPLAY".to_string(), ":7".to_string());
        let mut greeter = StaticGreeter::new("alice", secret);
        let mut stream = FramedStream::new(daemon_side);
        drive(&mut stream, id, &environment, "c00kie", &mut greeter).unwrap();
        helper.join().unwrap();
    }

    #[test]
    fn drive_rejects_a_foreign_hello() {
        let (daemon_side, helper_side) = UnixStream::pair().unwrap();

        let helper = std::thread::spawn(move || {
            let mut stream = FramedStream::new(helper_side);
            let mut hello = Writer::new();
            hello.put_i64(123);
            stream.send(Opcode::Hello, hello).unwrap();
        });

        let mut greeter = StaticGreeter::new("", "");
        let mut stream = FramedStream::new(daemon_side);
        let result = drive(&mut stream, 456, &HashMap::new(), "", &mut greeter);
        assert!(matches!(result, Err(DmError::ProtocolViolation(_))));
        helper.join().unwrap();
    }
}
