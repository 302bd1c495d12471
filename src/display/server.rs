use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::AsRawFd;
use std::process::Command;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nix::unistd::pipe;
use uuid::Uuid;

use crate::auth::{authority, cookie};
use crate::common::{DmError, ProcessHandle, Result, Settings};
use crate::display::Seat;

/// Lifecycle states of one supervised X server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Notifications emitted to the owner, exactly once each per lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Started,
    Stopped,
}

/// The `XorgServer` struct supervises a single X server for a seat: it
/// provisions the authority cookie, spawns the server, learns the display
/// number over a pipe, runs the setup and stop hooks and tears the display
/// down again.
pub struct XorgServer {
    settings: Settings,
    seat: Seat,
    display: String,
    auth_path: String,
    cookie: String,
    state: Arc<Mutex<DisplayState>>,
    process: Option<ProcessHandle>,
    events: Sender<DisplayEvent>,
}

impl XorgServer {
    /// Creates a new `XorgServer` instance for a seat. The authority file
    /// path is allocated under the runtime directory with a fresh unique
    /// name and the cookie is generated up front.
    ///
    /// # Arguments
    /// * `settings` - Configuration snapshot the supervisor runs with.
    /// * `seat` - The seat the server is bound to.
    /// * `events` - Channel the lifecycle notifications are sent on.
    pub fn new(settings: &Settings, seat: Seat, events: Sender<DisplayEvent>) -> Self {
        let auth_path = format!("{}/{}", settings.runtime.dir, Uuid::new_v4());
        Self {
            settings: settings.clone(),
            seat,
            display: ":0".to_string(),
            auth_path,
            cookie: cookie::generate(),
            state: Arc::new(Mutex::new(DisplayState::Idle)),
            process: None,
            events,
        }
    }

    /// Returns the display name, `:N`. Meaningful once the server runs.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Returns the path of the authority file for this display.
    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }

    /// Returns the cookie of this display instance.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn state(&self) -> DisplayState {
        *self.state.lock().unwrap()
    }

    /// Starts the X server and blocks until it has reported its display
    /// number. On success the authority file carries a record for the real
    /// display name, is owned by the service user, and `Started` has been
    /// emitted.
    ///
    /// # Returns
    /// A `Result` indicating success or the failure reported by the start
    /// protocol. Failures are not retried here; retry policy belongs to
    /// the owner.
    pub fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != DisplayState::Idle {
                return Err(DmError::SessionError(format!("Display server cannot start from the {:?} state", *state)));
            }
            *state = DisplayState::Starting;
        }

        info!("Display server starting on seat {}...", self.seat.name());

        // The X server never reads the display-number field of its own
        // authority file, but an empty file disables access control.
        self.display = ":0".to_string();
        if let Err(error) = authority::add_cookie(&self.settings.x11.xauth_path, &self.auth_path, &self.display, &self.cookie) {
            error!("Failed to write xauth file");
            *self.state.lock().unwrap() = DisplayState::Stopped;
            return Err(error);
        }

        // Pipe for learning the display number from the X server
        let (read_end, write_end) = match pipe() {
            Ok(ends) => ends,
            Err(error) => {
                *self.state.lock().unwrap() = DisplayState::Stopped;
                return Err(DmError::SystemError(format!("Could not create pipe to start X server: {}", error)));
            }
        };

        let (args, display) = self.assemble_args(write_end.as_raw_fd());
        self.display = display;

        let mut command = Command::new(&self.settings.x11.server_path);
        command.args(&args);
        command.env("XCURSOR_THEME", &self.settings.theme.cursor_theme);

        debug!("Running: {} {}", self.settings.x11.server_path, args.join(" "));
        let process = match ProcessHandle::new(&mut command) {
            Ok(process) => process,
            Err(error) => {
                drop(read_end);
                drop(write_end);
                *self.state.lock().unwrap() = DisplayState::Stopped;
                return Err(DmError::ServerSpawnFailed(format!("Failed to start display server process: {}", error)));
            }
        };
        self.process = Some(process.clone());

        // Close the write end in our process, otherwise reading from the
        // pipe may block past the X server's exit.
        drop(write_end);

        if !self.settings.x11.enable_nesting {
            let mut reader = BufReader::new(File::from(read_end));
            let mut line = String::new();
            if let Err(error) = reader.read_line(&mut line) {
                error!("Failed to read display number from pipe: {}", error);
                *self.state.lock().unwrap() = DisplayState::Stopped;
                return Err(DmError::DisplayNumberMissing);
            }
            match parse_display(line.as_bytes()) {
                Ok(display) => self.display = display,
                Err(error) => {
                    error!("Failed to read display number from pipe");
                    *self.state.lock().unwrap() = DisplayState::Stopped;
                    return Err(error);
                }
            }
        }

        // The greeter's copy of the authority file does care about the
        // display number. Write the proper record if it differs.
        if self.display != ":0" {
            if let Err(error) = authority::add_cookie(&self.settings.x11.xauth_path, &self.auth_path, &self.display, &self.cookie) {
                error!("Failed to write xauth file");
                *self.state.lock().unwrap() = DisplayState::Stopped;
                return Err(error);
            }
        }
        authority::change_owner(&self.auth_path, &self.settings.users.service_user);

        *self.state.lock().unwrap() = DisplayState::Running;
        info!("Display server started on display {}", self.display);

        self.spawn_exit_observer(&process);
        self.events.send(DisplayEvent::Started).ok();
        Ok(())
    }

    /// Requests a polite termination and escalates to a kill after five
    /// seconds. The exit observer performs the actual teardown.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != DisplayState::Running {
                return Ok(());
            }
            *state = DisplayState::Stopping;
        }

        info!("Display server stopping...");

        if let Some(process) = &self.process {
            // The server may beat the signal by exiting on its own
            if let Err(error) = process.terminate() {
                warn!("Failed to signal display server: {}", error);
            }
            if process.wait_timeout(Duration::from_secs(5)).is_none() {
                warn!("Display server did not terminate in time, killing it");
                process.kill()?;
            }
        }
        Ok(())
    }

    /// Post-start display preparation: sets the default cursor and runs
    /// the configured display setup script. Callable once running. The
    /// setup script may rewrite the on-disk configuration, so the owner
    /// should reload its settings afterwards.
    pub fn setup_display(&self) -> Result<()> {
        if self.state() != DisplayState::Running {
            return Err(DmError::SessionError("Display server is not running".to_string()));
        }

        let environment = [
            ("DISPLAY", self.display.as_str()),
            ("HOME", "/"),
            ("PATH", self.settings.users.default_path.as_str()),
            ("XAUTHORITY", self.auth_path.as_str()),
            ("SHELL", "/bin/sh"),
            ("XCURSOR_THEME", self.settings.theme.cursor_theme.as_str()),
        ];

        debug!("Setting default cursor");
        if let Err(error) = run_hook("xsetroot -cursor_name left_ptr", &environment, Duration::from_secs(1)) {
            warn!("Could not setup default cursor: {}", error);
        }

        debug!("Running display setup script {}", self.settings.x11.display_command);
        if let Err(error) = run_hook(&self.settings.x11.display_command, &environment, Duration::from_secs(30)) {
            warn!("Display setup script failed: {}", error);
        }
        Ok(())
    }

    /// Watches for process exit and performs the teardown: the stop hook
    /// runs, the authority file is removed and `Stopped` is emitted, in
    /// that order, exactly once, no matter how the server died.
    fn spawn_exit_observer(&self, process: &ProcessHandle) {
        let process = process.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let display = self.display.clone();
        let auth_path = self.auth_path.clone();
        let stop_command = self.settings.x11.display_stop_command.clone();
        let default_path = self.settings.users.default_path.clone();

        thread::spawn(move || {
            if let Err(error) = process.wait() {
                warn!("Failed to wait for display server: {}", error);
            }
            Self::on_exit(&state, &events, &display, &auth_path, &stop_command, &default_path);
        });
    }

    fn on_exit(
        state: &Mutex<DisplayState>,
        events: &Sender<DisplayEvent>,
        display: &str,
        auth_path: &str,
        stop_command: &str,
        default_path: &str,
    ) {
        {
            let mut state = state.lock().unwrap();
            let was_live = matches!(*state, DisplayState::Running | DisplayState::Stopping);
            *state = DisplayState::Stopped;
            if !was_live {
                return;
            }
        }

        info!("Display server stopped.");

        let environment = [
            ("DISPLAY", display),
            ("HOME", "/"),
            ("PATH", default_path),
            ("SHELL", "/bin/sh"),
        ];
        debug!("Running display stop script {}", stop_command);
        if let Err(error) = run_hook(stop_command, &environment, Duration::from_secs(5)) {
            warn!("Display stop script failed: {}", error);
        }

        if let Err(error) = std::fs::remove_file(auth_path) {
            warn!("Failed to remove authority file {}: {}", auth_path, error);
        }

        events.send(DisplayEvent::Stopped).ok();
    }

    /// Assembles the X server argument list. The returned display name is
    /// the explicit one in the nested branch and the `:0` placeholder
    /// otherwise.
    fn assemble_args(&self, write_fd: i32) -> (Vec<String>, String) {
        let x11 = &self.settings.x11;

        let mut args: Vec<String> = x11
            .server_arguments
            .split(' ')
            .filter(|token| !token.is_empty())
            .map(String::from)
            .collect();
        args.push("-background".to_string());
        args.push("none".to_string());
        args.push("-seat".to_string());
        args.push(self.seat.name().to_string());

        let display = if x11.enable_nesting {
            let display = format!(":{}", self.seat.index() + 1);
            args.push(display.clone());
            args.push("-config".to_string());
            args.push(format!("{}/{}.conf", x11.seat_conf_dir, self.seat.name()));
            args.push("-layout".to_string());
            args.push("Nested".to_string());
            if self.seat.is_primary() {
                args.push("-keeptty".to_string());
            } else {
                args.push("-sharevts".to_string());
            }
            display
        } else {
            args.push("-noreset".to_string());
            args.push("-displayfd".to_string());
            args.push(write_fd.to_string());
            if self.seat.is_primary() {
                args.push(format!("vt{}", self.seat.terminal_id()));
            }
            ":0".to_string()
        };

        args.push("-auth".to_string());
        args.push(self.auth_path.clone());

        (args, display)
    }
}

/// Parses the line the X server writes on the displayfd pipe. The line is
/// the display number followed by a newline; fewer than two bytes means no
/// number arrived before the pipe closed.
fn parse_display(line: &[u8]) -> Result<String> {
    if line.len() < 2 {
        return Err(DmError::DisplayNumberMissing);
    }
    let number = String::from_utf8_lossy(&line[..line.len() - 1]);
    Ok(format!(":{}", number.trim()))
}

/// Runs a one-shot hook subprocess with a bounded lifetime and a minimal
/// environment. The command line is split on spaces, skipping empty
/// tokens. An empty command is a no-op.
fn run_hook(command_line: &str, environment: &[(&str, &str)], timeout: Duration) -> Result<()> {
    let mut tokens = command_line.split(' ').filter(|token| !token.is_empty());
    let program = match tokens.next() {
        Some(program) => program,
        None => return Ok(()),
    };

    let mut command = Command::new(program);
    command.args(tokens);
    command.env_clear();
    for (key, value) in environment {
        command.env(key, value);
    }

    let process = ProcessHandle::new(&mut command)
        .map_err(|error| DmError::SystemError(format!("Failed to run {}: {}", program, error)))?;
    if process.wait_timeout(timeout).is_none() {
        process.kill()?;
        return Err(DmError::HookTimeout(format!("{} exceeded its {:?} deadline", program, timeout)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::common::{
        GreeterSettings, HelperSettings, RuntimeSettings, SeatSettings, ThemeSettings,
        UsersSettings, X11Settings,
    };

    fn settings(enable_nesting: bool) -> Settings {
        Settings {
            logging: "debug".to_string(),
            runtime: RuntimeSettings {
                dir: "/tmp".to_string(),
            },
            x11: X11Settings {
                server_path: "/usr/bin/X".to_string(),
                server_arguments: "-nolisten  tcp".to_string(),
                xauth_path: "/usr/bin/xauth".to_string(),
                enable_nesting,
                seat_conf_dir: "/etc/seatdm/seats".to_string(),
                display_command: "/usr/share/seatdm/Xsetup".to_string(),
                display_stop_command: "/usr/share/seatdm/Xstop".to_string(),
            },
            theme: ThemeSettings {
                cursor_theme: "default".to_string(),
            },
            users: UsersSettings {
                service_user: "seatdm".to_string(),
                default_path: "/usr/bin:/bin".to_string(),
            },
            seat: SeatSettings {
                name: "seat0".to_string(),
                terminal_id: 2,
            },
            helper: HelperSettings {
                path: "/usr/libexec/seatdm-helper".to_string(),
            },
            greeter: GreeterSettings {
                user: "seatdm".to_string(),
                exec: "/usr/bin/seatdm-greeter".to_string(),
            },
        }
    }

    fn server(enable_nesting: bool, seat: Seat) -> XorgServer {
        let (events, _) = mpsc::channel();
        XorgServer::new(&settings(enable_nesting), seat, events)
    }

    #[test]
    fn args_for_primary_seat() {
        let server = server(false, Seat::new("seat0", 2));
        let (args, display) = server.assemble_args(5);

        assert_eq!(display, ":0");
        assert_eq!(
            args[..8],
            [
                "-nolisten", "tcp", "-background", "none", "-seat", "seat0", "-noreset",
                "-displayfd"
            ]
            .map(String::from)
        );
        assert_eq!(args[8], "5");
        assert_eq!(args[9], "vt2");
        assert_eq!(args[10], "-auth");
        assert_eq!(args[11], server.auth_path());
    }

    #[test]
    fn args_for_nested_secondary_seat() {
        let server = server(true, Seat::new("seat1", 2));
        let (args, display) = server.assemble_args(5);

        assert_eq!(display, ":2");
        assert!(args.contains(&":2".to_string()));
        assert!(args.contains(&"-config".to_string()));
        assert!(args.contains(&"/etc/seatdm/seats/seat1.conf".to_string()));
        assert!(args.contains(&"-layout".to_string()));
        assert!(args.contains(&"Nested".to_string()));
        assert!(args.contains(&"-sharevts".to_string()));
        assert!(!args.contains(&"-displayfd".to_string()));
        assert_eq!(args[args.len() - 2], "-auth");
    }

    #[test]
    fn nested_primary_seat_keeps_its_terminal() {
        let server = server(true, Seat::new("seat0", 2));
        let (args, display) = server.assemble_args(5);

        assert_eq!(display, ":1");
        assert!(args.contains(&"-keeptty".to_string()));
        assert!(!args.contains(&"-sharevts".to_string()));
    }

    #[test]
    fn display_number_parses_from_pipe_line() {
        assert_eq!(parse_display(b"7\n").unwrap(), ":7");
        assert_eq!(parse_display(b"12\n").unwrap(), ":12");
    }

    #[test]
    fn short_pipe_line_is_missing_display_number() {
        assert!(matches!(parse_display(b""), Err(DmError::DisplayNumberMissing)));
        assert!(matches!(parse_display(b"\n"), Err(DmError::DisplayNumberMissing)));
    }

    #[test]
    fn start_is_rejected_outside_idle() {
        let mut server = server(false, Seat::new("seat0", 2));
        *server.state.lock().unwrap() = DisplayState::Running;
        assert!(server.start().is_err());
        assert_eq!(server.state(), DisplayState::Running);
    }
}
