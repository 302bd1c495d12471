use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::auth::{authority, Account};
use crate::common::Result;
use crate::fs;
use crate::helper::backend::Backend;
use crate::helper::cli::HelperOptions;
use crate::helper::{accounting, vt, UserSession};
use crate::helper::{HELPER_AUTH_ERROR, HELPER_SESSION_ERROR, HELPER_SUCCESS};
use crate::ipc::message::Opcode;
use crate::ipc::stream::FramedStream;
use crate::ipc::wire::{Reader, Writer};

/// The `HelperApp` struct is the privileged side of one authentication
/// attempt. It drives the backend, speaks the framed protocol back to the
/// daemon, launches the session process and keeps the login accounting
/// straight. Its return value is the helper's exit code.
pub struct HelperApp {
    stream: Rc<RefCell<FramedStream>>,
    backend: Box<dyn Backend>,
    session: UserSession,
    id: i64,
    user: Option<String>,
    start: Option<String>,
    cookie: String,
    xauth_path: String,
}

impl HelperApp {
    /// Creates the helper application.
    ///
    /// # Arguments
    /// * `stream` - Connected channel to the daemon; shared with the
    ///   backend's conversation.
    /// * `backend` - The authentication backend to drive.
    /// * `options` - Parsed invocation parameters.
    /// * `xauth_path` - Path of the xauth tool for the user's authority file.
    pub fn new(
        stream: Rc<RefCell<FramedStream>>,
        backend: Box<dyn Backend>,
        options: &HelperOptions,
        xauth_path: &str,
    ) -> Self {
        HelperApp {
            stream,
            backend,
            session: UserSession::new(options.start.as_deref().unwrap_or_default()),
            id: options.id,
            user: options.user.clone(),
            start: options.start.clone(),
            cookie: String::new(),
            xauth_path: xauth_path.to_string(),
        }
    }

    /// Returns the display cookie received from the daemon.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Runs the attempt to completion.
    ///
    /// # Returns
    /// The helper's exit code: one of the error codes, or the session's
    /// own exit status once a session ran.
    pub fn run(&mut self) -> i32 {
        if let Err(error) = self.hello() {
            error!("Couldn't write initial message: {}", error);
        }

        if let Err(error) = self.backend.start(self.user.as_deref()) {
            warn!("Backend start failed: {}", error);
            self.fail_authentication();
            return HELPER_AUTH_ERROR;
        }

        let user = match self.backend.authenticate() {
            Ok(user) => user,
            Err(error) => {
                warn!("Authentication failed: {}", error);
                self.fail_authentication();
                return HELPER_AUTH_ERROR;
            }
        };
        self.user = Some(user.clone());

        let environment = match self.authenticated(&user) {
            Ok(environment) => environment,
            Err(error) => {
                warn!("{}", error);
                self.cookie.clear();
                HashMap::new()
            }
        };

        if self.start.is_none() {
            // Pure credential check; nothing to launch
            return HELPER_SUCCESS;
        }

        let mut merged = self.session.environment().clone();
        merged.extend(environment);

        // Wayland sessions get a terminal of their own
        if merged.get("XDG_SESSION_TYPE").map(String::as_str) == Some("wayland") {
            match vt::allocate() {
                Ok(number) => {
                    merged.insert("XDG_VTNR".to_string(), number.to_string());
                }
                Err(error) => warn!("Could not allocate a virtual terminal: {}", error),
            }
        }

        let account = match Account::from_name(&user) {
            Some(account) => account,
            None => {
                error!("Could not resolve an account for {}", user);
                self.session_opened(false);
                return HELPER_SESSION_ERROR;
            }
        };

        if !self.cookie.is_empty() && merged.get("XDG_SESSION_TYPE").map(String::as_str) == Some("x11") {
            if let Err(error) = self.write_user_authority(&account, &mut merged) {
                warn!("Failed to write the user's authority file: {}", error);
            }
        }

        let contributed = match self.backend.open_session(&merged) {
            Ok(contributed) => contributed,
            Err(error) => {
                error!("Failed to open session: {}", error);
                self.session_opened(false);
                return HELPER_SESSION_ERROR;
            }
        };
        merged.extend(contributed);
        self.session.set_environment(merged);

        if let Err(error) = self.session.spawn(&account) {
            error!("{}", error);
            if let Err(error) = self.backend.close_session() {
                warn!("Failed to close session: {}", error);
            }
            self.session_opened(false);
            return HELPER_SESSION_ERROR;
        }

        self.session_opened(true);

        let greeter_class = self.session.env("XDG_SESSION_CLASS") == "greeter";
        if !greeter_class {
            accounting::login(
                &self.session.env("XDG_VTNR"),
                &self.session.env("DISPLAY"),
                &user,
                self.session.cached_pid(),
                true,
            );
        }

        let status = self.session.wait().unwrap_or(1);

        if let Err(error) = self.backend.close_session() {
            warn!("Failed to close session: {}", error);
        }
        if !greeter_class {
            accounting::logout(
                &self.session.env("XDG_VTNR"),
                &self.session.env("DISPLAY"),
                self.session.cached_pid(),
            );
        }

        status
    }

    fn hello(&mut self) -> Result<()> {
        let mut writer = Writer::new();
        writer.put_i64(self.id);
        self.stream.borrow_mut().send(Opcode::Hello, writer)
    }

    /// The failed-authentication path: an empty AUTHENTICATED frame and a
    /// failed-login record with no session pid.
    fn fail_authentication(&mut self) {
        if let Err(error) = self.authenticated("") {
            warn!("{}", error);
        }
        let user = self.user.clone().unwrap_or_default();
        accounting::login(
            &self.session.env("XDG_VTNR"),
            &self.session.env("DISPLAY"),
            &user,
            0,
            false,
        );
    }

    /// Announces the authentication result. For a non-empty user the
    /// daemon replies with the session environment and the display cookie.
    fn authenticated(&mut self, user: &str) -> Result<HashMap<String, String>> {
        let mut writer = Writer::new();
        writer.put_str(user);

        let mut stream = self.stream.borrow_mut();
        stream.send(Opcode::Authenticated, writer)?;
        if user.is_empty() {
            return Ok(HashMap::new());
        }

        let payload = stream.expect(Opcode::Authenticated)?;
        let mut reader = Reader::new(&payload);
        let _user = reader.get_str()?;
        let environment = reader.get_env()?;
        self.cookie = reader.get_str()?;
        Ok(environment)
    }

    /// Reports whether the session opened; the daemon acknowledges with an
    /// empty frame.
    fn session_opened(&mut self, success: bool) {
        let mut writer = Writer::new();
        writer.put_bool(success);

        let mut stream = self.stream.borrow_mut();
        if let Err(error) = stream.send(Opcode::SessionStatus, writer) {
            warn!("Couldn't report session status: {}", error);
            return;
        }
        if let Err(error) = stream.expect(Opcode::SessionStatus) {
            warn!("{}", error);
        }
    }

    /// Materializes the user's own authority file with the display cookie
    /// and points XAUTHORITY at it.
    fn write_user_authority(&self, account: &Account, environment: &mut HashMap<String, String>) -> Result<()> {
        let path = format!("{}/.Xauthority", account.home());
        let display = environment.get("DISPLAY").cloned().unwrap_or_default();

        authority::add_cookie(&self.xauth_path, &path, &display, &self.cookie)?;
        fs::chmod(&path, 0o600)?;
        fs::chown(&path, account.uid(), account.gid())?;

        environment.insert("XAUTHORITY".to_string(), path);
        Ok(())
    }
}
