use std::collections::HashMap;

use crate::display::Seat;

/// What kind of session a descriptor launches. Greeter sessions run on
/// X11 but carry the greeter session class, which exempts them from login
/// accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    X11,
    Wayland,
    Tty,
    Greeter,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::X11 | SessionType::Greeter => "x11",
            SessionType::Wayland => "wayland",
            SessionType::Tty => "tty",
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            SessionType::Greeter => "greeter",
            _ => "user",
        }
    }
}

/// The `SessionDescriptor` struct carries everything the daemon knows
/// about one session to be launched: the executable, the target user, the
/// session kind and the environment contributions gathered so far.
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    exec: String,
    user: String,
    session_type: SessionType,
    environment: HashMap<String, String>,
}

impl SessionDescriptor {
    pub fn new(exec: &str, user: &str, session_type: SessionType) -> Self {
        SessionDescriptor {
            exec: exec.to_string(),
            user: user.to_string(),
            session_type,
            environment: HashMap::new(),
        }
    }

    pub fn exec(&self) -> &str {
        &self.exec
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn insert_env(&mut self, key: &str, value: &str) {
        self.environment.insert(key.to_string(), value.to_string());
    }

    /// Composes the environment handed to the helper once authentication
    /// succeeds. Greeter sessions read the daemon's own authority file;
    /// user sessions get their own written by the helper.
    ///
    /// # Arguments
    /// * `display` - The display name of the seat's X server.
    /// * `auth_path` - The daemon's authority file for that display.
    /// * `seat` - The seat the session is bound to.
    pub fn session_environment(&self, display: &str, auth_path: &str, seat: &Seat) -> HashMap<String, String> {
        let mut environment = self.environment.clone();
        environment.insert("DISPLAY".to_string(), display.to_string());
        environment.insert("XDG_SEAT".to_string(), seat.name().to_string());
        environment.insert("XDG_SESSION_TYPE".to_string(), self.session_type.as_str().to_string());
        environment.insert("XDG_SESSION_CLASS".to_string(), self.session_type.class().to_string());
        if self.session_type == SessionType::Greeter {
            environment.insert("XAUTHORITY".to_string(), auth_path.to_string());
        }
        if self.session_type.as_str() == "x11" && seat.is_primary() {
            environment.insert("XDG_VTNR".to_string(), seat.terminal_id().to_string());
        }
        environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeter_environment_marks_class_and_authority() {
        let descriptor = SessionDescriptor::new("/usr/bin/greeter", "seatdm", SessionType::Greeter);
        let environment = descriptor.session_environment(":7", "/run/seatdm/auth", &Seat::new("seat0", 2));

        assert_eq!(environment["DISPLAY"], ":7");
        assert_eq!(environment["XDG_SESSION_TYPE"], "x11");
        assert_eq!(environment["XDG_SESSION_CLASS"], "greeter");
        assert_eq!(environment["XAUTHORITY"], "/run/seatdm/auth");
        assert_eq!(environment["XDG_VTNR"], "2");
    }

    #[test]
    fn wayland_environment_has_no_preassigned_terminal() {
        let descriptor = SessionDescriptor::new("/usr/bin/sway", "alice", SessionType::Wayland);
        let environment = descriptor.session_environment(":0", "/run/seatdm/auth", &Seat::new("seat0", 2));

        assert_eq!(environment["XDG_SESSION_TYPE"], "wayland");
        assert_eq!(environment["XDG_SESSION_CLASS"], "user");
        assert!(!environment.contains_key("XDG_VTNR"));
        assert!(!environment.contains_key("XAUTHORITY"));
    }
}
