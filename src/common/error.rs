use std::error::Error;
use std::result;
use std::fmt;

pub type Result<T> = result::Result<T, DmError>;

#[derive(Debug)]
pub enum DmError {
    /// The xauth tool could not be spawned or exited with a failure.
    AuthWriteFailed(String),
    /// The X server process could not be spawned.
    ServerSpawnFailed(String),
    /// The X server closed the displayfd pipe without reporting a number.
    DisplayNumberMissing,
    /// A hook subprocess outlived its deadline and was killed.
    HookTimeout(String),
    /// The peer sent a frame that breaks the opcode discipline.
    ProtocolViolation(String),
    AuthenticationError(String),
    SessionError(String),
    HelperError(String),
    SystemError(String),
    IoError(std::io::Error),
    ConfigError(config::ConfigError),
}

impl Error for DmError {}

impl fmt::Display for DmError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DmError::AuthWriteFailed(message) => write!(formatter, "AuthWriteFailed: {}", message),
            DmError::ServerSpawnFailed(message) => write!(formatter, "ServerSpawnFailed: {}", message),
            DmError::DisplayNumberMissing => write!(formatter, "DisplayNumberMissing: the X server did not report a display number"),
            DmError::HookTimeout(message) => write!(formatter, "HookTimeout: {}", message),
            DmError::ProtocolViolation(message) => write!(formatter, "ProtocolViolation: {}", message),
            DmError::AuthenticationError(message) => write!(formatter, "AuthenticationError: {}", message),
            DmError::SessionError(message) => write!(formatter, "SessionError: {}", message),
            DmError::HelperError(message) => write!(formatter, "HelperError: {}", message),
            DmError::SystemError(message) => write!(formatter, "SystemError: {}", message),
            DmError::IoError(err) => write!(formatter, "IoError: {}", err),
            DmError::ConfigError(err) => write!(formatter, "ConfigError: {}", err),
        }
    }
}

impl From<std::io::Error> for DmError {
    fn from(err: std::io::Error) -> Self {
        DmError::IoError(err)
    }
}

impl From<config::ConfigError> for DmError {
    fn from(err: config::ConfigError) -> Self {
        DmError::ConfigError(err)
    }
}

impl From<pam_client::Error> for DmError {
    fn from(err: pam_client::Error) -> Self {
        DmError::AuthenticationError(err.to_string())
    }
}

impl From<nix::Error> for DmError {
    fn from(err: nix::Error) -> Self {
        DmError::SystemError(err.to_string())
    }
}
