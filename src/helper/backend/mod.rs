pub use pam::PamBackend;

mod conv;
mod pam;

use std::collections::HashMap;

use crate::common::Result;

/// The pluggable authentication engine the helper drives. One instance
/// serves exactly one attempt: start, authenticate, open and close, in
/// that order.
pub trait Backend {
    /// Prepares the backend for the given user. `None` leaves it to the
    /// conversation to ask for one.
    fn start(&mut self, user: Option<&str>) -> Result<()>;

    /// Runs the conversation to completion.
    ///
    /// # Returns
    /// The resolved user name, which may differ from the requested one.
    fn authenticate(&mut self) -> Result<String>;

    /// Opens the login session. `environment` is the merged environment
    /// the session process will see; the backend may consult it.
    ///
    /// # Returns
    /// The backend-contributed environment variables.
    fn open_session(&mut self, environment: &HashMap<String, String>) -> Result<HashMap<String, String>>;

    /// Tears the login session down once the session process has exited.
    fn close_session(&mut self) -> Result<()>;
}
