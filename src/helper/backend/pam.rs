use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use pam_client::{Context, Flag, SessionToken};

use super::conv::IpcConversation;
use super::Backend;
use crate::common::{DmError, Result};
use crate::ipc::stream::FramedStream;

/// PAM service names, one per entry path.
const SERVICE_LOGIN: &str = "seatdm";
const SERVICE_GREETER: &str = "seatdm-greeter";
const SERVICE_AUTOLOGIN: &str = "seatdm-autologin";

/// The `PamBackend` struct drives a PAM transaction for one attempt. The
/// conversation handler relays prompts to the daemon over the IPC channel,
/// so the policy decides what is asked and the greeter decides how.
pub struct PamBackend {
    stream: Rc<RefCell<FramedStream>>,
    autologin: bool,
    greeter: bool,
    context: Option<Context<IpcConversation>>,
    session: Option<SessionToken>,
}

impl PamBackend {
    /// Creates a backend bound to the helper's IPC stream.
    ///
    /// # Arguments
    /// * `stream` - The channel conversation prompts travel over.
    /// * `autologin` - Use the autologin service, which asks nothing.
    /// * `greeter` - Use the greeter service.
    pub fn new(stream: Rc<RefCell<FramedStream>>, autologin: bool, greeter: bool) -> Self {
        PamBackend {
            stream,
            autologin,
            greeter,
            context: None,
            session: None,
        }
    }

    fn service(&self) -> &'static str {
        if self.autologin {
            SERVICE_AUTOLOGIN
        } else if self.greeter {
            SERVICE_GREETER
        } else {
            SERVICE_LOGIN
        }
    }
}

impl Backend for PamBackend {
    fn start(&mut self, user: Option<&str>) -> Result<()> {
        debug!("Starting PAM transaction for service {}", self.service());
        let conversation = IpcConversation::new(Rc::clone(&self.stream));
        let context = Context::new(self.service(), user, conversation)?;
        self.context = Some(context);
        Ok(())
    }

    fn authenticate(&mut self) -> Result<String> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| DmError::AuthenticationError("Backend was not started".to_string()))?;

        context.authenticate(Flag::NONE)?;
        context.acct_mgmt(Flag::NONE)?;

        // PAM may have mapped the login name to another account
        let user = context.user()?;
        Ok(user.to_string())
    }

    fn open_session(&mut self, environment: &HashMap<String, String>) -> Result<HashMap<String, String>> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| DmError::SessionError("Backend was not started".to_string()))?;

        // The variables have to reach PAM before open_session so the
        // session modules observe them
        for (key, value) in environment {
            context
                .putenv(&format!("{}={}", key, value))
                .map_err(|error| DmError::SessionError(error.to_string()))?;
        }

        let session = context
            .open_session(Flag::NONE)
            .map_err(|error| DmError::SessionError(error.to_string()))?;

        let mut contributed = HashMap::new();
        for item in &session.envlist() {
            let (key, value) = item.key_value();
            contributed.insert(
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            );
        }

        // Keep the session open past this scope; it is closed explicitly
        // after the session process exits
        self.session = Some(session.leak());
        Ok(contributed)
    }

    fn close_session(&mut self) -> Result<()> {
        if let (Some(context), Some(token)) = (self.context.as_mut(), self.session.take()) {
            debug!("Closing PAM session");
            drop(context.unleak_session(token));
        }
        self.context = None;
        Ok(())
    }
}
