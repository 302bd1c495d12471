use crate::ipc::message::Request;

/// Daemon-side seam to whatever user interface answers authentication
/// prompts. The graphical greeter implements this elsewhere; the core only
/// relies on the contract.
pub trait Greeter {
    /// Fills the responses of the forwarded prompts and hands them back.
    fn request(&mut self, request: Request) -> Request;

    /// Surfaces an informational message from the helper.
    fn info(&mut self, message: &str, kind: i32);

    /// Surfaces an error message from the helper.
    fn error(&mut self, message: &str, kind: i32);
}

/// Answers prompts from held credentials without user interaction. Serves
/// autologin and greeter bring-up, where the PAM stack asks nothing or the
/// answers are fixed.
pub struct StaticGreeter {
    user: String,
    secret: String,
}

impl StaticGreeter {
    pub fn new(user: &str, secret: &str) -> Self {
        StaticGreeter {
            user: user.to_string(),
            secret: secret.to_string(),
        }
    }
}

impl Greeter for StaticGreeter {
    fn request(&mut self, mut request: Request) -> Request {
        for prompt in &mut request.prompts {
            prompt.response = if prompt.hidden {
                self.secret.clone()
            } else {
                self.user.clone()
            };
        }
        request
    }

    fn info(&mut self, message: &str, _kind: i32) {
        info!("{}", message);
    }

    fn error(&mut self, message: &str, _kind: i32) {
        error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::message::Prompt;

    #[test]
    fn static_greeter_answers_from_held_credentials() {
        let mut greeter = StaticGreeter::new("alice", "hunter2");
        let request = Request {
            prompts: vec![
                Prompt::secret("Password:"),
                Prompt {
                    hidden: false,
                    ..Prompt::default()
                },
            ],
        };

        let answered = greeter.request(request);
        assert_eq!(answered.prompts[0].response, "hunter2");
        assert_eq!(answered.prompts[1].response, "alice");
    }
}
