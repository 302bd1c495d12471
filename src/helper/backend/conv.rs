use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::rc::Rc;

use pam_client::{ConversationHandler, ErrorCode};

use crate::ipc::message::{Opcode, Prompt, Request, ERROR_AUTHENTICATION, INFO_MESSAGE, PROMPT_LOGIN_USER};
use crate::ipc::stream::FramedStream;
use crate::ipc::wire::{Reader, Writer};

/// PAM conversation that relays prompts across the privilege boundary:
/// each prompt travels to the daemon as a REQUEST frame and the reply's
/// response field is handed back to PAM.
pub struct IpcConversation {
    stream: Rc<RefCell<FramedStream>>,
}

impl IpcConversation {
    pub fn new(stream: Rc<RefCell<FramedStream>>) -> Self {
        IpcConversation { stream }
    }

    fn round_trip(&mut self, prompt: Prompt) -> Result<String, ErrorCode> {
        let request = Request { prompts: vec![prompt] };
        let mut writer = Writer::new();
        request.encode(&mut writer);

        let mut stream = self.stream.borrow_mut();
        stream.send(Opcode::Request, writer).map_err(|_| ErrorCode::CONV_ERR)?;

        // A mismatched reply degrades to the default request: no prompts,
        // no responses, and authentication runs aground on its own
        let reply = match stream.expect(Opcode::Request) {
            Ok(payload) => Request::decode(&mut Reader::new(&payload)).unwrap_or_default(),
            Err(_) => Request::default(),
        };
        reply
            .prompts
            .into_iter()
            .next()
            .map(|prompt| prompt.response)
            .ok_or(ErrorCode::CONV_ERR)
    }

    fn relay_text(&mut self, opcode: Opcode, message: &str, kind: i32) {
        let mut writer = Writer::new();
        writer.put_str(message);
        writer.put_i32(kind);
        if let Err(error) = self.stream.borrow_mut().send(opcode, writer) {
            warn!("Failed to relay message to the daemon: {}", error);
        }
    }
}

impl ConversationHandler for IpcConversation {
    fn prompt_echo_on(&mut self, msg: &CStr) -> Result<CString, ErrorCode> {
        let prompt = Prompt {
            kind: PROMPT_LOGIN_USER,
            message: msg.to_string_lossy().into_owned(),
            response: String::new(),
            hidden: false,
        };
        let response = self.round_trip(prompt)?;
        CString::new(response).map_err(|_| ErrorCode::CONV_ERR)
    }

    fn prompt_echo_off(&mut self, msg: &CStr) -> Result<CString, ErrorCode> {
        let response = self.round_trip(Prompt::secret(&msg.to_string_lossy()))?;
        CString::new(response).map_err(|_| ErrorCode::CONV_ERR)
    }

    fn text_info(&mut self, msg: &CStr) {
        self.relay_text(Opcode::Info, &msg.to_string_lossy(), INFO_MESSAGE);
    }

    fn error_msg(&mut self, msg: &CStr) {
        self.relay_text(Opcode::Error, &msg.to_string_lossy(), ERROR_AUTHENTICATION);
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;

    fn conversation_pair() -> (IpcConversation, FramedStream) {
        let (helper_side, daemon_side) = UnixStream::pair().unwrap();
        let stream = Rc::new(RefCell::new(FramedStream::new(helper_side)));
        (IpcConversation::new(stream), FramedStream::new(daemon_side))
    }

    #[test]
    fn secret_prompt_round_trips_through_the_daemon() {
        let (mut conversation, mut daemon) = conversation_pair();

        let answering = thread::spawn(move || {
            let payload = daemon.expect(Opcode::Request).unwrap();
            let mut request = Request::decode(&mut Reader::new(&payload)).unwrap();
            assert!(request.prompts[0].hidden);
            request.prompts[0].response = "hunter2".to_string();

            let mut writer = Writer::new();
            request.encode(&mut writer);
            daemon.send(Opcode::Request, writer).unwrap();
        });

        let response = conversation
            .prompt_echo_off(&CString::new("Password:").unwrap())
            .unwrap();
        assert_eq!(response.as_bytes(), b"hunter2");
        answering.join().unwrap();
    }

    #[test]
    fn mismatched_reply_fails_the_conversation() {
        let (mut conversation, mut daemon) = conversation_pair();

        let answering = thread::spawn(move || {
            daemon.expect(Opcode::Request).unwrap();
            // Reply with the wrong opcode
            let mut writer = Writer::new();
            writer.put_str("not a request");
            writer.put_i32(INFO_MESSAGE);
            daemon.send(Opcode::Info, writer).unwrap();
        });

        let result = conversation.prompt_echo_off(&CString::new("Password:").unwrap());
        assert!(result.is_err());
        answering.join().unwrap();
    }
}
