use crate::common::{DmError, Result};
use crate::ipc::wire::{Reader, Writer};

/// Opcode tag carried by every frame; the closed set both peers speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Hello = 1,
    Info = 2,
    Error = 3,
    Request = 4,
    Authenticated = 5,
    SessionStatus = 6,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Option<Opcode> {
        match value {
            1 => Some(Opcode::Hello),
            2 => Some(Opcode::Info),
            3 => Some(Opcode::Error),
            4 => Some(Opcode::Request),
            5 => Some(Opcode::Authenticated),
            6 => Some(Opcode::SessionStatus),
            _ => None,
        }
    }
}

pub const PROMPT_UNKNOWN: i32 = 0;
pub const PROMPT_LOGIN_USER: i32 = 1;
pub const PROMPT_LOGIN_PASSWORD: i32 = 2;
pub const PROMPT_CHANGE_PASSWORD: i32 = 3;

pub const INFO_MESSAGE: i32 = 1;
pub const ERROR_AUTHENTICATION: i32 = 1;
pub const ERROR_INTERNAL: i32 = 2;

/// One prompt directed at the greeter and, on the way back, its response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub kind: i32,
    pub message: String,
    pub response: String,
    pub hidden: bool,
}

impl Prompt {
    /// A hidden prompt asking for a secret.
    pub fn secret(message: &str) -> Self {
        Prompt {
            kind: PROMPT_LOGIN_PASSWORD,
            message: message.to_string(),
            response: String::new(),
            hidden: true,
        }
    }

    fn encode(&self, writer: &mut Writer) {
        writer.put_i32(self.kind);
        writer.put_str(&self.message);
        writer.put_str(&self.response);
        writer.put_bool(self.hidden);
    }

    fn decode(reader: &mut Reader) -> Result<Prompt> {
        Ok(Prompt {
            kind: reader.get_i32()?,
            message: reader.get_str()?,
            response: reader.get_str()?,
            hidden: reader.get_bool()?,
        })
    }
}

/// A REQUEST payload: the prompt list the backend needs answered before
/// authentication can proceed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub prompts: Vec<Prompt>,
}

impl Request {
    pub fn encode(&self, writer: &mut Writer) {
        writer.put_u32(self.prompts.len() as u32);
        for prompt in &self.prompts {
            prompt.encode(writer);
        }
    }

    pub fn decode(reader: &mut Reader) -> Result<Request> {
        let count = reader.get_u32()? as usize;
        if count > 64 {
            return Err(DmError::ProtocolViolation(format!("request carries {} prompts", count)));
        }
        let mut prompts = Vec::with_capacity(count);
        for _ in 0..count {
            prompts.push(Prompt::decode(reader)?);
        }
        Ok(Request { prompts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let request = Request {
            prompts: vec![
                Prompt::secret("Password:"),
                Prompt {
                    kind: PROMPT_LOGIN_USER,
                    message: "login:".to_string(),
                    response: "alice".to_string(),
                    hidden: false,
                },
            ],
        };

        let mut writer = Writer::new();
        request.encode(&mut writer);
        let bytes = writer.into_bytes();

        let decoded = Request::decode(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(Opcode::from_u32(6), Some(Opcode::SessionStatus));
        assert_eq!(Opcode::from_u32(7), None);
        assert_eq!(Opcode::from_u32(0), None);
    }
}
