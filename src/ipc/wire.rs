use std::collections::HashMap;

use crate::common::{DmError, Result};

/// Upper bound on a single frame. Nothing in the protocol comes close;
/// the bound keeps a hostile peer from ballooning memory.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Append-only payload builder. Integers are big-endian and fixed width,
/// strings are length-prefixed UTF-8, maps are count-prefixed key/value
/// string pairs and booleans are a single byte.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn put_env(&mut self, environment: &HashMap<String, String>) {
        self.put_u32(environment.len() as u32);
        for (key, value) in environment {
            self.put_str(key);
            self.put_str(value);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received payload. Every accessor fails with a
/// `ProtocolViolation` when the payload runs out early.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.pos + count > self.data.len() {
            return Err(DmError::ProtocolViolation("frame payload ended early".to_string()));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn get_str(&mut self) -> Result<String> {
        let length = self.get_u32()? as usize;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DmError::ProtocolViolation("string field is not valid UTF-8".to_string()))
    }

    pub fn get_env(&mut self) -> Result<HashMap<String, String>> {
        let count = self.get_u32()? as usize;
        let mut environment = HashMap::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.get_str()?;
            let value = self.get_str()?;
            environment.insert(key, value);
        }
        Ok(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let mut environment = HashMap::new();
        environment.insert("XDG_SESSION_TYPE".to_string(), "wayland".to_string());
        environment.insert("LANG".to_string(), "C".to_string());

        let mut writer = Writer::new();
        writer.put_i64(42);
        writer.put_str("seat0");
        writer.put_bool(true);
        writer.put_env(&environment);
        writer.put_i32(-7);
        let bytes = writer.into_bytes();

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.get_i64().unwrap(), 42);
        assert_eq!(reader.get_str().unwrap(), "seat0");
        assert!(reader.get_bool().unwrap());
        assert_eq!(reader.get_env().unwrap(), environment);
        assert_eq!(reader.get_i32().unwrap(), -7);
    }

    #[test]
    fn truncated_payload_is_a_violation() {
        let mut writer = Writer::new();
        writer.put_u32(100);
        let bytes = writer.into_bytes();

        let mut reader = Reader::new(&bytes);
        // A string claiming 100 bytes in a 4-byte payload
        assert!(matches!(reader.get_str(), Err(DmError::ProtocolViolation(_))));
    }
}
