use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use crate::common::{DmError, Result};
use crate::ipc::message::Opcode;
use crate::ipc::wire::{Writer, MAX_FRAME_SIZE};

/// Length-prefixed, opcode-tagged frame transport over a local stream
/// socket. A frame is never surfaced partially: reads block until the
/// length prefix is satisfied.
pub struct FramedStream {
    stream: UnixStream,
}

impl FramedStream {
    pub fn new(stream: UnixStream) -> Self {
        FramedStream { stream }
    }

    /// Connects to the daemon's rendezvous socket.
    pub fn connect(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .map_err(|error| DmError::HelperError(format!("Could not connect to {}: {}", path, error)))?;
        Ok(FramedStream::new(stream))
    }

    /// Sends one frame: `u32` length, `u32` opcode, payload.
    pub fn send(&mut self, opcode: Opcode, payload: Writer) -> Result<()> {
        let body = payload.into_bytes();
        let length = body.len() + 4;
        if length > MAX_FRAME_SIZE {
            return Err(DmError::ProtocolViolation(format!("refusing to send a frame of {} bytes", length)));
        }

        let mut frame = Vec::with_capacity(length + 4);
        frame.extend_from_slice(&(length as u32).to_be_bytes());
        frame.extend_from_slice(&(opcode as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        self.stream.write_all(&frame)?;
        Ok(())
    }

    /// Blocks for the next whole frame.
    ///
    /// # Returns
    /// The frame's opcode and its payload bytes.
    pub fn recv(&mut self) -> Result<(Opcode, Vec<u8>)> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header)?;
        let length = u32::from_be_bytes(header) as usize;
        if length < 4 {
            return Err(DmError::ProtocolViolation("frame is shorter than its opcode".to_string()));
        }
        if length > MAX_FRAME_SIZE {
            return Err(DmError::ProtocolViolation(format!("frame of {} bytes exceeds the limit", length)));
        }

        let mut body = vec![0u8; length];
        self.stream.read_exact(&mut body)?;

        let raw = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let opcode = Opcode::from_u32(raw)
            .ok_or_else(|| DmError::ProtocolViolation(format!("unknown opcode {}", raw)))?;
        Ok((opcode, body.split_off(4)))
    }

    /// Receives a frame that must carry the `want` opcode. A mismatch is a
    /// protocol violation; the caller is expected to fall back to a
    /// default payload and fail the exchange.
    pub fn expect(&mut self, want: Opcode) -> Result<Vec<u8>> {
        let (opcode, payload) = self.recv()?;
        if opcode != want {
            error!("Received a wrong opcode instead of {:?}: {:?}", want, opcode);
            return Err(DmError::ProtocolViolation(format!("expected {:?}, received {:?}", want, opcode)));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::wire::Reader;

    fn pair() -> (FramedStream, FramedStream) {
        let (left, right) = UnixStream::pair().unwrap();
        (FramedStream::new(left), FramedStream::new(right))
    }

    #[test]
    fn frames_round_trip() {
        let (mut sender, mut receiver) = pair();

        let mut writer = Writer::new();
        writer.put_i64(99);
        writer.put_str("hello");
        sender.send(Opcode::Hello, writer).unwrap();

        let (opcode, payload) = receiver.recv().unwrap();
        assert_eq!(opcode, Opcode::Hello);
        let mut reader = Reader::new(&payload);
        assert_eq!(reader.get_i64().unwrap(), 99);
        assert_eq!(reader.get_str().unwrap(), "hello");
    }

    #[test]
    fn mismatched_opcode_is_a_violation() {
        let (mut sender, mut receiver) = pair();

        sender.send(Opcode::Info, Writer::new()).unwrap();
        assert!(matches!(
            receiver.expect(Opcode::Request),
            Err(DmError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn oversized_frame_is_refused() {
        let (mut sender, mut receiver) = pair();

        // A hand-written header claiming more than the frame bound
        let length = (MAX_FRAME_SIZE + 5) as u32;
        sender.stream.write_all(&length.to_be_bytes()).unwrap();
        sender.stream.write_all(&(Opcode::Info as u32).to_be_bytes()).unwrap();

        assert!(matches!(receiver.recv(), Err(DmError::ProtocolViolation(_))));
    }

    #[test]
    fn split_writes_still_deliver_whole_frames() {
        let (mut sender, mut receiver) = pair();

        let mut writer = Writer::new();
        writer.put_str("split");
        let body = writer.into_bytes();
        let length = (body.len() + 4) as u32;

        // Dribble the frame across several writes
        sender.stream.write_all(&length.to_be_bytes()).unwrap();
        sender.stream.write_all(&(Opcode::Info as u32).to_be_bytes()).unwrap();
        for byte in body {
            sender.stream.write_all(&[byte]).unwrap();
        }

        let (opcode, payload) = receiver.recv().unwrap();
        assert_eq!(opcode, Opcode::Info);
        assert_eq!(Reader::new(&payload).get_str().unwrap(), "split");
    }
}
