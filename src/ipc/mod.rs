pub use message::{Opcode, Prompt, Request};
pub use stream::FramedStream;

pub mod message;
pub mod stream;
pub mod wire;
