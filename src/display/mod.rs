pub use seat::Seat;
pub use server::{DisplayEvent, DisplayState, XorgServer};

mod seat;
mod server;
