pub use descriptor::{SessionDescriptor, SessionType};
pub use greeter::{Greeter, StaticGreeter};
pub use launcher::{SessionLauncher, SessionOutcome};

mod descriptor;
mod greeter;
mod launcher;
