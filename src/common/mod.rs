pub use error::{DmError, Result};
pub use process_handle::ProcessHandle;
pub use settings::{
    GreeterSettings, HelperSettings, RuntimeSettings, SeatSettings, Settings, ThemeSettings,
    UsersSettings, X11Settings,
};

mod error;
mod process_handle;
mod settings;
