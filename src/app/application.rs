use std::sync::mpsc;
use std::time::Duration;

use crate::common::{DmError, Result, Settings};
use crate::display::{DisplayEvent, Seat, XorgServer};
use crate::session::{Greeter, SessionDescriptor, SessionLauncher, SessionOutcome, SessionType, StaticGreeter};

/// The `Application` struct wires the daemon together for one seat: it
/// supervises the seat's X server and keeps a greeter session running on
/// it until shutdown is requested.
pub struct Application {}

impl Application {
    pub fn new() -> Self {
        Self {}
    }

    /// Runs the daemon: starts the display server, prepares the display,
    /// launches the greeter and tears everything down on shutdown.
    ///
    /// # Arguments
    /// * `settings` - Mutable reference to the application settings; the
    ///   display setup hook may rewrite them on disk.
    ///
    /// # Returns
    /// A `Result` indicating success or failure of the run.
    pub fn run(&self, settings: &mut Settings) -> Result<()> {
        info!("Starting seatdm...");

        let seat = Seat::new(&settings.seat.name, settings.seat.terminal_id);
        let (events_sender, events) = mpsc::channel();
        let mut server = XorgServer::new(settings, seat.clone(), events_sender);

        // Create CTRL-C shutdown channel
        let (shutdown_sender, shutdown) = mpsc::channel();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            shutdown_sender.send(()).ok();
        })
        .map_err(|error| DmError::SystemError(format!("Error setting Ctrl-C handler: {}", error)))?;

        server.start()?;
        match events.recv() {
            Ok(DisplayEvent::Started) => info!("Display {} is ready", server.display()),
            other => {
                return Err(DmError::SystemError(format!("Display server failed to report startup: {:?}", other)));
            }
        }

        if let Err(error) = server.setup_display() {
            warn!("Display setup failed: {}", error);
        }
        // The setup hook may have rewritten the configuration file
        if let Err(error) = settings.reload() {
            warn!("Could not reload configuration: {}", error);
        }

        info!("seatdm running");
        loop {
            let outcome = self.run_greeter(settings, &server, &seat);
            if shutdown.try_recv().is_ok() {
                break;
            }
            match outcome {
                Ok(SessionOutcome::Success) => continue,
                Ok(outcome) => {
                    warn!("Greeter session ended with {:?}, shutting down", outcome);
                    break;
                }
                Err(error) => {
                    error!("Greeter session failed: {}", error);
                    break;
                }
            }
        }

        server.stop()?;
        match events.recv_timeout(Duration::from_secs(10)) {
            Ok(DisplayEvent::Stopped) => info!("Display server torn down"),
            _ => warn!("Display server did not confirm its teardown"),
        }

        info!("seatdm terminated");
        Ok(())
    }

    /// Launches one greeter session attempt through the helper and waits
    /// for it to finish.
    fn run_greeter(&self, settings: &Settings, server: &XorgServer, seat: &Seat) -> Result<SessionOutcome> {
        let descriptor = SessionDescriptor::new(&settings.greeter.exec, &settings.greeter.user, SessionType::Greeter);
        let mut greeter: Box<dyn Greeter> = Box::new(StaticGreeter::new(&settings.greeter.user, ""));
        let mut launcher = SessionLauncher::new(settings, server.display(), server.cookie());
        launcher.run(&descriptor, server.auth_path(), seat, greeter.as_mut(), false, true)
    }
}
