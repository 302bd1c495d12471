#[macro_use]
extern crate log;

use std::cell::RefCell;
use std::env;
use std::process;
use std::rc::Rc;

use seatdm::common::Settings;
use seatdm::helper::backend::PamBackend;
use seatdm::helper::{HelperApp, HelperOptions, HELPER_OTHER_ERROR};
use seatdm::ipc::FramedStream;

fn main() {
    if let Err(error) = setup_logging() {
        eprintln!("Failed to initialize logging: {}", error);
    }

    let options = match HelperOptions::parse(env::args()) {
        Ok(options) if options.is_valid() => options,
        _ => {
            error!("This application is not supposed to be executed manually");
            process::exit(HELPER_OTHER_ERROR);
        }
    };

    // Follow the daemon's configured xauth tool when the configuration is
    // readable from here; the PATH lookup covers the rest
    let xauth_path = Settings::new()
        .map(|settings| settings.x11.xauth_path)
        .unwrap_or_else(|_| "xauth".to_string());

    let stream = match FramedStream::connect(&options.socket) {
        Ok(stream) => Rc::new(RefCell::new(stream)),
        Err(error) => {
            error!("Could not reach the daemon: {}", error);
            process::exit(HELPER_OTHER_ERROR);
        }
    };

    let backend = Box::new(PamBackend::new(Rc::clone(&stream), options.autologin, options.greeter));
    let mut app = HelperApp::new(stream, backend, &options, &xauth_path);
    process::exit(app.run());
}

/// Sets up logging for the helper. Output goes to stderr so the daemon's
/// own stream stays clean.
fn setup_logging() -> Result<(), fern::InitError> {
    let base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("{}  [{}] {}", &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(), record.level(), &message.to_string()))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr());

    base_config.apply()?;
    Ok(())
}
