#[macro_use]
extern crate log;

use seatdm::app::Application;
use seatdm::common::Settings;

use dotenv::dotenv;
use std::process;

fn main() {
    dotenv().ok();

    let mut settings = match Settings::new() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("Failed to load settings: {}", error);
            process::exit(1);
        }
    };

    if let Err(error) = setup_logging(&settings.logging) {
        eprintln!("Failed to initialize logging: {}", error);
        process::exit(1);
    }

    if !settings.verify() {
        process::exit(1);
    }

    if let Err(error) = Application::new().run(&mut settings) {
        error!("{}", error);
        process::exit(1);
    }
}

/// Sets up logging for the daemon.
///
/// # Arguments
/// * `level` - The configured logging level name.
///
/// # Returns
/// * `Result<(), fern::InitError>` - Ok if logging is set up successfully, Err otherwise.
fn setup_logging(level: &str) -> Result<(), fern::InitError> {
    let logging_level = level.parse().unwrap_or(log::LevelFilter::Info);

    let base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!("{}  [{}] {}", &chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(), record.level(), &message.to_string()))
        })
        .level(logging_level)
        .chain(std::io::stdout());

    base_config.apply()?;
    Ok(())
}
