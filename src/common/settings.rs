use serde::Deserialize;
use std::fs;

use nix::unistd::Uid;

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeSettings {
    pub dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct X11Settings {
    pub server_path: String,
    pub server_arguments: String,
    pub xauth_path: String,
    pub enable_nesting: bool,
    pub seat_conf_dir: String,
    pub display_command: String,
    pub display_stop_command: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThemeSettings {
    pub cursor_theme: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UsersSettings {
    pub service_user: String,
    pub default_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeatSettings {
    pub name: String,
    pub terminal_id: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HelperSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GreeterSettings {
    pub user: String,
    pub exec: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: String,
    pub runtime: RuntimeSettings,
    pub x11: X11Settings,
    pub theme: ThemeSettings,
    pub users: UsersSettings,
    pub seat: SeatSettings,
    pub helper: HelperSettings,
    pub greeter: GreeterSettings,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings_raw = config::Config::builder()
            .add_source(config::File::new("config.yml", config::FileFormat::Yaml))
            .add_source(config::Environment::with_prefix("SEATDM").separator("_"))
            .build()?;

        settings_raw.try_deserialize()
    }

    /// Re-reads the on-disk configuration in place. The display setup hook
    /// is allowed to rewrite the config file, so the owner reloads after
    /// running it.
    pub fn reload(&mut self) -> Result<(), config::ConfigError> {
        *self = Settings::new()?;
        Ok(())
    }

    pub fn verify(&self) -> bool {
        // Check that settings are valid for running a display manager

        // The helper is setuid and login accounting needs the system
        // databases, so production usage requires root
        if !Uid::current().is_root() {
            error!("App has to be run as root");
            return false;
        }

        // Verify X server path is set
        if self.x11.server_path.is_empty() {
            error!("X server path is missing from settings");
            return false;
        }

        // Verify helper path is set
        if self.helper.path.is_empty() {
            error!("Helper path is missing from settings");
            return false;
        }

        // Verify runtime directory
        if let Err(error) = fs::create_dir_all(&self.runtime.dir) {
            error!("Cannot create runtime directory at {}: {}", self.runtime.dir, error);
            return false;
        }

        true
    }
}
