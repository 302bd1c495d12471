use std::ffi::OsString;

use structopt::StructOpt;

/// Invocation parameters of the privileged helper. These are not meant to
/// be typed by hand; the daemon assembles them when it spawns the helper.
#[derive(StructOpt, Debug)]
#[structopt(name = "seatdm-helper")]
pub struct HelperOptions {
    /// Rendezvous socket the daemon listens on
    #[structopt(long)]
    pub socket: String,

    /// Correlation id binding this connection to the spawning daemon
    #[structopt(long)]
    pub id: i64,

    /// User to authenticate
    #[structopt(long)]
    pub user: Option<String>,

    /// Session executable to launch after successful authentication
    #[structopt(long)]
    pub start: Option<String>,

    /// Skip interactive authentication
    #[structopt(long)]
    pub autologin: bool,

    /// The launched session is a greeter
    #[structopt(long)]
    pub greeter: bool,
}

impl HelperOptions {
    /// Parses argv without exiting on failure; the caller owns the exit
    /// code for a bad invocation.
    pub fn parse<I>(args: I) -> Result<Self, structopt::clap::Error>
    where
        I: IntoIterator,
        I::Item: Into<OsString> + Clone,
    {
        Self::from_iter_safe(args)
    }

    /// The socket and a positive id are mandatory.
    pub fn is_valid(&self) -> bool {
        !self.socket.is_empty() && self.id > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("seatdm-helper")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn full_invocation_parses() {
        let options = HelperOptions::parse(argv(&[
            "--socket", "/run/seatdm/helper-1", "--id", "41", "--user", "alice", "--start",
            "/usr/bin/startplasma-x11", "--greeter",
        ]))
        .unwrap();

        assert!(options.is_valid());
        assert_eq!(options.socket, "/run/seatdm/helper-1");
        assert_eq!(options.id, 41);
        assert_eq!(options.user.as_deref(), Some("alice"));
        assert_eq!(options.start.as_deref(), Some("/usr/bin/startplasma-x11"));
        assert!(options.greeter);
        assert!(!options.autologin);
    }

    #[test]
    fn missing_flag_value_fails_to_parse() {
        assert!(HelperOptions::parse(argv(&["--socket"])).is_err());
        assert!(HelperOptions::parse(argv(&["--socket", "/run/s", "--id"])).is_err());
    }

    #[test]
    fn missing_required_parameters_fail_to_parse() {
        assert!(HelperOptions::parse(argv(&["--id", "41"])).is_err());
        assert!(HelperOptions::parse(argv(&["--socket", "/run/s"])).is_err());
    }

    #[test]
    fn non_positive_id_is_invalid() {
        let options = HelperOptions::parse(argv(&["--socket", "/run/s", "--id", "0"])).unwrap();
        assert!(!options.is_valid());
    }
}
