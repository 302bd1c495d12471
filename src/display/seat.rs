/// The `Seat` struct names a logical set of input/output devices bound to
/// one user session; `seat0` denotes the local console.
#[derive(Debug, Clone)]
pub struct Seat {
    name: String,
    terminal_id: u32,
}

impl Seat {
    pub fn new(name: &str, terminal_id: u32) -> Self {
        Seat {
            name: name.to_string(),
            terminal_id,
        }
    }

    /// Returns the seat name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the virtual terminal the seat's display server binds to.
    pub fn terminal_id(&self) -> u32 {
        self.terminal_id
    }

    /// The primary seat keeps the controlling terminal; all other seats
    /// share virtual terminals.
    pub fn is_primary(&self) -> bool {
        self.name == "seat0"
    }

    /// Numeric index parsed from a `seatN` name. Feeds the nested display
    /// name, which is `:N+1`.
    pub fn index(&self) -> u32 {
        self.name
            .strip_prefix("seat")
            .and_then(|suffix| suffix.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat0_is_primary() {
        assert!(Seat::new("seat0", 1).is_primary());
        assert!(!Seat::new("seat1", 1).is_primary());
    }

    #[test]
    fn index_follows_seat_name() {
        assert_eq!(Seat::new("seat0", 1).index(), 0);
        assert_eq!(Seat::new("seat7", 1).index(), 7);
        assert_eq!(Seat::new("console", 1).index(), 0);
    }
}
