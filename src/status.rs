// src/status.rs - Persisted door status model
use serde::{Serialize, Serializer};
use std::fmt;

/// The one status line kept in the journal.
///
/// `Opening`/`Closing` carry the number of feedback pulses still needed to
/// reach the end state. Anything the journal holds that is not one of the
/// known tokens is kept verbatim in `Unrecognized` so it can be reported,
/// but the controller never drives the motor from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Closed,
    Open,
    Opening(u32),
    Closing(u32),
    FailedOpening,
    FailedClosing,
    Unrecognized(String),
}

/// Direction of travel between the two end states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    Opening,
    Closing,
}

impl Travel {
    /// The word used as prefix for in-progress statuses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Travel::Opening => "opening",
            Travel::Closing => "closing",
        }
    }

    pub fn in_progress(&self, remaining: u32) -> Status {
        match self {
            Travel::Opening => Status::Opening(remaining),
            Travel::Closing => Status::Closing(remaining),
        }
    }

    /// End state required before this travel may start.
    pub fn start_state(&self) -> Status {
        match self {
            Travel::Opening => Status::Closed,
            Travel::Closing => Status::Open,
        }
    }

    pub fn done_state(&self) -> Status {
        match self {
            Travel::Opening => Status::Open,
            Travel::Closing => Status::Closed,
        }
    }

    pub fn failed_state(&self) -> Status {
        match self {
            Travel::Opening => Status::FailedOpening,
            Travel::Closing => Status::FailedClosing,
        }
    }
}

impl Status {
    /// Parse one journal line. Never fails: unknown content becomes
    /// `Unrecognized` with the trimmed text.
    pub fn parse(line: &str) -> Status {
        let line = line.trim();
        match line {
            "closed" => return Status::Closed,
            "open" => return Status::Open,
            "failed opening" => return Status::FailedOpening,
            "failed closing" => return Status::FailedClosing,
            _ => {}
        }

        let mut words = line.split_whitespace();
        let travel = match words.next() {
            Some("opening") => Travel::Opening,
            Some("closing") => Travel::Closing,
            _ => return Status::Unrecognized(line.to_string()),
        };
        match (words.next().map(str::parse::<u32>), words.next()) {
            (Some(Ok(remaining)), None) => travel.in_progress(remaining),
            _ => Status::Unrecognized(line.to_string()),
        }
    }

    /// True for `open` and `closed`.
    pub fn is_end_state(&self) -> bool {
        matches!(self, Status::Open | Status::Closed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Status::FailedOpening | Status::FailedClosing)
    }

    /// Travel and remaining count of an interrupted operation, if any.
    pub fn in_progress(&self) -> Option<(Travel, u32)> {
        match self {
            Status::Opening(n) => Some((Travel::Opening, *n)),
            Status::Closing(n) => Some((Travel::Closing, *n)),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Closed => f.write_str("closed"),
            Status::Open => f.write_str("open"),
            Status::Opening(n) => write!(f, "opening {}", n),
            Status::Closing(n) => write!(f, "closing {}", n),
            Status::FailedOpening => f.write_str("failed opening"),
            Status::FailedClosing => f.write_str("failed closing"),
            Status::Unrecognized(text) => f.write_str(text),
        }
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terminal_tokens() {
        assert_eq!(Status::parse("closed"), Status::Closed);
        assert_eq!(Status::parse("open\n"), Status::Open);
        assert_eq!(Status::parse("failed opening"), Status::FailedOpening);
        assert_eq!(Status::parse("  failed closing  "), Status::FailedClosing);
    }

    #[test]
    fn test_parse_in_progress() {
        assert_eq!(Status::parse("opening 7"), Status::Opening(7));
        assert_eq!(Status::parse("closing 0"), Status::Closing(0));
    }

    #[test]
    fn test_parse_malformed_is_unrecognized() {
        for line in ["opening", "opening abc", "closing -2", "opening 3 4", "ajar"] {
            assert_eq!(Status::parse(line), Status::Unrecognized(line.to_string()), "{line}");
        }
    }

    #[test]
    fn test_display_matches_journal_layout() {
        assert_eq!(Status::Opening(11).to_string(), "opening 11");
        assert_eq!(Status::FailedClosing.to_string(), "failed closing");
        assert_eq!(Status::parse(&Status::Closing(4).to_string()), Status::Closing(4));
    }

    #[test]
    fn test_travel_states() {
        assert_eq!(Travel::Opening.start_state(), Status::Closed);
        assert_eq!(Travel::Closing.done_state(), Status::Closed);
        assert_eq!(Travel::Closing.failed_state(), Status::FailedClosing);
        assert_eq!(Status::Closing(2).in_progress(), Some((Travel::Closing, 2)));
        assert!(Status::Open.in_progress().is_none());
    }
}
