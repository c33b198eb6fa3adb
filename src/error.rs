//! Measurement error types.

use core::fmt;

/// Errors that can end a measurement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No complete echo pulse within the configured timeout.
    ///
    /// Never produced when `Config::echo_timeout_us` is `None`.
    Timeout,
    /// The trigger output pin failed to change level.
    Trigger,
    /// An indicator LED or the buzzer pin failed to change level.
    Indicator,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout => f.write_str("timeout waiting for echo pulse"),
            Error::Trigger => f.write_str("error driving trigger pin"),
            Error::Indicator => f.write_str("error driving indicator pin"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for echo pulse");
        assert_eq!(Error::Trigger.to_string(), "error driving trigger pin");
        assert_eq!(Error::Indicator.to_string(), "error driving indicator pin");
    }
}
