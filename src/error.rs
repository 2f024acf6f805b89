//! The error type shared by the non-UI parts of emgwire.
//!
//! Decoding never produces one of these: framing problems are absorbed by
//! resyncing inside the [StreamAssembler](crate::stream_assembler::StreamAssembler).
//! Errors only come from the edges of the system, talking to the device,
//! reading configuration and writing exports.

use std::{borrow::Cow, fmt, sync::mpsc};

/// Everything that can go wrong outside of the decode path.
#[derive(Debug)]
pub enum EmgError {
    /// Returned when io fails on the serial port or while writing exports.
    Io(std::io::Error),

    /// Returned when a control message or command fails to (de)serialize.
    Json(serde_json::Error),

    /// Returned when serialization of a config file fails.
    Ron(ron::Error),

    /// Returned when deserialization of a config file fails.
    RonSpanned(ron::error::SpannedError),

    /// Returned when a config file parses but holds an unusable value.
    InvalidConfig(String),

    /// Returned when trying to encode a packet whose sample count does not
    /// match the wire format.
    SampleCount {
        /// Number of samples the wire format carries
        expected: usize,
        /// Number of samples in the packet
        found: usize,
    },

    /// Returned when a command needs a device but none is selected.
    NoDeviceSelected,

    /// Returned when the other end of a pipeline channel hung up.
    ChannelClosed,
}

impl fmt::Display for EmgError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            EmgError::Io(error) => Cow::from(format!("io error: {}", error)),
            EmgError::Json(error) => Cow::from(format!("json error: {}", error)),
            EmgError::Ron(error) => Cow::from(format!("ron error: {}", error)),
            EmgError::RonSpanned(error) => Cow::from(format!("ron spanning error: {}", error)),
            EmgError::InvalidConfig(reason) => Cow::from(format!("invalid config: {}", reason)),
            EmgError::SampleCount { expected, found } => Cow::from(format!(
                "sample packets carry {} samples, got {}",
                expected, found
            )),
            EmgError::NoDeviceSelected => Cow::from("no device selected"),
            EmgError::ChannelClosed => Cow::from("pipeline channel closed"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for EmgError {}

impl From<std::io::Error> for EmgError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EmgError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ron::Error> for EmgError {
    fn from(value: ron::Error) -> Self {
        Self::Ron(value)
    }
}

impl From<ron::error::SpannedError> for EmgError {
    fn from(value: ron::error::SpannedError) -> Self {
        Self::RonSpanned(value)
    }
}

impl<T> From<mpsc::SendError<T>> for EmgError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<mpsc::RecvError> for EmgError {
    fn from(_: mpsc::RecvError) -> Self {
        Self::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_message_names_both_counts() {
        let err = EmgError::SampleCount {
            expected: 50,
            found: 3,
        };
        assert_eq!(err.to_string(), "sample packets carry 50 samples, got 3");
    }

    #[test]
    fn send_error_maps_to_channel_closed() {
        let (tx, rx) = mpsc::channel::<u8>();
        drop(rx);
        let err: EmgError = tx.send(1).unwrap_err().into();
        assert!(matches!(err, EmgError::ChannelClosed));
    }
}
