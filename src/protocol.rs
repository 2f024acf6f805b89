//! Wire constants and the typed messages that come off the serial link.
//!
//! The device multiplexes two kinds of message on one channel:
//!
//! - Binary sample frames, 108 bytes each, little-endian:
//!
//! ```text
//! [0]       0xAA magic
//! [1]       0x0D frame type (sample packet)
//! [2..6)    u32 timestamp, milliseconds on the device clock
//! [6..8)    u16 sample count, always 50
//! [8..108)  50 x i16 samples
//! ```
//!
//! - JSON control/status messages, a brace-delimited UTF-8 object whose
//!   schema belongs to the firmware.

use serde::{Deserialize, Serialize};

/// First byte of every binary frame.
pub const BINARY_MAGIC: u8 = 0xAA;

/// Frame type code of a sample packet. Other codes are reserved.
pub const SAMPLE_PACKET_TYPE: u8 = 0x0D;

/// Number of samples in one sample packet.
pub const SAMPLES_PER_PACKET: usize = 50;

/// Size of the binary header: magic, type, timestamp and sample count.
pub const BINARY_HEADER_LEN: usize = 8;

/// Total size of a binary sample frame.
pub const BINARY_FRAME_LEN: usize = BINARY_HEADER_LEN + SAMPLES_PER_PACKET * 2;

/// First byte of every control frame.
pub const CONTROL_OPEN: u8 = b'{';

/// Last byte of every control frame.
pub const CONTROL_CLOSE: u8 = b'}';

/// Longest control frame we are willing to wait for before giving up on it.
pub const MAX_CONTROL_FRAME_LEN: usize = 1024;

/// The hardware sample rate. It is fixed in the firmware.
pub const DEVICE_SAMPLE_RATE_HZ: u32 = 215;

/// The sample rate of the software simulation device.
pub const SIMULATED_SAMPLE_RATE_HZ: u32 = 50;

/// One binary sample packet as sent by the device.
///
/// `timestamp` is the device time of the first sample. Packets decoded off
/// the wire always carry exactly [SAMPLES_PER_PACKET] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePacket {
    /// Milliseconds on the device clock
    pub timestamp: u32,
    /// Samples in arrival order
    pub values: Vec<i16>,
}

impl SamplePacket {
    /// Build a packet from a timestamp and its samples.
    pub fn new(timestamp: u32, values: Vec<i16>) -> Self {
        Self { timestamp, values }
    }
}

/// An opaque JSON document from the firmware. Only higher layers look inside.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage {
    /// The parsed document
    pub body: serde_json::Value,
}

impl ControlMessage {
    /// The `cd` command/status code, if the message has a numeric one.
    pub fn code(&self) -> Option<i64> {
        self.body.get("cd").and_then(serde_json::Value::as_i64)
    }
}

/// One complete frame pulled out of the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A binary sample packet
    Samples(SamplePacket),
    /// A JSON control message
    Control(ControlMessage),
}

/// What the device should put in the sample slots of each packet. The
/// filtering itself happens in the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum DataType {
    /// Unprocessed ADC values
    Raw,
    /// Band-pass filtered signal
    #[default]
    Filtered,
    /// RMS envelope
    Rms,
}

impl DataType {
    /// The selector value the firmware expects.
    pub fn selector(self) -> u8 {
        match self {
            DataType::Raw => 0,
            DataType::Filtered => 1,
            DataType::Rms => 2,
        }
    }
}
