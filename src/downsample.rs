//! Decimation of sample packets for the live preview.

use crate::component::{Component, ComponentError};
use crate::protocol::SamplePacket;

use std::fmt;

/// Keep one sample out of this many.
pub const DOWNSAMPLE_FACTOR: usize = 5;

/// A decimated [SamplePacket]. `timestamp` is still the time of the first
/// sample in the source packet, not of each kept sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownsampledPacket {
    /// Device time of the source packet
    pub timestamp: u32,
    /// Samples at indices 0, 5, 10, ... of the source packet
    pub values: Vec<i16>,
}

/// Keep samples 0, 5, 10, ... of `packet`. Works for any number of samples.
pub fn downsample(packet: &SamplePacket) -> DownsampledPacket {
    DownsampledPacket {
        timestamp: packet.timestamp,
        values: packet
            .values
            .iter()
            .step_by(DOWNSAMPLE_FACTOR)
            .copied()
            .collect(),
    }
}

/// The preview stage of the pipeline, runs [downsample] on every packet it
/// receives.
#[derive(Debug, Default)]
pub struct Downsampler {
    converted: usize,
}

impl Downsampler {
    /// Instantiates a new stage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for Downsampler {
    type InData = SamplePacket;
    type OutData = DownsampledPacket;

    fn convert(&mut self, input: SamplePacket) -> DownsampledPacket {
        self.converted += 1;
        downsample(&input)
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }
}

impl fmt::Display for Downsampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Downsampler ({} packets)", self.converted)
    }
}
