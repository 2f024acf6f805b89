//! Turns arbitrarily split chunks off the serial port into whole frames.

use crate::frame_codec::{decode_frame, FrameOutcome};
use crate::protocol::{DecodedFrame, MAX_CONTROL_FRAME_LEN};

use log::{debug, trace};

/// Most bytes kept between chunks. No frame is longer than
/// [MAX_CONTROL_FRAME_LEN], so a remainder past this is resynced through
/// even when the per-chunk limit is used up.
pub const MAX_PENDING_LEN: usize = 2 * MAX_CONTROL_FRAME_LEN;

/// Owns the pending bytes for one connection and pulls frames out of them.
///
/// Chunks may split a frame anywhere, including inside the header, or carry
/// several frames at once. Frames come out in the order they arrived.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    pending: Vec<u8>,
    resync_limit: Option<usize>,
    discarded: u64,
}

impl StreamAssembler {
    /// Instantiates an assembler that may resync through the whole buffer on
    /// every chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates an assembler that gives up after `limit` discarded bytes
    /// per chunk and waits for more input instead. A limit of 0 is raised
    /// to 1 so garbage can always be stepped over.
    pub fn with_resync_limit(limit: usize) -> Self {
        Self {
            resync_limit: Some(limit.max(1)),
            ..Self::default()
        }
    }

    /// Append `chunk` and return every frame that is now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedFrame> {
        self.pending.extend_from_slice(chunk);

        let budget = self.resync_limit.unwrap_or(self.pending.len());
        let mut frames = Vec::new();
        let mut offset = 0;
        let mut skipped = 0;

        while offset < self.pending.len() {
            match decode_frame(&self.pending[offset..]) {
                FrameOutcome::Frame { frame, consumed } => {
                    trace!("frame of {} bytes at offset {}", consumed, offset);
                    frames.push(frame);
                    offset += consumed;
                }
                FrameOutcome::Incomplete => break,
                FrameOutcome::Malformed => {
                    let remaining = self.pending.len() - offset;
                    if skipped >= budget && remaining <= MAX_PENDING_LEN {
                        debug!(
                            "resync gave up after {} bytes, keeping {} for the next chunk",
                            skipped,
                            remaining
                        );
                        break;
                    }
                    trace!("discarding 0x{:02X} to resync", self.pending[offset]);
                    offset += 1;
                    skipped += 1;
                }
            }
        }

        self.discarded += skipped as u64;
        self.pending.drain(..offset);
        frames
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total bytes thrown away while resyncing since this assembler was made.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drop every pending byte, e.g. when the device disconnects.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
