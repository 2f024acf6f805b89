//! Works out whether a capture is running from the frames that arrive.
//!
//! The device never says "I started streaming". The first sample packet
//! after a reset is the only signal we get, so the tracker is a two-state
//! machine:
//!
//! ```text
//!              first sample packet
//!   Idle  ---------------------------->  Streaming
//!    ^                                       |
//!    +------------- reset() -----------------+
//! ```
//!
//! `is_streaming` means "samples have arrived since the last reset". It says
//! nothing about whether the device is still sending. Code that stops a
//! capture must gate on having a device, never on this flag, or a session
//! that never produced a packet could not be stopped.

use crate::protocol::DecodedFrame;

use log::{debug, info};

/// The streaming flag for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSessionState {
    /// True once a sample packet has arrived since the last reset
    pub is_streaming: bool,
}

/// Emitted by [SessionTracker::on_frame] on a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The first sample packet since the last reset arrived.
    StreamingStarted {
        /// Device timestamp of that packet
        timestamp: u32,
    },
}

/// Watches every decoded frame and keeps the [StreamSessionState].
#[derive(Debug, Default)]
pub struct SessionTracker {
    state: StreamSessionState,
}

impl SessionTracker {
    /// A tracker for a fresh connection, not streaming.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one frame. Returns an event only on the first sample packet
    /// after construction or [reset](Self::reset).
    pub fn on_frame(&mut self, frame: &DecodedFrame) -> Option<SessionEvent> {
        match frame {
            DecodedFrame::Samples(packet) if !self.state.is_streaming => {
                self.state.is_streaming = true;
                info!("streaming started at device time {} ms", packet.timestamp);
                Some(SessionEvent::StreamingStarted {
                    timestamp: packet.timestamp,
                })
            }
            DecodedFrame::Samples(_) => None,
            DecodedFrame::Control(msg) => {
                debug!("control message {:?}", msg.code());
                None
            }
        }
    }

    /// Forget that samples were seen. Called when a new capture is started
    /// and on disconnect. Emits nothing.
    pub fn reset(&mut self) {
        self.state.is_streaming = false;
    }

    /// The current flag.
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming
    }

    /// A copy of the current state.
    pub fn state(&self) -> StreamSessionState {
        self.state
    }
}
