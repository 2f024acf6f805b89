//! emgwire is the host side of a Bluetooth-serial EMG acquisition device.
//! The device pushes one byte stream at us that mixes two kinds of message:
//! JSON control/status objects and fixed-size binary sample frames. This
//! crate turns that stream into typed, timestamped sample packets for a
//! live preview and for CSV export.
//!
//! The data flows like this:
//!
//! ```text
//! raw chunk -> stream_assembler -> frame_codec -> SamplePacket | ControlMessage
//!                                                      |
//!                    session (streaming flag) <--------+
//!                    downsample (live preview) <-------+
//!                    csv -> export (files) <-----------+
//! ```
//!
//! [capture::CaptureSession] wires these together for one connection. The
//! transport sits behind the traits in [device]; [simulator] provides a
//! software device that speaks the same protocol at 50 Hz.

#![warn(missing_docs)]
pub mod args;
pub mod capture;
pub mod component;
pub mod config;
pub mod csv;
pub mod device;
pub mod downsample;
pub mod error;
pub mod export;
pub mod frame_codec;
pub mod gui;
pub mod protocol;
pub mod session;
pub mod simulator;
pub mod stream_assembler;
