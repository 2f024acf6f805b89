//! CSV output for captured samples.
//!
//! Rows look like `1004.65,-12`: the per-sample time in milliseconds with
//! exactly two decimals, then the raw sample value. Times inside a packet
//! are interpolated from the packet timestamp:
//!
//! ```text
//! t(i) = packet.timestamp + i * 1000 / sample_rate_hz
//! ```
//!
//! Spreadsheet tools read these files, so the shape (two decimals, comma,
//! LF line endings) must stay fixed.

use crate::protocol::SamplePacket;

use std::fmt::Write;

/// Header line of a batch export, without the newline.
pub const CSV_HEADER: &str = "timestamp,value";

/// Milliseconds between samples. A rate of zero or less puts every sample
/// of a packet at the packet timestamp.
fn sample_interval_ms(sample_rate_hz: f64) -> f64 {
    if sample_rate_hz > 0.0 {
        1000.0 / sample_rate_hz
    } else {
        0.0
    }
}

fn write_rows(out: &mut String, packet: &SamplePacket, interval_ms: f64) {
    let base = f64::from(packet.timestamp);
    for (i, value) in packet.values.iter().enumerate() {
        let ts = base + i as f64 * interval_ms;
        // Writing into a String can't fail.
        let _ = writeln!(out, "{:.2},{}", ts, value);
    }
}

/// The rows for one packet, as appended to a file while the device streams.
/// No header. Every row, including the last, ends in `\n`.
pub fn serialize_incremental(packet: &SamplePacket, sample_rate_hz: f64) -> String {
    let mut out = String::with_capacity(packet.values.len() * 16);
    write_rows(&mut out, packet, sample_interval_ms(sample_rate_hz));
    out
}

/// A whole recording: the header line, then the rows of every packet in
/// order, ending in a single `\n`.
pub fn serialize_batch(packets: &[SamplePacket], sample_rate_hz: f64) -> String {
    let interval_ms = sample_interval_ms(sample_rate_hz);
    let n_rows: usize = packets.iter().map(|p| p.values.len()).sum();

    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + n_rows * 16);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for packet in packets {
        write_rows(&mut out, packet, interval_ms);
    }
    out
}
