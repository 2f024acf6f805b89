//! One connection's worth of decoding: chunks in, frames out, fanned out to
//! the session tracker, the live preview and the CSV export.
//!
//! ```text
//! chunk -> StreamAssembler -> frame -> SessionTracker
//!                               |
//!                               +--> preview channel (Downsampler stage)
//!                               +--> ExportWorker (incremental CSV)
//!                               +--> recording (batch CSV)
//! ```
//!
//! A [CaptureSession] is driven from a single thread, the one receiving
//! chunks from [spawn_reader](crate::device::spawn_reader).

use crate::config::CaptureConfig;
use crate::csv::serialize_incremental;
use crate::device::{ByteSink, DeviceCommand};
use crate::error::EmgError;
use crate::export::ExportWorker;
use crate::protocol::{ControlMessage, DataType, DecodedFrame, SamplePacket};
use crate::session::{SessionEvent, SessionTracker};
use crate::stream_assembler::StreamAssembler;

use log::{debug, info, warn};
use std::{path::PathBuf, sync::mpsc::Sender};

/// What came out of one chunk.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChunkReport {
    /// Sample packets, in arrival order
    pub packets: Vec<SamplePacket>,
    /// Control messages, in arrival order
    pub controls: Vec<ControlMessage>,
    /// Set if this chunk carried the first packet since the last reset
    pub started: Option<SessionEvent>,
}

/// Running totals for status displays.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Whether samples have arrived since the last start
    pub streaming: bool,
    /// Sample packets decoded on this connection
    pub packets: usize,
    /// Control messages decoded on this connection
    pub controls: usize,
    /// Packets whose timestamp went backwards
    pub regressions: usize,
    /// Bytes thrown away while resyncing
    pub discarded: u64,
}

/// The decode pipeline for one connection.
pub struct CaptureSession<D: ByteSink> {
    device: Option<D>,
    assembler: StreamAssembler,
    tracker: SessionTracker,
    sample_rate_hz: f64,
    csv: Option<ExportWorker>,
    preview: Option<Sender<SamplePacket>>,
    recording: Option<Vec<SamplePacket>>,
    last_timestamp: Option<u32>,
    stats: CaptureStats,
}

impl<D: ByteSink> CaptureSession<D> {
    /// A session with no device selected yet.
    pub fn new(config: &CaptureConfig) -> Self {
        let assembler = match config.resync_limit {
            Some(limit) => StreamAssembler::with_resync_limit(limit),
            None => StreamAssembler::new(),
        };
        Self {
            device: None,
            assembler,
            tracker: SessionTracker::new(),
            sample_rate_hz: f64::from(config.sample_rate_hz),
            csv: None,
            preview: None,
            recording: None,
            last_timestamp: None,
            stats: CaptureStats::default(),
        }
    }

    /// Attach the device commands go to.
    pub fn select_device(&mut self, device: D) {
        self.device = Some(device);
    }

    /// Whether a device is selected. This, not streaming, gates stopping.
    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Append every packet's CSV rows through `worker`.
    pub fn stream_csv_to(&mut self, worker: ExportWorker) {
        self.csv = Some(worker);
    }

    /// Send a copy of every packet to `tx`, normally a
    /// [Downsampler](crate::downsample::Downsampler) stage.
    pub fn preview_to(&mut self, tx: Sender<SamplePacket>) {
        self.preview = Some(tx);
    }

    /// Keep every packet in memory for a batch export at the end.
    pub fn keep_recording(&mut self) {
        self.recording.get_or_insert_with(Vec::new);
    }

    /// Ask the device for a sample rate and data type.
    pub fn configure(&mut self, sample_rate_hz: u32, data_type: DataType) -> Result<(), EmgError> {
        let device = self.device.as_mut().ok_or(EmgError::NoDeviceSelected)?;
        device.send_command(&DeviceCommand::SetSampleRate(sample_rate_hz))?;
        device.send_command(&DeviceCommand::SetDataType(data_type))?;
        Ok(())
    }

    /// Tell the device to start and forget any previous streaming state.
    pub fn start_capture(&mut self) -> Result<(), EmgError> {
        let device = self.device.as_mut().ok_or(EmgError::NoDeviceSelected)?;
        device.send_command(&DeviceCommand::StartCapture)?;
        self.tracker.reset();
        self.last_timestamp = None;
        info!("capture requested");
        Ok(())
    }

    /// Tell the device to stop. Works whether or not any samples arrived.
    pub fn stop_capture(&mut self) -> Result<(), EmgError> {
        let device = self.device.as_mut().ok_or(EmgError::NoDeviceSelected)?;
        device.send_command(&DeviceCommand::StopCapture)?;
        info!(
            "capture stopped after {} packets (streaming: {})",
            self.stats.packets,
            self.tracker.is_streaming()
        );
        Ok(())
    }

    /// Feed one chunk from the transport through the pipeline.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> ChunkReport {
        let mut report = ChunkReport::default();

        for frame in self.assembler.feed(chunk) {
            if let Some(event) = self.tracker.on_frame(&frame) {
                report.started = Some(event);
            }

            match frame {
                DecodedFrame::Samples(packet) => {
                    self.observe_packet(&packet);
                    report.packets.push(packet);
                }
                DecodedFrame::Control(msg) => {
                    self.stats.controls += 1;
                    report.controls.push(msg);
                }
            }
        }

        report
    }

    fn observe_packet(&mut self, packet: &SamplePacket) {
        self.stats.packets += 1;

        // Passed through either way; the device may have restarted.
        if let Some(last) = self.last_timestamp {
            if packet.timestamp < last {
                self.stats.regressions += 1;
                warn!(
                    "packet timestamp went backwards: {} ms after {} ms",
                    packet.timestamp, last
                );
            }
        }
        self.last_timestamp = Some(packet.timestamp);

        if let Some(tx) = &self.preview {
            if tx.send(packet.clone()).is_err() {
                debug!("preview receiver gone, no longer previewing");
                self.preview = None;
            }
        }

        if let Some(worker) = &mut self.csv {
            worker.submit(serialize_incremental(packet, self.sample_rate_hz));
        }

        if let Some(recording) = &mut self.recording {
            recording.push(packet.clone());
        }
    }

    /// Whether samples have arrived since the last start.
    pub fn is_streaming(&self) -> bool {
        self.tracker.is_streaming()
    }

    /// Running totals.
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            streaming: self.tracker.is_streaming(),
            discarded: self.assembler.discarded(),
            ..self.stats
        }
    }

    /// The rate CSV timestamps are interpolated at.
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Everything recorded since [keep_recording](Self::keep_recording).
    pub fn take_recording(&mut self) -> Vec<SamplePacket> {
        self.recording.take().unwrap_or_default()
    }

    /// Flush and close the incremental CSV, if one is open.
    pub fn finish_csv(&mut self) -> Option<Result<PathBuf, EmgError>> {
        self.csv.take().map(ExportWorker::finish)
    }

    /// Tear down the connection state. Safe to call any number of times.
    /// Hands back the device, if one was selected.
    pub fn disconnect(&mut self) -> Option<D> {
        self.tracker.reset();
        self.assembler.clear();
        self.last_timestamp = None;
        self.preview = None;
        let device = self.device.take();
        if device.is_some() {
            info!("device disconnected");
        }
        device
    }
}
