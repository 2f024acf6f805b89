//! A software stand-in for the EMG device, speaking the same wire protocol at 50 Hz.

use crate::device::{ByteSink, ByteSource, DeviceCommand};
use crate::error::EmgError;
use crate::frame_codec::encode_sample_packet;
use crate::protocol::{DataType, SamplePacket, SAMPLES_PER_PACKET, SIMULATED_SAMPLE_RATE_HZ};

use log::{debug, info, warn};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::f64::consts::PI;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Largest chunk the simulated link delivers at once.
const MAX_CHUNK_LEN: usize = 64;

/// A fake device that speaks the real wire protocol.
///
/// A generator thread produces sample frames at [SIMULATED_SAMPLE_RATE_HZ]
/// once it receives [DeviceCommand::StartCapture], with an occasional JSON
/// status message mixed in, and chops the byte stream into random-sized
/// chunks the way a Bluetooth link would.
pub struct SimulatedDevice {
    handle: Option<thread::JoinHandle<()>>,
    tx: Sender<Signal>,
    source: Option<SimulatedSource>,
}

enum Signal {
    Start,
    Stop,
    DataType(DataType),
    Quit,
}

/// Knobs for a [SimulatedDevice]. Get one from [SimulatedDevice::builder].
pub struct SimulatedDeviceBuilder {
    realtime: bool,
    max_packets: Option<usize>,
    status_every: usize,
    seed: Option<u64>,
}

impl SimulatedDeviceBuilder {
    /// Pace packets at the simulated sample rate (the default), or emit them
    /// as fast as the consumer takes them.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Close the byte source after this many sample packets.
    pub fn max_packets(mut self, max_packets: usize) -> Self {
        self.max_packets = Some(max_packets);
        self
    }

    /// Send a status message before every `n`th packet. Zero turns them off.
    pub fn status_every(mut self, n: usize) -> Self {
        self.status_every = n;
        self
    }

    /// Fix the random seed so chunk boundaries and samples repeat.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Spawn the generator thread.
    pub fn build(self) -> SimulatedDevice {
        let (tx, rx) = mpsc::channel::<Signal>();
        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let handle = thread::spawn(move || generate(self, rng, rx, chunk_tx));

        SimulatedDevice {
            handle: Some(handle),
            tx,
            source: Some(SimulatedSource { rx: chunk_rx }),
        }
    }
}

impl SimulatedDevice {
    /// Start configuring a simulated device.
    pub fn builder() -> SimulatedDeviceBuilder {
        SimulatedDeviceBuilder {
            realtime: true,
            max_packets: None,
            status_every: 10,
            seed: None,
        }
    }

    /// The byte stream coming out of the device. There is only one, so
    /// this returns `None` after the first call.
    pub fn take_source(&mut self) -> Option<SimulatedSource> {
        self.source.take()
    }

    /// Stop the generator thread and wait for it.
    pub fn shutdown(&mut self) {
        // The thread may already be gone after max_packets.
        let _ = self.tx.send(Signal::Quit);
        if let Some(thread) = self.handle.take() {
            if thread.join().is_err() {
                warn!("simulator thread panicked");
            }
        }
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ByteSink for SimulatedDevice {
    fn send_command(&mut self, command: &DeviceCommand) -> Result<(), EmgError> {
        let signal = match command {
            DeviceCommand::StartCapture => Signal::Start,
            DeviceCommand::StopCapture => Signal::Stop,
            DeviceCommand::SetDataType(data_type) => Signal::DataType(*data_type),
            DeviceCommand::SetSampleRate(rate) => {
                debug!("simulator ignores sample rate {} Hz", rate);
                return Ok(());
            }
        };
        self.tx.send(signal)?;
        Ok(())
    }
}

/// The reading half of a [SimulatedDevice].
pub struct SimulatedSource {
    rx: Receiver<Vec<u8>>,
}

impl ByteSource for SimulatedSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, EmgError> {
        match self.rx.recv_timeout(Duration::from_millis(100)) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(Some(Vec::new())),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

fn packet_period() -> Duration {
    Duration::from_millis(packet_period_ms().into())
}

fn packet_period_ms() -> u32 {
    SAMPLES_PER_PACKET as u32 * 1000 / SIMULATED_SAMPLE_RATE_HZ
}

fn generate(
    config: SimulatedDeviceBuilder,
    mut rng: StdRng,
    signals: Receiver<Signal>,
    out: Sender<Vec<u8>>,
) {
    // Dropped once max_packets is reached, which closes the byte source
    // while the device keeps answering commands.
    let mut out = Some(out);
    let mut streaming = false;
    let mut data_type = DataType::default();
    let mut clock_ms: u32 = 0;
    let mut sent = 0usize;

    loop {
        let next_signal = if streaming {
            signals.try_recv().ok()
        } else {
            // Nothing to do until somebody asks for data.
            match signals.recv() {
                Ok(signal) => Some(signal),
                Err(_) => break,
            }
        };

        match next_signal {
            Some(Signal::Start) => {
                info!("simulator: capture started");
                streaming = true;
            }
            Some(Signal::Stop) => {
                info!("simulator: capture stopped");
                streaming = false;
            }
            Some(Signal::DataType(dt)) => data_type = dt,
            Some(Signal::Quit) => break,
            None => {}
        }

        let Some(tx) = out.as_ref().filter(|_| streaming) else {
            streaming = false;
            continue;
        };

        let mut bytes = Vec::new();
        if sent == 0 {
            // Acknowledge the first start.
            bytes.extend(status_message(1, &mut rng));
        }
        if config.status_every > 0 && sent % config.status_every == 0 {
            bytes.extend(status_message(0, &mut rng));
        }

        let packet = synth_packet(clock_ms, data_type, &mut rng);
        match encode_sample_packet(&packet) {
            Ok(frame) => bytes.extend(frame),
            Err(e) => {
                warn!("simulator produced a bad packet: {}", e);
                break;
            }
        }

        if send_chunked(tx, &bytes, &mut rng).is_err() {
            debug!("simulator: nobody is reading, closing");
            out = None;
            continue;
        }

        sent += 1;
        clock_ms = clock_ms.wrapping_add(packet_period_ms());

        if config.max_packets.is_some_and(|max| sent >= max) {
            debug!("simulator: sent {} packets, closing the byte stream", sent);
            out = None;
            continue;
        }

        if config.realtime {
            spin_sleep::sleep(packet_period());
        }
    }
}

fn status_message(code: u8, rng: &mut StdRng) -> Vec<u8> {
    format!(
        "{{\"cd\":{},\"battery\":{}}}\r\n",
        code,
        rng.gen_range(60..=100)
    )
    .into_bytes()
}

fn send_chunked(out: &Sender<Vec<u8>>, bytes: &[u8], rng: &mut StdRng) -> Result<(), EmgError> {
    let mut rest = bytes;
    while !rest.is_empty() {
        let n = rng.gen_range(1..=MAX_CHUNK_LEN).min(rest.len());
        let (chunk, tail) = rest.split_at(n);
        out.send(chunk.to_vec())?;
        rest = tail;
    }
    Ok(())
}

/// Bursty noise shaped like a forearm EMG: a contraction roughly every four
/// seconds.
fn synth_packet(start_ms: u32, data_type: DataType, rng: &mut StdRng) -> SamplePacket {
    let dt_ms = 1000.0 / f64::from(SIMULATED_SAMPLE_RATE_HZ);
    let values = (0..SAMPLES_PER_PACKET)
        .map(|i| {
            let t = (f64::from(start_ms) + i as f64 * dt_ms) / 1000.0;
            let envelope = 50.0 + 450.0 * (t * PI / 2.0).sin().max(0.0);
            let noise: f64 = rng.gen_range(-1.0..1.0);
            let v = match data_type {
                DataType::Raw => 2048.0 + envelope * noise,
                DataType::Filtered => envelope * noise,
                DataType::Rms => envelope * (0.9 + 0.1 * noise.abs()),
            };
            v.round() as i16
        })
        .collect();
    SamplePacket::new(start_ms, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_codec::{decode_frame, FrameOutcome};
    use crate::protocol::DecodedFrame;

    fn drain(source: &mut SimulatedSource) -> Vec<u8> {
        let mut bytes = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            bytes.extend(chunk);
        }
        bytes
    }

    #[test]
    fn silent_until_started() {
        let mut dev = SimulatedDevice::builder().realtime(false).seed(1).build();
        let mut source = dev.take_source().unwrap();

        assert_eq!(source.next_chunk().unwrap(), Some(Vec::new()));
        dev.shutdown();
        assert_eq!(drain(&mut source), Vec::<u8>::new());
    }

    #[test]
    fn produces_frames_with_advancing_timestamps() {
        let mut dev = SimulatedDevice::builder()
            .realtime(false)
            .max_packets(3)
            .status_every(0)
            .seed(7)
            .build();
        let mut source = dev.take_source().unwrap();
        assert!(dev.take_source().is_none());

        dev.send_command(&DeviceCommand::StartCapture).unwrap();
        let bytes = drain(&mut source);

        // Start acknowledgement, then three frames.
        let mut rest = &bytes[..];
        let mut timestamps = Vec::new();
        while !rest.is_empty() {
            match decode_frame(rest) {
                FrameOutcome::Frame { frame, consumed } => {
                    if let DecodedFrame::Samples(p) = frame {
                        assert_eq!(p.values.len(), SAMPLES_PER_PACKET);
                        timestamps.push(p.timestamp);
                    }
                    rest = &rest[consumed..];
                }
                FrameOutcome::Malformed => rest = &rest[1..],
                FrameOutcome::Incomplete => panic!("trailing partial frame"),
            }
        }
        assert_eq!(timestamps, vec![0, 1000, 2000]);
    }

    #[test]
    fn chunks_are_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let (tx, rx) = mpsc::channel();
        send_chunked(&tx, &[0u8; 500], &mut rng).unwrap();
        drop(tx);

        let chunks: Vec<_> = rx.iter().collect();
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= MAX_CHUNK_LEN));
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 500);
    }

    #[test]
    fn packet_period_matches_simulated_rate() {
        assert_eq!(packet_period_ms(), 1000);
    }
}
