//! The seam between emgwire and whatever carries bytes to and from the
//! device.
//!
//! The transport is a [ByteSource] that hands over opaque chunks in no
//! particular alignment, and a [ByteSink] that accepts [DeviceCommand]s.
//! [SerialDevice] implements both on top of a serial port (a paired
//! Bluetooth SPP link shows up as one); the
//! [SimulatedDevice](crate::simulator::SimulatedDevice) implements them in
//! software.

use crate::error::EmgError;
use crate::protocol::DataType;

use log::{debug, info, warn};
use serde::Serialize;
use serial2::SerialPort;
use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// How long a serial read waits before checking whether it should stop.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const READ_BUF_LEN: usize = 512;

/// Somewhere chunks of device output come from.
pub trait ByteSource {
    /// Block until bytes are available. `Ok(None)` means the source is
    /// closed for good; an empty chunk means nothing arrived in time.
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, EmgError>;
}

/// Somewhere configuration commands go to.
pub trait ByteSink {
    /// Send one command to the device.
    fn send_command(&mut self, command: &DeviceCommand) -> Result<(), EmgError>;
}

/// Outbound configuration commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Begin sending sample packets
    StartCapture,
    /// Stop sending sample packets
    StopCapture,
    /// Request a sample rate. The hardware ignores this and runs at 215 Hz.
    SetSampleRate(u32),
    /// Choose which processing stage the samples come from
    SetDataType(DataType),
}

#[derive(Serialize)]
struct CommandFrame {
    cd: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dt: Option<u8>,
}

impl DeviceCommand {
    /// The `cd` code for this command.
    pub fn code(&self) -> u8 {
        match self {
            DeviceCommand::StartCapture => 1,
            DeviceCommand::StopCapture => 2,
            DeviceCommand::SetSampleRate(_) => 3,
            DeviceCommand::SetDataType(_) => 4,
        }
    }

    /// The line sent over the wire: one JSON object and a `\n`.
    pub fn encode(&self) -> Result<Vec<u8>, EmgError> {
        let frame = CommandFrame {
            cd: self.code(),
            rate: match self {
                DeviceCommand::SetSampleRate(rate) => Some(*rate),
                _ => None,
            },
            dt: match self {
                DeviceCommand::SetDataType(data_type) => Some(data_type.selector()),
                _ => None,
            },
        };
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// A device on a serial port.
#[derive(Clone)]
pub struct SerialDevice {
    port: Arc<SerialPort>,
    path: PathBuf,
}

impl SerialDevice {
    /// Every serial port the OS knows about.
    pub fn available_ports() -> Result<Vec<PathBuf>, EmgError> {
        Ok(SerialPort::available_ports()?)
    }

    /// Open `path` at `baud_rate`.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32) -> Result<Self, EmgError> {
        let path = path.as_ref().to_path_buf();
        let mut port = SerialPort::open(&path, baud_rate)?;
        port.set_read_timeout(READ_TIMEOUT)?;
        info!("opened {} at {} baud", path.display(), baud_rate);

        Ok(Self {
            port: Arc::new(port),
            path,
        })
    }

    /// Where this device lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A [ByteSource] reading from the same port.
    pub fn reader(&self) -> SerialReader {
        SerialReader {
            port: Arc::clone(&self.port),
            buf: vec![0; READ_BUF_LEN],
        }
    }
}

impl ByteSink for SerialDevice {
    fn send_command(&mut self, command: &DeviceCommand) -> Result<(), EmgError> {
        debug!("sending {:?} to {}", command, self.path.display());
        self.port.write_all(&command.encode()?)?;
        Ok(())
    }
}

/// The reading half of a [SerialDevice].
pub struct SerialReader {
    port: Arc<SerialPort>,
    buf: Vec<u8>,
}

impl ByteSource for SerialReader {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, EmgError> {
        match self.port.read(&mut self.buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(self.buf[..n].to_vec())),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Some(Vec::new())),
            Err(e) => Err(e.into()),
        }
    }
}

/// A reader thread feeding chunks into a channel.
///
/// Whatever the source does, chunks reach the receiver one at a time and in
/// order, so the consumer owns its assembler without any locking.
pub struct ChunkReader {
    chunks: Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Move `source` onto its own thread and forward every non-empty chunk.
pub fn spawn_reader<S>(mut source: S) -> ChunkReader
where
    S: ByteSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let th_stop = Arc::clone(&stop);

    let handle = thread::spawn(move || {
        while !th_stop.load(Ordering::Relaxed) {
            match source.next_chunk() {
                Ok(Some(chunk)) if chunk.is_empty() => continue,
                Ok(Some(chunk)) => {
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("byte source closed");
                    break;
                }
                Err(e) => {
                    warn!("device read failed: {}", e);
                    break;
                }
            }
        }
    });

    ChunkReader {
        chunks: rx,
        stop,
        handle: Some(handle),
    }
}

impl ChunkReader {
    /// The chunks, in arrival order.
    pub fn chunks(&self) -> &Receiver<Vec<u8>> {
        &self.chunks
    }

    /// Ask the reader thread to exit and wait for it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("reader thread panicked");
            }
        }
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedSource {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ByteSource for ScriptedSource {
        fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, EmgError> {
            Ok(self.chunks.pop_front())
        }
    }

    #[test]
    fn commands_encode_as_json_lines() {
        assert_eq!(
            DeviceCommand::StartCapture.encode().unwrap(),
            b"{\"cd\":1}\n".to_vec()
        );
        assert_eq!(
            DeviceCommand::StopCapture.encode().unwrap(),
            b"{\"cd\":2}\n".to_vec()
        );
        assert_eq!(
            DeviceCommand::SetSampleRate(215).encode().unwrap(),
            b"{\"cd\":3,\"rate\":215}\n".to_vec()
        );
        assert_eq!(
            DeviceCommand::SetDataType(DataType::Rms).encode().unwrap(),
            b"{\"cd\":4,\"dt\":2}\n".to_vec()
        );
    }

    #[test]
    fn reader_forwards_chunks_in_order_and_skips_empty_ones() {
        let source = ScriptedSource {
            chunks: VecDeque::from(vec![vec![1, 2], vec![], vec![3], vec![4, 5, 6]]),
        };
        let reader = spawn_reader(source);

        let got: Vec<Vec<u8>> = reader.chunks().iter().collect();
        assert_eq!(got, vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
    }
}
