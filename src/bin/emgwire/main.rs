//! Command line front end: capture from a device, run the simulator, or
//! list serial ports.

use clap::Parser;
use emgwire::{
    args::{CaptureCommand, CommandTask, EmgArgs, SimulateCommand},
    capture::CaptureSession,
    component::run_component,
    config::CaptureConfig,
    csv::serialize_batch,
    device::{spawn_reader, ByteSink, ChunkReader, DeviceCommand, SerialDevice},
    downsample::{DownsampledPacket, Downsampler},
    export::{ExportWorker, Exporter, FileExporter},
    gui::{device_selector, fold_until_stop, Interrupted},
    protocol::SIMULATED_SAMPLE_RATE_HZ,
    simulator::SimulatedDevice,
};

use log::{error, info, warn};
use std::{
    error::Error,
    process,
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    time::Duration,
};

// Example:
// cargo run --bin emgwire -- --dir recordings capture --data-type rms --out arm.csv
// cargo run --bin emgwire -- simulate --packets 60

fn main() {
    env_logger::init();
    let args = EmgArgs::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("emgwire: {}", e);
        process::exit(1);
    }
}

fn run(args: EmgArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => CaptureConfig::from_path(path)?,
        None => CaptureConfig::default(),
    };
    args.apply(&mut config);

    match args.command {
        CommandTask::Capture(cmd) => capture(cmd, config),
        CommandTask::Simulate(cmd) => simulate(cmd, config),
        CommandTask::Ports => {
            println!("Available devices:");
            for port in SerialDevice::available_ports()? {
                println!("\t{}", port.to_string_lossy());
            }
            Ok(())
        }
    }
}

/// Everything the capture screen's worker thread owns.
struct LiveCapture {
    session: CaptureSession<SerialDevice>,
    reader: ChunkReader,
    preview: Receiver<DownsampledPacket>,
    latest: Option<DownsampledPacket>,
    closed: bool,
}

impl LiveCapture {
    fn pump(mut self) -> Self {
        if !self.closed {
            match self.reader.chunks().recv_timeout(Duration::from_millis(50)) {
                Ok(chunk) => {
                    self.session.handle_chunk(&chunk);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("device stopped sending");
                    self.closed = true;
                }
            }
        } else {
            std::thread::sleep(Duration::from_millis(50));
        }

        if let Some(latest) = self.preview.try_iter().last() {
            self.latest = Some(latest);
        }
        self
    }

    fn status_lines(&self) -> Vec<String> {
        let stats = self.session.stats();
        let mut lines = vec![
            format!(
                " streaming: {}",
                if stats.streaming { "yes" } else { "waiting for samples" }
            ),
            format!(" packets: {}  control messages: {}", stats.packets, stats.controls),
            format!(
                " resync bytes: {}  timestamp regressions: {}",
                stats.discarded, stats.regressions
            ),
        ];
        if let Some(latest) = &self.latest {
            lines.push(format!(" t = {} ms  {:?}", latest.timestamp, latest.values));
        }
        if self.closed {
            lines.push(" device closed the connection".to_owned());
        }
        lines
    }
}

fn capture(cmd: CaptureCommand, config: CaptureConfig) -> Result<(), Box<dyn Error>> {
    let port = match cmd.port {
        Some(port) => port,
        None => match device_selector(|| {
            SerialDevice::available_ports().unwrap_or_else(|e| {
                warn!("could not list serial ports: {}", e);
                Vec::new()
            })
        })? {
            Some(port) => port,
            None => {
                info!("no device selected");
                return Ok(());
            }
        },
    };

    let device = SerialDevice::open(&port, config.baud_rate)?;
    let reader = spawn_reader(device.reader());
    let mut fallback = device.clone();

    let mut exporter = FileExporter::new(&config.output_dir);
    let mut session = CaptureSession::new(&config);
    session.select_device(device);
    session.stream_csv_to(ExportWorker::start(
        exporter.path_for(&cmd.outfile),
        config.export_queue_depth,
    )?);

    let (packet_tx, packet_rx) = mpsc::channel();
    let (preview_tx, preview_rx) = mpsc::channel();
    let preview_handle = run_component(Box::new(Downsampler::new()), packet_rx, preview_tx);
    session.preview_to(packet_tx);

    session.configure(config.sample_rate_hz, config.data_type)?;
    session.start_capture()?;

    let live = LiveCapture {
        session,
        reader,
        preview: preview_rx,
        latest: None,
        closed: false,
    };
    let (live, screen_error) = match fold_until_stop(
        &format!("Capturing from {}", port.display()),
        live,
        LiveCapture::pump,
        LiveCapture::status_lines,
    ) {
        Ok(live) => (Some(live), None),
        Err(Interrupted { state, error }) => (state, Some(error)),
    };

    let csv = match live {
        Some(mut live) => {
            // Stopping only needs a device, whether or not samples ever arrived.
            if let Err(e) = live.session.stop_capture() {
                warn!("could not send stop: {}", e);
            }
            live.reader.stop();
            let csv = live.session.finish_csv();
            live.session.disconnect();
            csv
        }
        None => {
            // The session went down with the screen, so stop through a clone.
            if let Err(e) = fallback.send_command(&DeviceCommand::StopCapture) {
                warn!("could not send stop: {}", e);
            }
            None
        }
    };
    if preview_handle.join().is_err() {
        warn!("preview stage panicked");
    }

    if let Some(error) = screen_error {
        if let Some(Ok(path)) = &csv {
            info!("partial capture kept in {}", path.display());
        }
        return Err(error.into());
    }
    if let Some(path) = csv.transpose()? {
        exporter.share(&path)?;
    }
    Ok(())
}

fn simulate(cmd: SimulateCommand, mut config: CaptureConfig) -> Result<(), Box<dyn Error>> {
    config.sample_rate_hz = SIMULATED_SAMPLE_RATE_HZ;

    let mut device = SimulatedDevice::builder()
        .realtime(cmd.realtime)
        .max_packets(cmd.packets)
        .build();
    let source = device
        .take_source()
        .ok_or("simulated device has no byte source")?;
    let reader = spawn_reader(source);

    let mut session = CaptureSession::new(&config);
    session.select_device(device);
    session.keep_recording();
    session.configure(config.sample_rate_hz, config.data_type)?;
    session.start_capture()?;

    for chunk in reader.chunks().iter() {
        let report = session.handle_chunk(&chunk);
        for msg in report.controls {
            info!("device status: {}", msg.body);
        }
    }

    session.stop_capture()?;
    let recording = session.take_recording();
    let stats = session.stats();
    session.disconnect();
    info!(
        "recorded {} packets, discarded {} bytes",
        stats.packets, stats.discarded
    );

    let mut exporter = FileExporter::new(&config.output_dir);
    let path = exporter.write_text(
        &cmd.outfile,
        &serialize_batch(&recording, f64::from(config.sample_rate_hz)),
    )?;
    exporter.share(&path)?;
    Ok(())
}
