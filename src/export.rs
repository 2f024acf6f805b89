//! Getting CSV text out of the process.
//!
//! Two ways in: [Exporter] writes a finished document in one go (batch
//! mode), and [ExportWorker] appends rows from a background thread while
//! the device streams (incremental mode). The chunk-arrival path must never
//! wait on the disk, so the worker sits behind a bounded queue and drops
//! text rather than block when the queue is full.

use crate::component::{run_component, Component, ComponentError};
use crate::error::EmgError;

use log::{info, warn};
use std::{
    fmt,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, SyncSender, TrySendError},
    thread::JoinHandle,
};

/// Storage plus a handoff to whatever shares the file with the user.
pub trait Exporter {
    /// Store `text` under `name` and return where it ended up.
    fn write_text(&mut self, name: &str, text: &str) -> Result<PathBuf, EmgError>;

    /// Offer a finished file to the user.
    fn share(&mut self, path: &Path) -> Result<(), EmgError>;
}

/// Writes exports into a directory. Sharing means telling the user where
/// the file is.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    /// Export into `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path an export called `name` will get.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Exporter for FileExporter {
    fn write_text(&mut self, name: &str, text: &str) -> Result<PathBuf, EmgError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        fs::write(&path, text)?;
        info!("wrote {} bytes to {}", text.len(), path.display());
        Ok(path)
    }

    fn share(&mut self, path: &Path) -> Result<(), EmgError> {
        info!("export ready: {}", path.display());
        Ok(())
    }
}

/// Appends text to one file.
struct CsvAppender {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl Component for CsvAppender {
    type InData = String;
    type OutData = io::Result<usize>;

    fn convert(&mut self, input: String) -> io::Result<usize> {
        self.writer.write_all(input.as_bytes())?;
        Ok(input.len())
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for CsvAppender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CsvAppender({})", self.path.display())
    }
}

/// A background writer for incremental CSV output.
pub struct ExportWorker {
    tx: Option<SyncSender<String>>,
    results: Receiver<io::Result<usize>>,
    handle: Option<JoinHandle<()>>,
    path: PathBuf,
    bytes_written: usize,
    dropped: usize,
    first_error: Option<io::Error>,
}

impl ExportWorker {
    /// Create (or truncate) `path` and start the writer thread with room
    /// for `queue_depth` pending pieces of text.
    pub fn start(path: impl AsRef<Path>, queue_depth: usize) -> Result<Self, EmgError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;

        let appender = CsvAppender {
            writer: BufWriter::new(file),
            path: path.clone(),
        };
        info!("streaming csv to {}", path.display());
        Ok(Self::spawn(appender, path, queue_depth))
    }

    fn spawn<C>(writer: C, path: PathBuf, queue_depth: usize) -> Self
    where
        C: Component<InData = String, OutData = io::Result<usize>> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(queue_depth.max(1));
        let (result_tx, results) = mpsc::channel();
        let handle = run_component(Box::new(writer), rx, result_tx);

        Self {
            tx: Some(tx),
            results,
            handle: Some(handle),
            path,
            bytes_written: 0,
            dropped: 0,
            first_error: None,
        }
    }

    /// Queue `text` for writing. Never blocks.
    pub fn submit(&mut self, text: String) {
        self.collect_results();
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!(
                    "export queue full, dropped csv chunk ({} so far)",
                    self.dropped
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("export writer for {} is gone", self.path.display());
                self.tx = None;
            }
        }
    }

    fn collect_results(&mut self) {
        for result in self.results.try_iter() {
            match result {
                Ok(n) => self.bytes_written += n,
                Err(e) => {
                    warn!("writing {} failed: {}", self.path.display(), e);
                    self.first_error.get_or_insert(e);
                }
            }
        }
    }

    /// Pieces of text thrown away because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Bytes the writer has confirmed so far.
    pub fn bytes_written(&mut self) -> usize {
        self.collect_results();
        self.bytes_written
    }

    /// The file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the queue, wait for everything queued to hit the disk, and
    /// return the file's path.
    pub fn finish(mut self) -> Result<PathBuf, EmgError> {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("export writer thread panicked");
                return Err(EmgError::ChannelClosed);
            }
        }
        self.collect_results();
        match self.first_error.take() {
            Some(e) => Err(e.into()),
            None => Ok(self.path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::serialize_incremental;
    use crate::protocol::SamplePacket;
    use std::{thread, time::Duration};
    use tempfile::tempdir;

    /// Holds every write until `gate` is released or dropped.
    struct GatedWriter {
        gate: Receiver<()>,
    }

    impl Component for GatedWriter {
        type InData = String;
        type OutData = io::Result<usize>;

        fn convert(&mut self, input: String) -> io::Result<usize> {
            let _ = self.gate.recv();
            Ok(input.len())
        }

        fn finalize(&mut self) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    impl fmt::Display for GatedWriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "GatedWriter")
        }
    }

    /// Dies on the first write.
    struct BrokenWriter;

    impl Component for BrokenWriter {
        type InData = String;
        type OutData = io::Result<usize>;

        fn convert(&mut self, _: String) -> io::Result<usize> {
            panic!("disk on fire");
        }

        fn finalize(&mut self) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    impl fmt::Display for BrokenWriter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "BrokenWriter")
        }
    }

    #[test]
    fn file_exporter_writes_and_creates_dirs() {
        let dir = tempdir().unwrap();
        let mut exporter = FileExporter::new(dir.path().join("nested"));

        let path = exporter.write_text("a.csv", "timestamp,value\n").unwrap();
        assert_eq!(path, dir.path().join("nested").join("a.csv"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "timestamp,value\n");
        assert!(exporter.share(&path).is_ok());
    }

    #[test]
    fn worker_appends_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("live.csv");
        let mut worker = ExportWorker::start(&path, 16).unwrap();

        let mut expected = String::new();
        for n in 0..5u32 {
            let packet = SamplePacket::new(n * 100, vec![n as i16; 3]);
            let text = serialize_incremental(&packet, 215.0);
            expected.push_str(&text);
            worker.submit(text);
        }

        assert_eq!(worker.finish().unwrap(), path);
        assert_eq!(fs::read_to_string(&path).unwrap(), expected);
    }

    #[test]
    fn nothing_submitted_leaves_an_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let worker = ExportWorker::start(&path, 1).unwrap();
        assert_eq!(worker.dropped(), 0);
        worker.finish().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (release, gate) = mpsc::channel();
        let mut worker = ExportWorker::spawn(GatedWriter { gate }, PathBuf::from("gated.csv"), 1);

        // One piece can sit in the writer and one in the queue, the rest
        // must be dropped. A blocking submit would hang here.
        for n in 0..10 {
            worker.submit(format!("{},{}\n", n, n));
        }
        assert!(worker.dropped() >= 8);

        drop(release);
        assert_eq!(worker.finish().unwrap(), PathBuf::from("gated.csv"));
    }

    #[test]
    fn dead_writer_stops_accepting_text() {
        let mut worker = ExportWorker::spawn(BrokenWriter, PathBuf::from("broken.csv"), 4);
        worker.submit("0,0\n".to_owned());

        while !worker.handle.as_ref().is_some_and(|h| h.is_finished()) {
            thread::sleep(Duration::from_millis(1));
        }

        worker.submit("1,1\n".to_owned());
        assert!(worker.tx.is_none());
        worker.submit("2,2\n".to_owned());
        assert_eq!(worker.dropped(), 0);
        assert!(matches!(worker.finish(), Err(EmgError::ChannelClosed)));
    }
}
