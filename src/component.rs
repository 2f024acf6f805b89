//! Defines the Component trait, the shape of every threaded stage hanging off
//! the decode path. A stage consumes values from one channel, converts them
//! and passes the results on, so slow consumers (the preview, the export
//! file) never hold up the chunk-arrival path.

use log::{info, warn};
use std::fmt;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Something that went wrong while a stage was shutting down.
#[derive(Debug)]
pub enum ComponentError {
    /// Flushing or closing an output failed.
    Io(std::io::Error),
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentError::Io(error) => write!(f, "io error: {}", error),
        }
    }
}

impl std::error::Error for ComponentError {}

impl From<std::io::Error> for ComponentError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

///
/// A stage downstream of the decoder. Anything that should run off the
/// chunk-arrival path implements Component so it can be spawned with
/// [run_component].
///
pub trait Component: fmt::Display {
    /// What the stage receives
    type InData;
    /// What the stage produces
    type OutData;

    /// Converts one input into one output
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up once the input channel has closed
    fn finalize(&mut self) -> Result<(), ComponentError>;
}

/// Runs the given Component on its own thread. Every value received on
/// `input` is converted and sent to `output`. When `input` closes the
/// component is finalized and the thread exits.
pub fn run_component<C: Component + Send + 'static>(
    mut component: Box<C>,
    input: Receiver<<C as Component>::InData>,
    output: Sender<<C as Component>::OutData>,
) -> JoinHandle<()>
where
    <C as Component>::InData: Send + 'static,
    <C as Component>::OutData: Send + 'static,
{
    thread::spawn(move || {
        let mut output = Some(output);
        while let Ok(data) = input.recv() {
            let out_data = component.convert(data);
            // Nobody listening is fine, keep draining the input.
            if let Some(tx) = &output {
                if tx.send(out_data).is_err() {
                    warn!("{} : output receiver hung up.", component);
                    output = None;
                }
            }
        }

        if let Err(component_error) = component.finalize() {
            warn!("{} : error during terminating : {}.", component, component_error);
        }
        info!("{} : terminated.", component);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    /// Adds one to everything it sees
    struct MockComponent {
        finalized: Sender<()>,
    }

    impl Component for MockComponent {
        type InData = i32;
        type OutData = i32;

        fn convert(&mut self, input: i32) -> i32 {
            input + 1
        }

        fn finalize(&mut self) -> Result<(), ComponentError> {
            let _ = self.finalized.send(());
            Ok(())
        }
    }

    impl fmt::Display for MockComponent {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "MockComponent")
        }
    }

    #[test]
    fn test_mock_component() {
        let (done_tx, _done_rx) = channel();
        let (test_tx, block_rx) = channel::<i32>();
        let (block_tx, test_rx) = channel::<i32>();

        run_component(
            Box::new(MockComponent { finalized: done_tx }),
            block_rx,
            block_tx,
        );

        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(1));
    }

    #[test]
    fn test_chained_component() {
        let (done_tx, _done_rx) = channel();
        let (test_tx, block_a_rx) = channel::<i32>();
        let (block_a_tx, block_b_rx) = channel::<i32>();
        let (block_b_tx, test_rx) = channel::<i32>();

        run_component(
            Box::new(MockComponent {
                finalized: done_tx.clone(),
            }),
            block_a_rx,
            block_a_tx,
        );
        run_component(
            Box::new(MockComponent { finalized: done_tx }),
            block_b_rx,
            block_b_tx,
        );

        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(2));
    }

    #[test]
    fn finalizes_when_input_closes_even_without_listener() {
        let (done_tx, done_rx) = channel();
        let (test_tx, block_rx) = channel::<i32>();
        let (block_tx, test_rx) = channel::<i32>();
        drop(test_rx);

        let handle = run_component(
            Box::new(MockComponent { finalized: done_tx }),
            block_rx,
            block_tx,
        );

        test_tx.send(1).unwrap();
        test_tx.send(2).unwrap();
        drop(test_tx);

        handle.join().unwrap();
        assert_eq!(done_rx.recv(), Ok(()));
    }
}
