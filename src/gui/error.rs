use std::{error::Error, fmt::Display, sync::mpsc};

/// Errors from the terminal screens.
#[derive(Debug)]
pub enum GuiError {
    /// Drawing to or reading from the terminal failed
    IOError(std::io::Error),
    /// The worker thread stopped listening
    MPSCSendError,
    /// The worker thread went away without a result
    MPSCRecvError(mpsc::RecvError),
    /// The worker thread panicked
    JoinError,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#?}", self)
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl<T> From<mpsc::SendError<T>> for GuiError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::MPSCSendError
    }
}

impl From<mpsc::RecvError> for GuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}

/// A screen that failed part way. Carries whatever state could be taken
/// back from the worker so the caller can still shut things down.
pub struct Interrupted<T> {
    /// The worker's last state, `None` if the worker panicked
    pub state: Option<T>,
    /// What went wrong
    pub error: GuiError,
}
