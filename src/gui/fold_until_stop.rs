use std::{
    io::stdout,
    sync::mpsc::{self, Receiver, Sender},
    thread::{spawn, JoinHandle},
    time::Duration,
};

use crate::gui::error::{GuiError, Interrupted};

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

enum ThreadMessage {
    Stop,
}

/// The thread that keeps folding while the screen is up.
struct FoldWorker<T> {
    stop_tx: Sender<ThreadMessage>,
    res_rx: Receiver<T>,
    status_rx: Receiver<Vec<String>>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> FoldWorker<T> {
    fn spawn<F, S>(init: T, mut f: F, status: S) -> Self
    where
        F: FnMut(T) -> T + Send + 'static,
        S: Fn(&T) -> Vec<String> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (res_tx, res_rx) = mpsc::channel();
        let (status_tx, status_rx) = mpsc::channel();

        let handle = spawn(move || {
            let mut val = init;

            loop {
                val = f(val);
                // The screen may already be gone, that's fine.
                let _ = status_tx.send(status(&val));
                if let Ok(ThreadMessage::Stop) = stop_rx.try_recv() {
                    // Only fails if the gui side has already given up.
                    let _ = res_tx.send(val);
                    break;
                }
            }
        });

        Self {
            stop_tx,
            res_rx,
            status_rx,
            handle,
        }
    }

    /// Stop folding and take the state back. `None` if the fold panicked.
    fn finish(self) -> Option<T> {
        let state = match self.stop_tx.send(ThreadMessage::Stop) {
            Ok(()) => self.res_rx.recv().ok(),
            Err(_) => None,
        };
        let _ = self.handle.join();
        state
    }
}

/// Generates a gui that runs a function until the user presses a key.
///
/// The function can be thought of as a recursive fold. `init` contains the
/// inital state of the loop, then `f` is called on the inital state to produce
/// a new state, and then `f` is called on that new state, and so on until the
/// user indicates that this should stop. After every step `status` renders
/// the state as lines of text for the screen.
///
/// If the terminal fails the fold is still stopped and its state handed
/// back inside [Interrupted].
pub fn fold_until_stop<F, S, T>(
    heading: &str,
    init: T,
    f: F,
    status: S,
) -> Result<T, Interrupted<T>>
where
    F: FnMut(T) -> T + Send + 'static,
    S: Fn(&T) -> Vec<String> + Send + 'static,
    T: Send + 'static,
{
    if let Err(error) = enter_screen() {
        let _ = leave_screen();
        return Err(Interrupted {
            state: Some(init),
            error,
        });
    }

    let worker = FoldWorker::spawn(init, f, status);
    let drawn = draw_until_key(heading, &worker.status_rx);
    let state = worker.finish();
    let restored = leave_screen();

    match (state, drawn.and(restored)) {
        (Some(state), Ok(())) => Ok(state),
        (None, Ok(())) => Err(Interrupted {
            state: None,
            error: GuiError::JoinError,
        }),
        (state, Err(error)) => Err(Interrupted { state, error }),
    }
}

fn enter_screen() -> Result<(), GuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(())
}

fn leave_screen() -> Result<(), GuiError> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn draw_until_key(heading: &str, status_rx: &Receiver<Vec<String>>) -> Result<(), GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut lines: Vec<String> = Vec::new();
    loop {
        if let Some(latest) = status_rx.try_iter().last() {
            lines = latest;
        }

        let title = Title::from(Span::from(format!(" {} ", heading)).cyan().bold());
        let instructions = Title::from(Line::from(vec![
            " Stop ".into(),
            "<Any key> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let text = Paragraph::new(
            lines
                .iter()
                .map(|l| Line::from(l.as_str()))
                .collect::<Vec<_>>(),
        );
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text.block(block), area);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_hands_back_its_state() {
        let worker = FoldWorker::spawn(0u64, |n| n + 1, |n| vec![n.to_string()]);
        let first = worker.status_rx.recv().unwrap();
        assert_eq!(first, vec!["1".to_owned()]);

        let state = worker.finish().unwrap();
        assert!(state >= 1);
    }

    #[test]
    fn worker_state_survives_a_screen_that_never_drew() {
        // Stopping straight away, as the error path does, still returns
        // the state rather than leaving it on the thread.
        let worker = FoldWorker::spawn(vec![7u8], |v| v, |_| Vec::new());
        assert_eq!(worker.finish(), Some(vec![7u8]));
    }

    #[test]
    fn panicking_fold_gives_no_state() {
        let worker = FoldWorker::spawn(
            0u8,
            |n: u8| if n == 0 { panic!("fold broke") } else { n },
            |_| Vec::new(),
        );
        assert_eq!(worker.finish(), None);
    }
}
