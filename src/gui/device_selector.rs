use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
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

/// What a key press asks the selector to do next.
#[derive(Debug, PartialEq, Eq)]
enum PickerAction {
    Stay,
    Rescan,
    Pick(PathBuf),
    Quit,
}

/// The port list and cursor, kept apart from the terminal so the key
/// handling can be tested.
#[derive(Debug, Default)]
struct PortPicker {
    ports: Vec<PathBuf>,
    cursor: usize,
}

impl PortPicker {
    fn new(ports: Vec<PathBuf>) -> Self {
        Self { ports, cursor: 0 }
    }

    /// Swap in a fresh scan. The cursor follows the port it was on if that
    /// port is still there.
    fn replace_ports(&mut self, ports: Vec<PathBuf>) {
        let current = self.ports.get(self.cursor).cloned();
        self.cursor = current
            .and_then(|p| ports.iter().position(|q| *q == p))
            .unwrap_or(0);
        self.ports = ports;
    }

    fn selected(&self) -> Option<usize> {
        (!self.ports.is_empty()).then_some(self.cursor)
    }

    fn handle(&mut self, key: KeyCode) -> PickerAction {
        let n_ports = self.ports.len();
        match key {
            KeyCode::Down if n_ports > 0 => {
                self.cursor = (self.cursor + 1) % n_ports;
                PickerAction::Stay
            }
            KeyCode::Up if n_ports > 0 => {
                self.cursor = (self.cursor + n_ports - 1) % n_ports;
                PickerAction::Stay
            }
            KeyCode::Enter => match self.ports.get(self.cursor) {
                Some(port) => PickerAction::Pick(port.clone()),
                None => PickerAction::Stay,
            },
            KeyCode::Char('r') | KeyCode::Char('R') => PickerAction::Rescan,
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => PickerAction::Quit,
            _ => PickerAction::Stay,
        }
    }
}

/// Lets the user pick the serial port of the EMG device. `scan` lists the
/// ports and is called again whenever the user asks for a rescan, e.g.
/// after pairing the device. Returns `None` if the user quits.
pub fn device_selector<R>(mut scan: R) -> Result<Option<PathBuf>, GuiError>
where
    R: FnMut() -> Vec<PathBuf>,
{
    let mut picker = PortPicker::new(scan());

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut list_state = ListState::default();
    let picked = loop {
        let title = Title::from(" Select EMG Device ".cyan().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".cyan().bold(),
            " Connect ".into(),
            "<Enter>".cyan().bold(),
            " Rescan ".into(),
            "<R>".cyan().bold(),
            " Quit ".into(),
            "<Q> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);

        list_state.select(picker.selected());
        if picker.ports.is_empty() {
            let hint = Paragraph::new(" No serial ports found. Pair the device, then press R.")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            terminal.draw(|frame| frame.render_widget(hint, frame.size()))?;
        } else {
            let list = List::new(picker.ports.iter().map(|p| p.to_string_lossy()))
                .style(Style::default().fg(Color::White))
                .highlight_symbol(">>")
                .highlight_style(Style::default().fg(Color::Cyan))
                .block(block);
            terminal.draw(|frame| {
                frame.render_stateful_widget(list, frame.size(), &mut list_state)
            })?;
        }

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match picker.handle(key.code) {
                    PickerAction::Stay => {}
                    PickerAction::Rescan => picker.replace_ports(scan()),
                    PickerAction::Pick(port) => break Some(port),
                    PickerAction::Quit => break None,
                }
            }
        }
    };

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(picked)
}
