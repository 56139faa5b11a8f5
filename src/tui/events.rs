use crate::error::Result;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind, MouseEvent};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Tick,
}

pub struct EventHandler;

impl EventHandler {
    pub fn new() -> Self {
        Self
    }

    /// Waits up to one poll interval; a `Tick` drains background task messages.
    pub fn next_event(&self) -> Result<AppEvent> {
        if !event::poll(POLL_INTERVAL)? {
            return Ok(AppEvent::Tick);
        }

        match event::read()? {
            // Release and repeat events would double every keystroke on Windows
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(AppEvent::Key(key)),
            Event::Mouse(mouse) => Ok(AppEvent::Mouse(mouse)),
            _ => Ok(AppEvent::Tick),
        }
    }
}
