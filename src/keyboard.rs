// Keyboard stand-in for the user button and bumper: B/space = button, C = bump, Q = quit
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::{info, warn};

use crate::button::ButtonLatch;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Button,
    Bump,
    Quit,
}

/// Map a key event to an action. Releases are ignored.
pub fn action_for(key: &KeyEvent) -> Option<KeyAction> {
    let pressed = key.kind == KeyEventKind::Press || key.kind == KeyEventKind::Repeat;
    if !pressed {
        return None;
    }
    match key.code {
        // raw mode swallows SIGINT, so Ctrl-C arrives as a key
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(KeyAction::Quit),
        KeyCode::Char('b') | KeyCode::Char(' ') => Some(KeyAction::Button),
        KeyCode::Char('c') => Some(KeyAction::Bump),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Raw-mode key reader on its own thread. Raw mode is restored on drop.
pub struct KeyboardInput {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardInput {
    pub fn start(button: ButtonLatch, bump: ButtonLatch, quit: Arc<AtomicBool>) -> std::io::Result<Self> {
        enable_raw_mode()?;
        info!("Keys: B/space = button, C = bump, Q = quit");

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                match poll_action() {
                    Ok(Some(KeyAction::Button)) => button.press(),
                    Ok(Some(KeyAction::Bump)) => bump.press(),
                    Ok(Some(KeyAction::Quit)) => {
                        quit.store(true, Ordering::Relaxed);
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Keyboard read failed: {}", e);
                        quit.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

fn poll_action() -> std::io::Result<Option<KeyAction>> {
    if event::poll(POLL_INTERVAL)?
        && let Event::Key(key) = event::read()?
    {
        return Ok(action_for(&key));
    }
    Ok(None)
}

impl Drop for KeyboardInput {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}
