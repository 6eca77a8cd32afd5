//! Global hotkey polling using rdev

use rdev::{listen, Event, EventType, Key};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use tracing::{debug, error, info};

use crate::AutoAxeError;

/// Trait for hotkey state queries
pub trait HotkeyState {
    /// Whether the hotkey is held, or was pressed since the previous query
    fn is_pressed(&mut self) -> Result<bool, AutoAxeError>;
}

/// Press or release of the watched key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyEvent {
    pub pressed: bool,
}

/// Watches one key through a global rdev listener
///
/// The listener runs on its own thread and forwards press/release edges over
/// a channel. Presses are latched until the next query so a tap between
/// polls is not lost.
pub struct HotkeyWatcher {
    receiver: Receiver<HotkeyEvent>,
    held: bool,
}

impl HotkeyWatcher {
    /// Start listening for `key` in a background thread
    pub fn start(key: Key) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _listener_handle = spawn_listener(key, sender);
        Self::from_receiver(receiver)
    }

    /// Build a watcher over an existing event channel
    pub fn from_receiver(receiver: Receiver<HotkeyEvent>) -> Self {
        Self {
            receiver,
            held: false,
        }
    }
}

fn spawn_listener(key: Key, sender: Sender<HotkeyEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        info!("Hotkey listener started for {:?}", key);

        let callback = move |event: Event| {
            let pressed = match event.event_type {
                EventType::KeyPress(k) if k == key => true,
                EventType::KeyRelease(k) if k == key => false,
                _ => return,
            };
            debug!("Hotkey {:?} {}", key, if pressed { "pressed" } else { "released" });

            if let Err(e) = sender.send(HotkeyEvent { pressed }) {
                error!("Failed to send hotkey event: {}", e);
            }
        };

        if let Err(e) = listen(callback) {
            error!("Error in hotkey listener: {:?}", e);
        }
    })
}

impl HotkeyState for HotkeyWatcher {
    fn is_pressed(&mut self) -> Result<bool, AutoAxeError> {
        let mut pressed_since_poll = false;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.held = event.pressed;
                    pressed_since_poll |= event.pressed;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(AutoAxeError::Hotkey("listener disconnected".to_string()));
                }
            }
        }
        Ok(pressed_since_poll || self.held)
    }
}
