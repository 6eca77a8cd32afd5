//! AutoAxe - Play-again macro
//!
//! This library provides components for:
//! - Target image resolution (first existing candidate path wins)
//! - Screen capture and template matching
//! - Input simulation (pointer clicks and held keys)
//! - Global hotkey polling
//! - The automation loop that ties them together

pub mod asset;
pub mod automation;
pub mod config;
pub mod elevation;
pub mod hotkey;
pub mod input_simulator;
pub mod logging;
pub mod matching;
pub mod screen;

pub use asset::{resolve_target_image, TargetImage};
pub use automation::{Automation, ClickOutcome, InterruptiblePacer, Pacer, Session, Step, StopReason};
pub use config::Config;
pub use hotkey::{HotkeyState, HotkeyWatcher};
pub use input_simulator::{create_injector, InjectorKind, InputInjector};
pub use screen::{Point, Rect, ScreenLocator, XcapLocator};

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for AutoAxe
#[derive(Error, Debug)]
pub enum AutoAxeError {
    #[error("Target image not found in any of {} candidate locations", candidates.len())]
    AssetNotFound { candidates: Vec<PathBuf> },

    #[error("Failed to load image: {0}")]
    Image(String),

    #[error("Failed to capture screen: {0}")]
    Capture(String),

    #[error("Failed to access input devices: {0}")]
    InputAccess(String),

    #[error("Failed to send input event: {0}")]
    SendEvent(String),

    #[error("Hotkey listener unavailable: {0}")]
    Hotkey(String),

    #[error("Failed to elevate privileges: {0}")]
    Elevation(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
