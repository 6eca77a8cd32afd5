//! The automation loop
//!
//! Every iteration polls the interrupt flag and the exit hotkey first, then
//! tries to click the button. A click is followed by a cooldown; a miss by
//! holding the fallback key and a longer wait.
//!
//! Detection and injection failures are reported as [`ClickOutcome`]
//! variants and never stop the loop. Only losing the hotkey source ends it
//! with [`StopReason::Failed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::asset::TargetImage;
use crate::config::Config;
use crate::hotkey::HotkeyState;
use crate::input_simulator::InputInjector;
use crate::screen::{Point, ScreenLocator};
use crate::AutoAxeError;

/// Press/release cycles per click
const CLICK_CYCLES: usize = 2;

/// Granularity of interruptible sleeps
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Trait for the loop's waits
pub trait Pacer {
    /// Wait for `duration`. Returns false if the wait was cut short by an
    /// interrupt.
    fn pause(&mut self, duration: Duration) -> bool;
}

/// Sleeps in short slices, returning early once the running flag clears
pub struct InterruptiblePacer {
    running: Arc<AtomicBool>,
}

impl InterruptiblePacer {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self { running }
    }
}

impl Pacer for InterruptiblePacer {
    fn pause(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

/// Why the loop ended
#[derive(Debug)]
pub enum StopReason {
    /// Exit hotkey observed
    Hotkey,
    /// Interrupt signal received
    Interrupted,
    /// Unrecoverable failure
    Failed(AutoAxeError),
}

/// Result of one match-and-click attempt
#[derive(Debug)]
pub enum ClickOutcome {
    Clicked(Point),
    NotFound,
    DetectionFailed(AutoAxeError),
    InjectionFailed(AutoAxeError),
}

impl ClickOutcome {
    pub fn is_clicked(&self) -> bool {
        matches!(self, ClickOutcome::Clicked(_))
    }
}

/// Result of one loop iteration
#[derive(Debug)]
pub enum Step {
    /// Button clicked, cooldown done
    Clicked,
    /// Fallback key pressed, wait done
    FellBack,
    /// Loop must stop
    Stop(StopReason),
}

/// Process-wide state of a run
#[derive(Debug)]
pub struct Session {
    running: Arc<AtomicBool>,
    pub iterations: u64,
    pub clicks: u64,
    pub fallbacks: u64,
    /// Set once the loop has stopped
    pub stop_reason: Option<StopReason>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            iterations: 0,
            clicks: 0,
            fallbacks: 0,
            stop_reason: None,
        }
    }

    /// Flag shared with the signal handler and the pacer
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// The scan / click / fallback loop
pub struct Automation {
    config: Config,
    target: TargetImage,
    locator: Box<dyn ScreenLocator>,
    injector: Box<dyn InputInjector>,
    hotkey: Box<dyn HotkeyState>,
    pacer: Box<dyn Pacer>,
    session: Session,
}

impl Automation {
    pub fn new(
        config: Config,
        target: TargetImage,
        locator: Box<dyn ScreenLocator>,
        injector: Box<dyn InputInjector>,
        hotkey: Box<dyn HotkeyState>,
        pacer: Box<dyn Pacer>,
        session: Session,
    ) -> Self {
        Self {
            config,
            target,
            locator,
            injector,
            hotkey,
            pacer,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the hotkey, an interrupt or a fatal failure. The reason is
    /// recorded on the returned session.
    pub fn run(&mut self) -> &Session {
        loop {
            if let Step::Stop(reason) = self.step() {
                self.session.stop_reason = Some(reason);
                return &self.session;
            }
        }
    }

    /// Run a single iteration
    pub fn step(&mut self) -> Step {
        if !self.session.is_running() {
            info!("Script interrupted by user");
            return Step::Stop(StopReason::Interrupted);
        }

        match self.hotkey.is_pressed() {
            Ok(true) => {
                info!("User pressed {:?} key, exiting", self.config.exit_key);
                return Step::Stop(StopReason::Hotkey);
            }
            Ok(false) => {}
            Err(e) => {
                error!("An error occurred: {}", e);
                return Step::Stop(StopReason::Failed(e));
            }
        }

        self.session.iterations += 1;
        info!("Looking for 'Play Again' button...");

        if self.match_and_click().is_clicked() {
            self.session.clicks += 1;
            if !self.pacer.pause(self.config.cooldown) {
                return Step::Stop(StopReason::Interrupted);
            }
            return Step::Clicked;
        }

        if let Err(e) = self.press_fallback_key() {
            error!("Fallback key press failed: {}", e);
        }
        self.session.fallbacks += 1;
        if !self.pacer.pause(self.config.fallback_delay) {
            return Step::Stop(StopReason::Interrupted);
        }
        Step::FellBack
    }

    /// Find the button and click its center twice
    pub fn match_and_click(&mut self) -> ClickOutcome {
        let located = self
            .locator
            .locate(&self.target, self.config.confidence, self.config.grayscale);

        let rect = match located {
            Ok(Some(rect)) => rect,
            Ok(None) => {
                info!("Button not found");
                return ClickOutcome::NotFound;
            }
            Err(e) => {
                error!("Error finding button: {}", e);
                return ClickOutcome::DetectionFailed(e);
            }
        };

        let center = rect.center();
        match self.double_click(center) {
            Ok(()) => {
                info!("Successfully clicked button at ({}, {})", center.x, center.y);
                ClickOutcome::Clicked(center)
            }
            Err(e) => {
                error!("Error clicking button at ({}, {}): {}", center.x, center.y, e);
                ClickOutcome::InjectionFailed(e)
            }
        }
    }

    fn double_click(&mut self, center: Point) -> Result<(), AutoAxeError> {
        self.injector.move_to(center)?;
        for cycle in 0..CLICK_CYCLES {
            if cycle > 0 && !self.pacer.pause(self.config.double_click_gap) {
                break;
            }
            self.injector.button_down()?;
            // Release even when interrupted.
            let completed = self.pacer.pause(self.config.click_hold);
            self.release_button()?;
            if !completed {
                break;
            }
        }
        Ok(())
    }

    /// Release the button, retrying once so it is not left held
    fn release_button(&mut self) -> Result<(), AutoAxeError> {
        let Err(first) = self.injector.button_up() else {
            return Ok(());
        };
        warn!("Button release failed, retrying: {}", first);
        if let Err(e) = self.injector.button_up() {
            error!("Button release retry failed: {}", e);
        }
        Err(first)
    }

    /// Hold the fallback key for the configured duration
    pub fn press_fallback_key(&mut self) -> Result<(), AutoAxeError> {
        let key = self.config.fallback_key;
        let hold = self.config.hold_duration;
        info!("Pressing {:?} key for {:.1} seconds", key, hold.as_secs_f32());

        self.injector.key_down(key)?;
        self.pacer.pause(hold);
        self.injector.key_up(key)?;

        info!("Released {:?} key", key);
        Ok(())
    }
}
