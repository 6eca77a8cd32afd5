//! Screen capture and button location
//!
//! Captures the primary monitor with xcap and searches it for the target
//! image. Returned rectangles are in global screen coordinates.

use tracing::debug;
use xcap::Monitor;

use crate::asset::TargetImage;
use crate::matching::{find_template, MatchOptions};
use crate::AutoAxeError;

/// A point in global screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A matched region in global screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Geometric center, rounded down
    pub fn center(&self) -> Point {
        Point {
            x: self.x + (self.width / 2) as i32,
            y: self.y + (self.height / 2) as i32,
        }
    }
}

/// Trait for screen search implementations
pub trait ScreenLocator {
    /// Capture the screen and return the best region matching `target` with
    /// a score of at least `threshold`
    fn locate(
        &mut self,
        target: &TargetImage,
        threshold: f32,
        grayscale: bool,
    ) -> Result<Option<Rect>, AutoAxeError>;
}

/// Locator backed by xcap screen capture
pub struct XcapLocator {
    pyramid_factor: u32,
}

impl XcapLocator {
    /// Create a locator, verifying that a monitor can be enumerated
    pub fn new(pyramid_factor: u32) -> Result<Self, AutoAxeError> {
        let locator = Self { pyramid_factor };
        locator.primary_monitor()?;
        Ok(locator)
    }

    fn primary_monitor(&self) -> Result<Monitor, AutoAxeError> {
        let monitors = Monitor::all().map_err(|e| AutoAxeError::Capture(e.to_string()))?;
        let primary = monitors
            .iter()
            .position(|m| m.is_primary().unwrap_or(false))
            .unwrap_or(0);
        monitors
            .into_iter()
            .nth(primary)
            .ok_or_else(|| AutoAxeError::Capture("no monitor found".to_string()))
    }
}

impl ScreenLocator for XcapLocator {
    fn locate(
        &mut self,
        target: &TargetImage,
        threshold: f32,
        grayscale: bool,
    ) -> Result<Option<Rect>, AutoAxeError> {
        let monitor = self.primary_monitor()?;
        let origin_x = monitor.x().map_err(|e| AutoAxeError::Capture(e.to_string()))?;
        let origin_y = monitor.y().map_err(|e| AutoAxeError::Capture(e.to_string()))?;
        let screen = monitor
            .capture_image()
            .map_err(|e| AutoAxeError::Capture(e.to_string()))?;

        let options = MatchOptions {
            threshold,
            grayscale,
            pyramid_factor: self.pyramid_factor,
        };
        let (width, height) = target.dimensions();

        Ok(find_template(&screen, target.rgba(), &options).map(|found| {
            debug!("Match score {:.3} at ({}, {})", found.score, found.x, found.y);
            Rect::new(
                origin_x + found.x as i32,
                origin_y + found.y as i32,
                width,
                height,
            )
        }))
    }
}
