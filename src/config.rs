//! Configuration management for AutoAxe

use rdev::Key;
use std::time::Duration;
use tracing::warn;

use crate::input_simulator::InjectorKind;

/// Default file name of the button screenshot
pub const DEFAULT_IMAGE_NAME: &str = "play_again_button.png";

/// Default log file, created in the working directory
pub const DEFAULT_LOG_FILE: &str = "auto_play.log";

/// Configuration for the automation loop
#[derive(Debug, Clone)]
pub struct Config {
    /// File name of the button image to look for
    pub image_name: String,

    /// Minimum similarity (0.0 - 1.0) for a template match
    pub confidence: f32,

    /// Match on a grayscale reduction of the screen
    pub grayscale: bool,

    /// Downscale factor for the coarse search pass (1 disables it)
    pub pyramid_factor: u32,

    /// Key held when the button is not visible
    pub fallback_key: Key,

    /// How long the fallback key is held
    pub hold_duration: Duration,

    /// Wait after a successful click
    pub cooldown: Duration,

    /// Wait after a fallback key press
    pub fallback_delay: Duration,

    /// Time between button down and button up
    pub click_hold: Duration,

    /// Time between the two clicks of the double activation
    pub double_click_gap: Duration,

    /// Key that stops the loop
    pub exit_key: Key,

    /// Input injection backend
    pub injector: InjectorKind,

    /// Re-launch through sudo when not running as root
    pub elevate: bool,

    /// Log file path
    pub log_file: String,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_name: String::from(DEFAULT_IMAGE_NAME),
            confidence: 0.7,
            grayscale: true,
            pyramid_factor: 4,
            fallback_key: Key::KeyX,
            hold_duration: Duration::from_millis(500),
            cooldown: Duration::from_millis(500),
            fallback_delay: Duration::from_secs(1),
            click_hold: Duration::from_millis(50),
            double_click_gap: Duration::from_millis(100),
            exit_key: Key::KeyQ,
            injector: InjectorKind::detect(),
            elevate: false,
            log_file: String::from(DEFAULT_LOG_FILE),
            verbose: false,
        }
    }
}

impl Config {
    /// Default configuration with `AUTOAXE_*` environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup. Invalid values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(image) = lookup("AUTOAXE_IMAGE") {
            self.image_name = image;
        }
        if let Some(raw) = lookup("AUTOAXE_CONFIDENCE") {
            match raw.parse::<f32>() {
                Ok(value) => self = self.with_confidence(value),
                Err(_) => warn!("Ignoring invalid AUTOAXE_CONFIDENCE '{}'", raw),
            }
        }
        if let Some(raw) = lookup("AUTOAXE_BACKEND") {
            match InjectorKind::parse(&raw) {
                Some(kind) => self.injector = kind,
                None => warn!("Ignoring unknown AUTOAXE_BACKEND '{}'", raw),
            }
        }
        if let Some(raw) = lookup("AUTOAXE_ELEVATE") {
            self.elevate = is_truthy(&raw);
        }
        if let Some(raw) = lookup("AUTOAXE_VERBOSE") {
            self.verbose = is_truthy(&raw);
        }
        self
    }

    /// Set the match threshold, clamped to 0.0 - 1.0
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            0.7
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Set the fallback key hold duration
    pub fn with_hold_duration(mut self, hold: Duration) -> Self {
        self.hold_duration = hold;
        self
    }

    /// Set the image file name
    pub fn with_image_name(mut self, name: impl Into<String>) -> Self {
        self.image_name = name.into();
        self
    }

    /// Select the input backend
    pub fn with_injector(mut self, kind: InjectorKind) -> Self {
        self.injector = kind;
        self
    }

    /// Enable verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_the_macro_timings() {
        let config = Config::default();
        assert_eq!(config.confidence, 0.7);
        assert!(config.grayscale);
        assert_eq!(config.hold_duration, Duration::from_millis(500));
        assert_eq!(config.cooldown, Duration::from_millis(500));
        assert_eq!(config.fallback_delay, Duration::from_secs(1));
        assert_eq!(config.fallback_key, Key::KeyX);
        assert_eq!(config.exit_key, Key::KeyQ);
        assert_eq!(config.image_name, "play_again_button.png");
        assert_eq!(config.log_file, "auto_play.log");
    }

    #[test]
    fn overrides_apply_valid_values() {
        let config = Config::default().with_overrides(lookup_from(&[
            ("AUTOAXE_IMAGE", "button.png"),
            ("AUTOAXE_CONFIDENCE", "0.85"),
            ("AUTOAXE_BACKEND", "xtest"),
            ("AUTOAXE_ELEVATE", "yes"),
        ]));
        assert_eq!(config.image_name, "button.png");
        assert!((config.confidence - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.injector, InjectorKind::XTest);
        assert!(config.elevate);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let config = Config::default().with_overrides(lookup_from(&[
            ("AUTOAXE_CONFIDENCE", "very"),
            ("AUTOAXE_BACKEND", "telepathy"),
        ]));
        assert_eq!(config.confidence, 0.7);
        assert_eq!(config.injector, Config::default().injector);
    }

    #[test]
    fn builders_set_fields() {
        let config = Config::default()
            .with_image_name("retry.png")
            .with_hold_duration(Duration::from_millis(250))
            .with_injector(InjectorKind::Ydotool)
            .with_verbose(true);
        assert_eq!(config.image_name, "retry.png");
        assert_eq!(config.hold_duration, Duration::from_millis(250));
        assert_eq!(config.injector, InjectorKind::Ydotool);
        assert!(config.verbose);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Config::default().with_confidence(1.5).confidence, 1.0);
        assert_eq!(Config::default().with_confidence(-0.2).confidence, 0.0);
    }
}
