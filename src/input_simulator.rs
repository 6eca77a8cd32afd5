//! Input simulation
//!
//! Two backends:
//! - ydotool sends mouse and keyboard events via uinput at the kernel level.
//!   Works on Wayland by bypassing the display server entirely. Requires the
//!   ydotoold daemon: sudo systemctl enable --now ydotoold
//! - XTest fakes input through the X server. Works on X11 and XWayland.

use rdev::Key;
use std::process::Command;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, KEY_PRESS_EVENT, KEY_RELEASE_EVENT,
    MOTION_NOTIFY_EVENT,
};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;

use crate::screen::Point;
use crate::AutoAxeError;

/// Trait for input injection implementations
pub trait InputInjector {
    /// Move the pointer to an absolute screen position
    fn move_to(&mut self, point: Point) -> Result<(), AutoAxeError>;

    /// Press the left mouse button
    fn button_down(&mut self) -> Result<(), AutoAxeError>;

    /// Release the left mouse button
    fn button_up(&mut self) -> Result<(), AutoAxeError>;

    /// Press a key
    fn key_down(&mut self, key: Key) -> Result<(), AutoAxeError>;

    /// Release a key
    fn key_up(&mut self, key: Key) -> Result<(), AutoAxeError>;
}

/// Available injection backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorKind {
    Ydotool,
    XTest,
}

impl InjectorKind {
    /// ydotool under Wayland, XTest otherwise
    pub fn detect() -> Self {
        if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            InjectorKind::Ydotool
        } else {
            InjectorKind::XTest
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ydotool" | "uinput" => Some(InjectorKind::Ydotool),
            "xtest" | "x11" => Some(InjectorKind::XTest),
            _ => None,
        }
    }
}

/// Create the configured injector
pub fn create_injector(kind: InjectorKind) -> Result<Box<dyn InputInjector>, AutoAxeError> {
    match kind {
        InjectorKind::Ydotool => Ok(Box::new(YdotoolInjector::new()?)),
        InjectorKind::XTest => Ok(Box::new(XTestInjector::new()?)),
    }
}

/// Convert rdev Key to a Linux evdev key code
pub fn key_to_code(key: Key) -> Option<u8> {
    let code = match key {
        Key::Escape => 1,
        Key::Num1 => 2,
        Key::Num2 => 3,
        Key::Num3 => 4,
        Key::Num4 => 5,
        Key::Num5 => 6,
        Key::Num6 => 7,
        Key::Num7 => 8,
        Key::Num8 => 9,
        Key::Num9 => 10,
        Key::Num0 => 11,
        Key::Tab => 15,
        Key::KeyQ => 16,
        Key::KeyW => 17,
        Key::KeyE => 18,
        Key::KeyR => 19,
        Key::KeyT => 20,
        Key::KeyY => 21,
        Key::KeyU => 22,
        Key::KeyI => 23,
        Key::KeyO => 24,
        Key::KeyP => 25,
        Key::Return => 28,
        Key::ControlLeft => 29,
        Key::KeyA => 30,
        Key::KeyS => 31,
        Key::KeyD => 32,
        Key::KeyF => 33,
        Key::KeyG => 34,
        Key::KeyH => 35,
        Key::KeyJ => 36,
        Key::KeyK => 37,
        Key::KeyL => 38,
        Key::ShiftLeft => 42,
        Key::KeyZ => 44,
        Key::KeyX => 45,
        Key::KeyC => 46,
        Key::KeyV => 47,
        Key::KeyB => 48,
        Key::KeyN => 49,
        Key::KeyM => 50,
        Key::Alt => 56,
        Key::Space => 57,
        _ => return None,
    };
    Some(code)
}

fn unmapped(key: Key) -> AutoAxeError {
    AutoAxeError::SendEvent(format!("no key code for {:?}", key))
}

/// Get the ydotool socket path of the invoking user
fn get_socket_path() -> String {
    let uid = match std::env::var("SUDO_UID").ok().and_then(|s| s.parse::<u32>().ok()) {
        Some(uid) => uid,
        None => unsafe { libc::getuid() },
    };
    format!("/run/user/{}/.ydotool_socket", uid)
}

/// ydotool button codes: low nibble selects the button, 0x40 = down, 0x80 = up
const LEFT_DOWN: &str = "0x40";
const LEFT_UP: &str = "0x80";

/// Injector that sends synthetic inputs via ydotool
pub struct YdotoolInjector {
    socket_path: String,
}

impl YdotoolInjector {
    /// Create a new YdotoolInjector
    ///
    /// Requires ydotool to be installed and ydotoold daemon running.
    pub fn new() -> Result<Self, AutoAxeError> {
        let output = Command::new("which")
            .arg("ydotool")
            .output()
            .map_err(|e| AutoAxeError::InputAccess(format!("Failed to check for ydotool: {}", e)))?;

        if !output.status.success() {
            return Err(AutoAxeError::InputAccess(
                "ydotool not found. Install it: sudo pacman -S ydotool".to_string(),
            ));
        }

        let socket_path = get_socket_path();
        if !std::path::Path::new(&socket_path).exists() {
            return Err(AutoAxeError::InputAccess(format!(
                "ydotoold socket {} missing. Start it: sudo systemctl enable --now ydotoold",
                socket_path
            )));
        }

        info!("Using ydotool (socket {})", socket_path);
        Ok(Self { socket_path })
    }

    fn run_ydotool(&self, args: &[&str]) -> Result<(), AutoAxeError> {
        let output = Command::new("ydotool")
            .args(args)
            .env("YDOTOOL_SOCKET", &self.socket_path)
            .output()
            .map_err(|e| AutoAxeError::SendEvent(format!("Failed to run ydotool: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AutoAxeError::SendEvent(format!("ydotool failed: {}", stderr)));
        }

        Ok(())
    }

    fn send_key(&self, key: Key, pressed: bool) -> Result<(), AutoAxeError> {
        let code = key_to_code(key).ok_or_else(|| unmapped(key))?;
        debug!("Sending {:?} {} via ydotool (code {})", key, if pressed { "press" } else { "release" }, code);
        let key_arg = format!("{}:{}", code, u8::from(pressed));
        self.run_ydotool(&["key", &key_arg])
    }
}

impl InputInjector for YdotoolInjector {
    fn move_to(&mut self, point: Point) -> Result<(), AutoAxeError> {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        self.run_ydotool(&["mousemove", "--absolute", "-x", &x, "-y", &y])
    }

    fn button_down(&mut self) -> Result<(), AutoAxeError> {
        self.run_ydotool(&["click", LEFT_DOWN])
    }

    fn button_up(&mut self) -> Result<(), AutoAxeError> {
        self.run_ydotool(&["click", LEFT_UP])
    }

    fn key_down(&mut self, key: Key) -> Result<(), AutoAxeError> {
        self.send_key(key, true)
    }

    fn key_up(&mut self, key: Key) -> Result<(), AutoAxeError> {
        self.send_key(key, false)
    }
}

/// X keycodes are evdev codes shifted by 8
const X_KEYCODE_OFFSET: u8 = 8;

const LEFT_BUTTON: u8 = 1;

/// Injector that fakes input through the XTest extension
pub struct XTestInjector {
    conn: RustConnection,
    root: u32,
}

impl XTestInjector {
    /// Connect to the X server and check for XTest
    pub fn new() -> Result<Self, AutoAxeError> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| AutoAxeError::InputAccess(format!("Failed to connect to X11: {}", e)))?;
        let root = conn.setup().roots[screen_num].root;

        let version = conn
            .xtest_get_version(2, 2)
            .map_err(|e| AutoAxeError::InputAccess(format!("XTest unavailable: {}", e)))?
            .reply()
            .map_err(|e| AutoAxeError::InputAccess(format!("XTest unavailable: {}", e)))?;

        info!("Using XTest {}.{}", version.major_version, version.minor_version);
        Ok(Self { conn, root })
    }

    fn fake_input(&self, event_type: u8, detail: u8, x: i16, y: i16) -> Result<(), AutoAxeError> {
        self.conn
            .xtest_fake_input(event_type, detail, x11rb::CURRENT_TIME, self.root, x, y, 0)
            .map_err(|e| AutoAxeError::SendEvent(e.to_string()))?
            .check()
            .map_err(|e| AutoAxeError::SendEvent(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| AutoAxeError::SendEvent(e.to_string()))
    }

    fn keycode(key: Key) -> Result<u8, AutoAxeError> {
        key_to_code(key)
            .map(|code| code + X_KEYCODE_OFFSET)
            .ok_or_else(|| unmapped(key))
    }
}

impl InputInjector for XTestInjector {
    fn move_to(&mut self, point: Point) -> Result<(), AutoAxeError> {
        let x = i16::try_from(point.x)
            .map_err(|_| AutoAxeError::SendEvent(format!("x out of range: {}", point.x)))?;
        let y = i16::try_from(point.y)
            .map_err(|_| AutoAxeError::SendEvent(format!("y out of range: {}", point.y)))?;
        self.fake_input(MOTION_NOTIFY_EVENT, 0, x, y)
    }

    fn button_down(&mut self) -> Result<(), AutoAxeError> {
        self.fake_input(BUTTON_PRESS_EVENT, LEFT_BUTTON, 0, 0)
    }

    fn button_up(&mut self) -> Result<(), AutoAxeError> {
        self.fake_input(BUTTON_RELEASE_EVENT, LEFT_BUTTON, 0, 0)
    }

    fn key_down(&mut self, key: Key) -> Result<(), AutoAxeError> {
        debug!("Sending {:?} press via XTest", key);
        self.fake_input(KEY_PRESS_EVENT, Self::keycode(key)?, 0, 0)
    }

    fn key_up(&mut self, key: Key) -> Result<(), AutoAxeError> {
        debug!("Sending {:?} release via XTest", key);
        self.fake_input(KEY_RELEASE_EVENT, Self::keycode(key)?, 0, 0)
    }
}
