//! OS input actuation
//!
//! The executor talks to a [`MouseKeyboard`] capability set and asks a
//! [`ScreenSize`] provider for the current display bounds. Two backends ship:
//!
//! - [`RecordingActuator`]: records every call, used for dry runs and tests
//! - `DesktopActuator` (feature `os-input`): drives the real pointer and
//!   keyboard through enigo

mod recording;

#[cfg(feature = "os-input")]
mod desktop;

#[cfg(feature = "os-input")]
pub use desktop::DesktopActuator;
pub use recording::RecordingActuator;

use std::fmt;

use crate::error::Result;

/// One actuation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move { x: i32, y: i32 },
    ClickLeft,
    ClickRight,
    DoubleClick,
    Scroll(i32),
    Key(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move { x, y } => write!(f, "move:{},{}", x, y),
            Action::ClickLeft => write!(f, "click:left"),
            Action::ClickRight => write!(f, "click:right"),
            Action::DoubleClick => write!(f, "click:double"),
            Action::Scroll(delta) => write!(f, "scroll:{}", delta),
            Action::Key(name) => write!(f, "key:{}", name),
        }
    }
}

/// Pointer and keyboard capability set
pub trait MouseKeyboard: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> Result<()>;
    fn click_left(&self) -> Result<()>;
    fn click_right(&self) -> Result<()>;
    fn double_click(&self) -> Result<()>;
    /// Positive scrolls up, in wheel units (120 per notch)
    fn scroll(&self, delta: i32) -> Result<()>;
    fn key_press(&self, key: &str) -> Result<()>;

    /// Keys pressed back to back. Backends that can hold modifiers override this.
    fn key_combo(&self, modifiers: &[&str], key: &str) -> Result<()> {
        for modifier in modifiers {
            self.key_press(modifier)?;
        }
        self.key_press(key)
    }
}

pub trait ScreenSize: Send + Sync {
    /// Current (width, height) in pixels
    fn size(&self) -> (u32, u32);
}

/// Screen of a fixed size, for headless runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedScreen {
    pub width: u32,
    pub height: u32,
}

impl FixedScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FixedScreen {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl ScreenSize for FixedScreen {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_rendering() {
        assert_eq!(Action::Move { x: 3, y: -4 }.to_string(), "move:3,-4");
        assert_eq!(Action::DoubleClick.to_string(), "click:double");
        assert_eq!(Action::Scroll(-120).to_string(), "scroll:-120");
        assert_eq!(Action::Key("volumeup".into()).to_string(), "key:volumeup");
    }

    #[test]
    fn test_default_combo_presses_in_order() {
        let recorder = RecordingActuator::new();
        recorder.key_combo(&["win"], "l").unwrap();
        assert_eq!(recorder.rendered(), vec!["key:win", "key:l"]);
    }
}
