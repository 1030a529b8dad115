//! Dispatches validated commands to the actuation backend

use serde_json::Value;
use std::sync::Arc;

use crate::actuation::{MouseKeyboard, ScreenSize};
use crate::command::{Anchor, Command, CommandKind, Payload};
use crate::error::{ControlError, Result};

/// Distance kept from the screen edge for corner anchors
const EDGE_MARGIN: i32 = 40;
const DEFAULT_SCROLL: i32 = 120;

pub struct CommandExecutor {
    api: Arc<dyn MouseKeyboard>,
    screen: Arc<dyn ScreenSize>,
}

impl CommandExecutor {
    pub fn new(api: Arc<dyn MouseKeyboard>, screen: Arc<dyn ScreenSize>) -> Self {
        Self { api, screen }
    }

    /// Perform exactly one actuation for `command`
    #[hotpath::measure]
    pub fn execute(&self, command: &Command) -> Result<()> {
        let kind = command
            .kind()
            .ok_or_else(|| ControlError::UnsupportedCommand(command.name.clone()))?;
        let payload = &command.payload;

        match kind {
            CommandKind::MouseMove => self.api.move_to(
                int_field(payload, "screen_x").unwrap_or(0),
                int_field(payload, "screen_y").unwrap_or(0),
            ),
            CommandKind::MouseMoveTo(anchor) => {
                let (x, y) = self.anchor_point(anchor);
                self.api.move_to(x, y)
            }
            CommandKind::ClickLeft => self.api.click_left(),
            CommandKind::ClickRight => self.api.click_right(),
            CommandKind::DoubleClick => self.api.double_click(),
            CommandKind::ScrollUp => self
                .api
                .scroll(int_field(payload, "scroll_delta").unwrap_or(DEFAULT_SCROLL)),
            CommandKind::ScrollDown => self
                .api
                .scroll(int_field(payload, "scroll_delta").unwrap_or(-DEFAULT_SCROLL)),
            CommandKind::VolumeUp => self.api.key_press("volumeup"),
            CommandKind::VolumeDown => self.api.key_press("volumedown"),
            CommandKind::MuteToggle => self.api.key_press("volumemute"),
            CommandKind::Lock => self.api.key_combo(&["win"], "l"),
        }
    }

    fn anchor_point(&self, anchor: Anchor) -> (i32, i32) {
        let (w, h) = self.screen.size();
        let (w, h) = (w as i32, h as i32);
        match anchor {
            Anchor::Center => (w / 2, h / 2),
            Anchor::TopLeft => (EDGE_MARGIN, EDGE_MARGIN),
            Anchor::TopRight => (w - EDGE_MARGIN, EDGE_MARGIN),
            Anchor::BottomLeft => (EDGE_MARGIN, h - EDGE_MARGIN),
            Anchor::BottomRight => (w - EDGE_MARGIN, h - EDGE_MARGIN),
        }
    }
}

/// Integer view of a numeric payload entry; floats truncate toward zero
fn int_field(payload: &Payload, key: &str) -> Option<i32> {
    match payload.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
        _ => None,
    }
}
