//! Command model - the canonical intent passed from input sources to actuation
//!
//! Commands travel by name so that every source (gesture, voice, config) goes
//! through the same allow-list check. The name is resolved to a [`CommandKind`]
//! only when the executor dispatches it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type Payload = BTreeMap<String, Value>;

/// Where a command originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    Gesture,
    Voice,
    Cli,
    Test,
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSource::Gesture => write!(f, "gesture"),
            CommandSource::Voice => write!(f, "voice"),
            CommandSource::Cli => write!(f, "cli"),
            CommandSource::Test => write!(f, "test"),
        }
    }
}

/// Screen anchor targets for the `mouse.move.*` family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Every command the executor knows how to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    MouseMove,
    MouseMoveTo(Anchor),
    ClickLeft,
    ClickRight,
    DoubleClick,
    ScrollUp,
    ScrollDown,
    VolumeUp,
    VolumeDown,
    MuteToggle,
    Lock,
}

impl CommandKind {
    pub const ALL: [CommandKind; 15] = [
        CommandKind::MouseMove,
        CommandKind::MouseMoveTo(Anchor::Center),
        CommandKind::MouseMoveTo(Anchor::TopLeft),
        CommandKind::MouseMoveTo(Anchor::TopRight),
        CommandKind::MouseMoveTo(Anchor::BottomLeft),
        CommandKind::MouseMoveTo(Anchor::BottomRight),
        CommandKind::ClickLeft,
        CommandKind::ClickRight,
        CommandKind::DoubleClick,
        CommandKind::ScrollUp,
        CommandKind::ScrollDown,
        CommandKind::VolumeUp,
        CommandKind::VolumeDown,
        CommandKind::MuteToggle,
        CommandKind::Lock,
    ];

    /// Resolve an external command name
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "mouse.move" => CommandKind::MouseMove,
            "mouse.move.center" => CommandKind::MouseMoveTo(Anchor::Center),
            "mouse.move.top_left" => CommandKind::MouseMoveTo(Anchor::TopLeft),
            "mouse.move.top_right" => CommandKind::MouseMoveTo(Anchor::TopRight),
            "mouse.move.bottom_left" => CommandKind::MouseMoveTo(Anchor::BottomLeft),
            "mouse.move.bottom_right" => CommandKind::MouseMoveTo(Anchor::BottomRight),
            "mouse.click.left" => CommandKind::ClickLeft,
            "mouse.click.right" => CommandKind::ClickRight,
            "mouse.double_click" => CommandKind::DoubleClick,
            "mouse.scroll.up" => CommandKind::ScrollUp,
            "mouse.scroll.down" => CommandKind::ScrollDown,
            "system.volume.up" => CommandKind::VolumeUp,
            "system.volume.down" => CommandKind::VolumeDown,
            "system.mute.toggle" => CommandKind::MuteToggle,
            "system.lock" => CommandKind::Lock,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::MouseMove => "mouse.move",
            CommandKind::MouseMoveTo(Anchor::Center) => "mouse.move.center",
            CommandKind::MouseMoveTo(Anchor::TopLeft) => "mouse.move.top_left",
            CommandKind::MouseMoveTo(Anchor::TopRight) => "mouse.move.top_right",
            CommandKind::MouseMoveTo(Anchor::BottomLeft) => "mouse.move.bottom_left",
            CommandKind::MouseMoveTo(Anchor::BottomRight) => "mouse.move.bottom_right",
            CommandKind::ClickLeft => "mouse.click.left",
            CommandKind::ClickRight => "mouse.click.right",
            CommandKind::DoubleClick => "mouse.double_click",
            CommandKind::ScrollUp => "mouse.scroll.up",
            CommandKind::ScrollDown => "mouse.scroll.down",
            CommandKind::VolumeUp => "system.volume.up",
            CommandKind::VolumeDown => "system.volume.down",
            CommandKind::MuteToggle => "system.mute.toggle",
            CommandKind::Lock => "system.lock",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single intent. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub name: String,
    pub source: CommandSource,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl Command {
    pub fn new(name: impl Into<String>, source: CommandSource) -> Self {
        Self {
            name: name.into(),
            source,
            payload: Payload::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn of(kind: CommandKind, source: CommandSource) -> Self {
        Self::new(kind.name(), source)
    }

    /// Derived copy with `extra` merged over the existing payload
    pub fn with_payload<K, I>(&self, extra: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut payload = self.payload.clone();
        for (key, value) in extra {
            payload.insert(key.into(), value);
        }
        Self {
            name: self.name.clone(),
            source: self.source,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_name(&self.name)
    }
}
