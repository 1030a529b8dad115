//! Observability records fanned out by the event bus

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventType {
    #[serde(rename = "startup")]
    Startup,
    #[serde(rename = "shutdown")]
    Shutdown,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "auth.success")]
    AuthSuccess,
    #[serde(rename = "auth.failure")]
    AuthFailure,
    #[serde(rename = "gesture.frame")]
    GestureFrame,
    #[serde(rename = "gesture.command")]
    GestureCommand,
    #[serde(rename = "voice.command")]
    VoiceCommand,
    #[serde(rename = "command.executed")]
    CommandExecuted,
    #[serde(rename = "command.blocked")]
    CommandBlocked,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Startup => "startup",
            EventType::Shutdown => "shutdown",
            EventType::Heartbeat => "heartbeat",
            EventType::AuthSuccess => "auth.success",
            EventType::AuthFailure => "auth.failure",
            EventType::GestureFrame => "gesture.frame",
            EventType::GestureCommand => "gesture.command",
            EventType::VoiceCommand => "voice.command",
            EventType::CommandExecuted => "command.executed",
            EventType::CommandBlocked => "command.blocked",
            EventType::Warning => "warning",
            EventType::Error => "error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    pub event_type: EventType,
    pub message: String,
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            context: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builder-style context entry
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}
