//! Spoken phrase handling: the phrase-to-command rule table and the listener
//! seam that feeds it.

use flume::{Receiver, Sender};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::command::{Command, CommandKind, CommandSource, Payload};
use crate::config::VoiceConfig;
use crate::error::{ControlError, Result};

/// One transcribed utterance
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePhrase {
    pub text: String,
    pub confidence: f32,
}

impl VoicePhrase {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
        }
    }
}

/// Example phrases mapped to one command
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRule {
    pub examples: Vec<String>,
    pub command: String,
    pub payload: Payload,
}

impl VoiceRule {
    fn new(examples: &[&str], kind: CommandKind) -> Self {
        Self {
            examples: examples.iter().map(|s| s.to_string()).collect(),
            command: kind.name().to_string(),
            payload: Payload::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    fn matches(&self, normalized: &str) -> bool {
        self.examples.iter().any(|e| normalized.contains(e.as_str()))
    }
}

/// Ordered rule table. The first rule with any example contained in the phrase
/// wins, so specific phrases must come before the general ones they contain.
#[derive(Debug, Clone)]
pub struct VoiceCommandMapper {
    rules: Vec<VoiceRule>,
}

impl Default for VoiceCommandMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceCommandMapper {
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }

    /// Custom phrases from config, ahead of the built-ins
    pub fn with_custom(config: &VoiceConfig) -> Self {
        let mut rules: Vec<VoiceRule> = config
            .custom
            .iter()
            .filter(|c| !c.phrase.trim().is_empty())
            .map(|c| VoiceRule {
                examples: vec![c.phrase.trim().to_lowercase()],
                command: c.command.clone(),
                payload: Payload::new(),
            })
            .collect();
        rules.extend(builtin_rules());
        Self { rules }
    }

    pub fn rules(&self) -> &[VoiceRule] {
        &self.rules
    }

    pub fn to_command(&self, text: &str) -> Option<Command> {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(&normalized))
            .map(|rule| {
                Command::new(rule.command.clone(), CommandSource::Voice)
                    .with_payload(rule.payload.clone())
            })
    }
}

fn builtin_rules() -> Vec<VoiceRule> {
    use crate::command::Anchor;

    vec![
        VoiceRule::new(&["scroll fast up"], CommandKind::ScrollUp).with("scroll_delta", json!(240)),
        VoiceRule::new(&["scroll fast down"], CommandKind::ScrollDown)
            .with("scroll_delta", json!(-240)),
        VoiceRule::new(&["volume up"], CommandKind::VolumeUp),
        VoiceRule::new(&["volume down"], CommandKind::VolumeDown),
        VoiceRule::new(&["unmute", "mute"], CommandKind::MuteToggle),
        VoiceRule::new(&["left click"], CommandKind::ClickLeft),
        VoiceRule::new(&["right click"], CommandKind::ClickRight),
        VoiceRule::new(&["double click"], CommandKind::DoubleClick),
        VoiceRule::new(&["scroll up"], CommandKind::ScrollUp).with("scroll_delta", json!(120)),
        VoiceRule::new(&["scroll down"], CommandKind::ScrollDown).with("scroll_delta", json!(-120)),
        VoiceRule::new(&["lock computer", "lock screen"], CommandKind::Lock),
        VoiceRule::new(
            &["move to center", "center the mouse"],
            CommandKind::MouseMoveTo(Anchor::Center),
        ),
        VoiceRule::new(&["top left"], CommandKind::MouseMoveTo(Anchor::TopLeft)),
        VoiceRule::new(&["top right"], CommandKind::MouseMoveTo(Anchor::TopRight)),
        VoiceRule::new(&["bottom left"], CommandKind::MouseMoveTo(Anchor::BottomLeft)),
        VoiceRule::new(&["bottom right"], CommandKind::MouseMoveTo(Anchor::BottomRight)),
    ]
}

// ============================================================================
// Listener
// ============================================================================

/// Source of transcribed phrases
pub trait VoiceListener: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self);
    /// Queue the voice loop pulls from
    fn phrases(&self) -> Receiver<VoicePhrase>;
    /// Whether phrases can arrive at all, and why not
    fn availability(&self) -> (bool, String);
}

/// Cloneable handle an external transcriber pushes phrases through
#[derive(Clone)]
pub struct PhraseSender {
    tx: Sender<VoicePhrase>,
}

impl PhraseSender {
    pub fn send(&self, phrase: VoicePhrase) -> Result<()> {
        self.tx
            .send(phrase)
            .map_err(|_| ControlError::Voice("phrase queue closed".into()))
    }

    pub fn say(&self, text: &str) -> Result<()> {
        self.send(VoicePhrase::new(text))
    }
}

/// Listener backed by an unbounded channel. Phrases sent while stopped are
/// discarded on the next start.
pub struct ChannelVoiceListener {
    enabled: bool,
    tx: Sender<VoicePhrase>,
    rx: Receiver<VoicePhrase>,
    listening: AtomicBool,
    reason: Mutex<String>,
}

impl ChannelVoiceListener {
    pub fn new(config: &VoiceConfig) -> Self {
        let (tx, rx) = flume::unbounded();
        let reason = if config.enabled {
            "ready".to_string()
        } else {
            "voice disabled in config".to_string()
        };
        Self {
            enabled: config.enabled,
            tx,
            rx,
            listening: AtomicBool::new(false),
            reason: Mutex::new(reason),
        }
    }

    pub fn sender(&self) -> PhraseSender {
        PhraseSender {
            tx: self.tx.clone(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

impl VoiceListener for ChannelVoiceListener {
    fn start(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let stale = self.rx.drain().count();
        if stale > 0 {
            tracing::debug!(stale, "discarded phrases queued before start");
        }
        self.listening.store(true, Ordering::SeqCst);
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = "listening".to_string();
        Ok(())
    }

    fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = "stopped".to_string();
        }
    }

    fn phrases(&self) -> Receiver<VoicePhrase> {
        self.rx.clone()
    }

    fn availability(&self) -> (bool, String) {
        let reason = self
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        (self.enabled, reason)
    }
}
