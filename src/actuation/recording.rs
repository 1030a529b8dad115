use std::sync::{Arc, Mutex, PoisonError};

use super::{Action, MouseKeyboard};
use crate::error::{ControlError, Result};

/// Actuator that performs nothing and remembers every call
#[derive(Debug, Default)]
pub struct RecordingActuator {
    actions: Mutex<Vec<Action>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingActuator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Actions in their `kind:args` text form
    pub fn rendered(&self) -> Vec<String> {
        self.actions().iter().map(Action::to_string).collect()
    }

    pub fn clear(&self) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every following call fail with `message`; `None` restores success
    pub fn fail_with(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) =
            message.map(str::to_string);
    }

    fn record(&self, action: Action) -> Result<()> {
        if let Some(message) = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(ControlError::Actuation(message));
        }
        tracing::debug!(action = %action, "dry-run actuation");
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
        Ok(())
    }
}

impl MouseKeyboard for RecordingActuator {
    fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.record(Action::Move { x, y })
    }

    fn click_left(&self) -> Result<()> {
        self.record(Action::ClickLeft)
    }

    fn click_right(&self) -> Result<()> {
        self.record(Action::ClickRight)
    }

    fn double_click(&self) -> Result<()> {
        self.record(Action::DoubleClick)
    }

    fn scroll(&self, delta: i32) -> Result<()> {
        self.record(Action::Scroll(delta))
    }

    fn key_press(&self, key: &str) -> Result<()> {
        self.record(Action::Key(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_call_order() {
        let recorder = RecordingActuator::new();
        recorder.move_to(10, 20).unwrap();
        recorder.click_left().unwrap();
        recorder.scroll(120).unwrap();
        assert_eq!(recorder.rendered(), vec!["move:10,20", "click:left", "scroll:120"]);

        recorder.clear();
        assert!(recorder.actions().is_empty());
    }

    #[test]
    fn test_injected_failure_records_nothing() {
        let recorder = RecordingActuator::new();
        recorder.fail_with(Some("device gone"));
        let err = recorder.click_right().unwrap_err();
        assert!(err.to_string().contains("device gone"));
        assert!(recorder.actions().is_empty());

        recorder.fail_with(None);
        recorder.click_right().unwrap();
        assert_eq!(recorder.actions(), vec![Action::ClickRight]);
    }
}
