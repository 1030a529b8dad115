//! Admission control for every command, whatever its source

use serde_json::Value;
use std::collections::HashSet;

use crate::command::{Command, Payload};
use crate::config::SecurityConfig;

const MAX_SCROLL_DELTA: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub accepted: bool,
    pub reason: String,
}

impl ValidationResult {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: String::new(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: reason.into(),
        }
    }
}

pub struct CommandGuard {
    allowed: HashSet<String>,
    fail_closed: bool,
}

impl CommandGuard {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            allowed: config.allowed_commands.iter().cloned().collect(),
            fail_closed: config.fail_closed,
        }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.contains(name)
    }

    /// Never fails; a rejection carries the reason
    pub fn validate(&self, command: &Command) -> ValidationResult {
        if command.name.is_empty() {
            return ValidationResult::reject("empty command name");
        }

        if !self.is_allowed(&command.name) && self.fail_closed {
            return ValidationResult::reject(format!(
                "command '{}' not in allow-list",
                command.name
            ));
        }

        // Payload bounds hold for allow-listed and fail-open commands alike
        if let Err(reason) = check_payload(&command.payload) {
            return ValidationResult::reject(reason);
        }

        if self.is_allowed(&command.name) {
            ValidationResult::accept()
        } else {
            ValidationResult {
                accepted: true,
                reason: format!("command '{}' not in allow-list; fail-open", command.name),
            }
        }
    }
}

fn check_payload(payload: &Payload) -> Result<(), String> {
    for (key, value) in payload {
        if (key.ends_with("_x") || key.ends_with("_y")) && !value.is_number() {
            return Err(format!("coordinate '{}' must be numeric", key));
        }
        if key == "scroll_delta" {
            let delta = scroll_delta(value).ok_or("scroll_delta must be an integer")?;
            if delta.unsigned_abs() > MAX_SCROLL_DELTA as u64 {
                return Err(format!("scroll_delta {} out of bounds", delta));
            }
        }
    }
    Ok(())
}

fn scroll_delta(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().map(|_| i64::MAX)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, CommandSource};
    use serde_json::json;

    fn guard() -> CommandGuard {
        CommandGuard::new(&SecurityConfig::default())
    }

    fn named(name: &str) -> Command {
        Command::new(name, CommandSource::Test)
    }

    #[test]
    fn test_allow_listed_command_accepted() {
        let result = guard().validate(&named("mouse.click.left"));
        assert!(result.accepted);
        assert!(result.reason.is_empty());
    }

    #[test]
    fn test_unknown_command_rejected_when_fail_closed() {
        let result = guard().validate(&named("nuke.everything"));
        assert!(!result.accepted);
        assert!(result.reason.contains("allow-list"));
    }

    #[test]
    fn test_empty_name_rejected_even_when_fail_open() {
        let guard = CommandGuard::new(&SecurityConfig {
            fail_closed: false,
            ..SecurityConfig::default()
        });
        assert!(!guard.validate(&named("")).accepted);
        assert!(guard.validate(&named("custom.thing")).accepted);
    }

    #[test]
    fn test_scroll_delta_bounds() {
        let guard = guard();
        let scroll = Command::of(CommandKind::ScrollUp, CommandSource::Test);

        assert!(guard.validate(&scroll.with_payload([("scroll_delta", json!(300))])).accepted);
        assert!(guard.validate(&scroll.with_payload([("scroll_delta", json!(-300))])).accepted);
        assert!(!guard.validate(&scroll.with_payload([("scroll_delta", json!(999))])).accepted);
        assert!(!guard.validate(&scroll.with_payload([("scroll_delta", json!(1.5))])).accepted);
        assert!(!guard.validate(&scroll.with_payload([("scroll_delta", json!("120"))])).accepted);
        assert!(
            !guard
                .validate(&scroll.with_payload([("scroll_delta", json!(u64::MAX))]))
                .accepted
        );
    }

    #[test]
    fn test_payload_checked_for_fail_open_unknowns_too() {
        let guard = CommandGuard::new(&SecurityConfig {
            fail_closed: false,
            ..SecurityConfig::default()
        });
        let cmd = named("custom.scroll").with_payload([("scroll_delta", json!(999))]);
        assert!(!guard.validate(&cmd).accepted);
    }

    #[test]
    fn test_coordinates_must_be_numeric() {
        let guard = guard();
        let mv = Command::of(CommandKind::MouseMove, CommandSource::Test);
        assert!(
            guard
                .validate(&mv.with_payload([("screen_x", json!(10)), ("screen_y", json!(20.5))]))
                .accepted
        );
        assert!(!guard.validate(&mv.with_payload([("screen_x", json!("ten"))])).accepted);
        assert!(!guard.validate(&mv.with_payload([("screen_y", json!(null))])).accepted);
    }
}
