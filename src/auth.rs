//! Face authentication seam
//!
//! Matching itself is done by an external backend. The orchestrator only needs
//! a yes/no answer with the attempt count.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::error::{ControlError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub success: bool,
    pub attempts: u32,
    pub reason: String,
}

impl AuthResult {
    pub fn success(attempts: u32) -> Self {
        Self {
            success: true,
            attempts,
            reason: String::new(),
        }
    }

    pub fn failure(attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            attempts,
            reason: reason.into(),
        }
    }
}

pub trait FaceAuthenticator: Send + Sync {
    /// Blocks until a verdict. `Err` means the backend itself failed.
    fn authenticate(&self) -> Result<AuthResult>;
}

/// Authenticator used when none is configured; always errors
#[derive(Debug, Default)]
pub struct UnconfiguredAuthenticator;

impl FaceAuthenticator for UnconfiguredAuthenticator {
    fn authenticate(&self) -> Result<AuthResult> {
        Err(ControlError::BackendUnavailable(
            "no face authenticator configured; disable auth or supply one".into(),
        ))
    }
}

/// Replays queued outcomes in order, then repeats the fallback
pub struct ScriptedAuthenticator {
    script: Mutex<VecDeque<Result<AuthResult>>>,
    fallback: AuthResult,
}

impl ScriptedAuthenticator {
    pub fn always(result: AuthResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: result,
        }
    }

    pub fn accepting() -> Self {
        Self::always(AuthResult::success(1))
    }

    pub fn rejecting(reason: &str) -> Self {
        Self::always(AuthResult::failure(1, reason))
    }

    /// Queue an outcome ahead of the fallback
    pub fn then(self, outcome: Result<AuthResult>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }
}

impl FaceAuthenticator for ScriptedAuthenticator {
    fn authenticate(&self) -> Result<AuthResult> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_then_fallback() {
        let auth = ScriptedAuthenticator::accepting()
            .then(Err(ControlError::Camera("no device".into())))
            .then(Ok(AuthResult::failure(2, "No matching face.")));

        assert!(auth.authenticate().is_err());
        assert_eq!(
            auth.authenticate().unwrap(),
            AuthResult::failure(2, "No matching face.")
        );
        assert!(auth.authenticate().unwrap().success);
        assert!(auth.authenticate().unwrap().success);
    }

    #[test]
    fn test_unconfigured_always_errors() {
        assert!(matches!(
            UnconfiguredAuthenticator.authenticate(),
            Err(ControlError::BackendUnavailable(_))
        ));
    }
}
