//! Shared runtime state - the single record of lifecycle phase, auth status,
//! uptime and recent errors
//!
//! Scalar fields are atomics; the profile name and error log sit behind their
//! own mutexes. Writers are the orchestrator thread and the heartbeat worker,
//! readers are anyone polling [`RuntimeState::snapshot`].

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const MAX_ERRORS: usize = 256;

/// Orchestrator lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum AppPhase {
    Stopped = 0,
    Authenticating = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for AppPhase {
    fn from(v: u8) -> Self {
        match v {
            1 => AppPhase::Authenticating,
            2 => AppPhase::Running,
            3 => AppPhase::Stopping,
            _ => AppPhase::Stopped,
        }
    }
}

impl fmt::Display for AppPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppPhase::Stopped => write!(f, "Stopped"),
            AppPhase::Authenticating => write!(f, "Authenticating"),
            AppPhase::Running => write!(f, "Running"),
            AppPhase::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Thread-safe f64 using bit casting to AtomicU64
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub fn store(&self, v: f64, order: Ordering) {
        self.0.store(v.to_bits(), order);
    }
}

pub struct RuntimeState {
    phase: AtomicU8,
    is_running: AtomicBool,
    is_authenticated: AtomicBool,
    uptime_seconds: AtomicF64,
    active_profile: Mutex<String>,
    errors: Mutex<VecDeque<String>>,
}

/// Point-in-time copy of [`RuntimeState`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeSnapshot {
    pub phase: AppPhase,
    pub is_running: bool,
    pub is_authenticated: bool,
    pub active_profile: String,
    pub uptime_seconds: f64,
    pub errors: Vec<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(AppPhase::Stopped as u8),
            is_running: AtomicBool::new(false),
            is_authenticated: AtomicBool::new(false),
            uptime_seconds: AtomicF64::new(0.0),
            active_profile: Mutex::new("default".to_string()),
            errors: Mutex::new(VecDeque::new()),
        }
    }
}

impl RuntimeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn phase(&self) -> AppPhase {
        AppPhase::from(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: AppPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        self.is_running
            .store(phase == AppPhase::Running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.is_authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated.load(Ordering::SeqCst)
    }

    pub fn set_uptime(&self, seconds: f64) {
        self.uptime_seconds.store(seconds.max(0.0), Ordering::SeqCst);
    }

    pub fn uptime(&self) -> f64 {
        self.uptime_seconds.load(Ordering::SeqCst)
    }

    pub fn set_profile(&self, profile: &str) {
        *self
            .active_profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = profile.to_string();
    }

    /// Append to the error log, dropping the oldest entry past the cap
    pub fn mark_error(&self, error: impl Into<String>) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        if errors.len() >= MAX_ERRORS {
            errors.pop_front();
        }
        errors.push_back(error.into());
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            phase: self.phase(),
            is_running: self.is_running(),
            is_authenticated: self.is_authenticated(),
            active_profile: self
                .active_profile
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            uptime_seconds: self.uptime(),
            errors: self
                .errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("phase", &self.phase())
            .field("is_running", &self.is_running())
            .field("is_authenticated", &self.is_authenticated())
            .field("uptime_seconds", &self.uptime())
            .finish()
    }
}

/// Type alias for shared state
pub type SharedState = Arc<RuntimeState>;
