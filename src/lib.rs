//! Hands-free pointer and system control from hand gestures and voice.
//!
//! Gesture frames and spoken phrases become [`command::Command`]s, pass the
//! [`guard::CommandGuard`] allow-list, and are dispatched by the
//! [`executor::CommandExecutor`] to an actuation backend. The
//! [`orchestrator::AppOrchestrator`] owns the lifecycle and the worker threads.

pub mod actuation;
pub mod auth;
pub mod camera;
pub mod command;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod executor;
pub mod gesture;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod state;
pub mod voice;
pub mod worker;

pub use config::Config;
pub use error::{ControlError, Result};
pub use orchestrator::AppOrchestrator;
