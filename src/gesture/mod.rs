//! Hand-landmark interpretation
//!
//! Turns per-frame hand geometry into discrete pointer signals without any
//! dependency on a vision library, so it can be driven by synthetic fixtures.
//!
//! # Signals
//!
//! - **Pointer**: index fingertip projected onto the screen, EMA-smoothed with a
//!   pixel deadzone
//! - **Click / double click**: index-thumb pinch with a 150ms debounce
//! - **Right click**: middle-thumb pinch with a 500ms debounce
//! - **Drag**: a fist held for the configured duration
//! - **Scroll**: index fingertip well above or below the wrist

mod interpreter;
mod landmarks;
mod smoother;

pub use interpreter::{GestureFrame, GestureInterpreter, Point};
pub use landmarks::{HandAdapterFactory, HandLandmarkAdapter, HandLandmarks, Landmark, NoHands};
pub use smoother::PointerSmoother;
