//! Camera frame plumbing
//!
//! Capture itself lives outside the crate. Producers push frames into a
//! [`LatestFrameSlot`]; the gesture loop only ever sees the most recent one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;

/// One captured image. Pixel layout is whatever the landmark adapter expects.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    /// Monotonically increasing per slot, starting at 1
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// Camera stream as seen by the orchestrator
pub trait FrameSource: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self);
    /// Non-blocking peek at the newest frame
    fn read_latest_frame(&self) -> Option<CameraFrame>;
}

/// Single-value slot: writers overwrite, readers clone. Nothing queues up.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    frame: Mutex<Option<CameraFrame>>,
    next_index: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a frame, replacing any unread one. Returns the assigned index.
    pub fn put(&self, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> u64 {
        let mut slot = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        let index = self.next_index.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(CameraFrame {
            index,
            width,
            height,
            data: data.into(),
        });
        index
    }

    pub fn latest(&self) -> Option<CameraFrame> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// [`FrameSource`] over a shared slot. Frames published while stopped are
/// dropped.
pub struct SlotFrameSource {
    slot: Arc<LatestFrameSlot>,
    streaming: AtomicBool,
}

impl SlotFrameSource {
    pub fn new(slot: Arc<LatestFrameSlot>) -> Self {
        Self {
            slot,
            streaming: AtomicBool::new(false),
        }
    }

    pub fn slot(&self) -> Arc<LatestFrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Push a frame from the capture side
    pub fn publish(&self, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Option<u64> {
        if !self.streaming.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.slot.put(width, height, data))
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

impl FrameSource for SlotFrameSource {
    fn start(&self) -> Result<()> {
        self.streaming.store(true, Ordering::SeqCst);
        tracing::debug!("camera slot streaming");
        Ok(())
    }

    fn stop(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.slot.clear();
    }

    fn read_latest_frame(&self) -> Option<CameraFrame> {
        if !self.streaming.load(Ordering::SeqCst) {
            return None;
        }
        self.slot.latest()
    }
}
