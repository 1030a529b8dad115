//! Runtime counters and the periodic metrics file writer

use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Result;
use crate::worker::{join_with_timeout, spawn_named, StopSignal};

const WRITER_STOP_TIMEOUT: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub command_count: u64,
    pub blocked_command_count: u64,
    pub gesture_frames_processed: u64,
    pub auth_attempts: u64,
    pub auth_successes: u64,
    pub voice_commands_heard: u64,
    pub warnings: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    CommandCount,
    BlockedCommandCount,
    GestureFramesProcessed,
    AuthAttempts,
    AuthSuccesses,
    VoiceCommandsHeard,
    Warnings,
    Errors,
}

impl MetricsSnapshot {
    fn field_mut(&mut self, field: MetricField) -> &mut u64 {
        match field {
            MetricField::CommandCount => &mut self.command_count,
            MetricField::BlockedCommandCount => &mut self.blocked_command_count,
            MetricField::GestureFramesProcessed => &mut self.gesture_frames_processed,
            MetricField::AuthAttempts => &mut self.auth_attempts,
            MetricField::AuthSuccesses => &mut self.auth_successes,
            MetricField::VoiceCommandsHeard => &mut self.voice_commands_heard,
            MetricField::Warnings => &mut self.warnings,
            MetricField::Errors => &mut self.errors,
        }
    }
}

/// Counters shared by every worker. Each call holds the lock only for the
/// single read or increment.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    snapshot: Mutex<MetricsSnapshot>,
}

pub type SharedMetrics = Arc<MetricsCollector>;

pub fn new_shared() -> SharedMetrics {
    Arc::new(MetricsCollector::default())
}

impl MetricsCollector {
    pub fn incr(&self, field: MetricField, by: u64) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = snapshot.field_mut(field);
        *counter = counter.saturating_add(by);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = MetricsSnapshot::default();
    }
}

#[derive(Serialize)]
struct MetricsRecord {
    timestamp: f64,
    snapshot: MetricsSnapshot,
}

/// Serializes collector snapshots to a JSON file on a fixed interval
pub struct MetricsWriter {
    collector: SharedMetrics,
    output_path: PathBuf,
    interval: Duration,
    worker: Mutex<Option<(StopSignal, JoinHandle<()>)>>,
}

impl MetricsWriter {
    pub fn new(collector: SharedMetrics, output_path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            collector,
            output_path: output_path.into(),
            interval,
            worker: Mutex::new(None),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|(_, h)| !h.is_finished()) {
            return;
        }

        let stop = StopSignal::new();
        let stop_worker = stop.clone();
        let collector = Arc::clone(&self.collector);
        let path = self.output_path.clone();
        let interval = self.interval;

        let spawned = spawn_named("metrics-writer", move || loop {
            if let Err(e) = write_snapshot(&collector, &path) {
                tracing::warn!(path = %path.display(), "metrics write failed: {}", e);
            }
            if stop_worker.wait_timeout(interval) {
                break;
            }
        });
        match spawned {
            Ok(handle) => *worker = Some((stop, handle)),
            Err(e) => tracing::error!("failed to spawn metrics writer: {}", e),
        }
    }

    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((stop, handle)) = worker {
            stop.trigger();
            join_with_timeout(handle, WRITER_STOP_TIMEOUT);
        }
    }

    pub fn write_now(&self) -> Result<()> {
        write_snapshot(&self.collector, &self.output_path)
    }
}

fn write_snapshot(collector: &MetricsCollector, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let record = MetricsRecord {
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        snapshot: collector.snapshot(),
    };
    fs::write(path, serde_json::to_string_pretty(&record)?)?;
    Ok(())
}
