//! Thread helpers shared by every background loop
//!
//! Loops are cancelled cooperatively through a [`StopSignal`]; joins are bounded
//! so a wedged loop is abandoned rather than blocking shutdown.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cloneable stop flag that sleeping loops can wait on
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`, waking early on stop. Returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Spawn a named worker thread
pub fn spawn_named<F>(name: &str, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

/// Poll until `handle` finishes or `timeout` elapses. Returns true if finished.
pub fn wait_finished(handle: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

/// Join `handle` if it finishes within `timeout`. Returns false when the thread
/// was abandoned still running.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    if !wait_finished(&handle, timeout) {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        tracing::warn!(worker = %name, ?timeout, "worker did not stop in time, abandoning");
        return false;
    }
    if handle.join().is_err() {
        tracing::error!("worker panicked before shutdown");
    }
    true
}
