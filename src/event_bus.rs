//! In-process publish/subscribe for domain events
//!
//! Producers enqueue without blocking; a single consumer thread delivers each
//! event to the handlers of its type, then to the "any" handlers, in
//! subscription order. A panicking handler is logged and skipped.

use flume::{Receiver, Sender};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::events::{DomainEvent, EventType};
use crate::worker::{spawn_named, wait_finished};

pub type EventHandler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

const STOP_TIMEOUT: Duration = Duration::from_millis(1500);

enum BusMessage {
    Event(DomainEvent),
    /// Stop request tagged with the generation that issued it
    Shutdown(u64),
}

struct Consumer {
    handle: JoinHandle<()>,
    stopping: bool,
}

#[derive(Default)]
struct Handlers {
    typed: HashMap<EventType, Vec<EventHandler>>,
    any: Vec<EventHandler>,
}

/// Handler and queue counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    pub registered_typed_handlers: usize,
    pub registered_any_handlers: usize,
    pub queued_events: usize,
}

pub struct EventBus {
    handlers: Arc<RwLock<Handlers>>,
    tx: Sender<BusMessage>,
    rx: Receiver<BusMessage>,
    /// Bumped by every `start`; a consumer only honours a shutdown marker
    /// from the current generation
    generation: Arc<AtomicU64>,
    worker: Mutex<Option<Consumer>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            handlers: Arc::new(RwLock::new(Handlers::default())),
            tx,
            rx,
            generation: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    pub fn subscribe<F>(&self, event_type: EventType, handler: F)
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .typed
            .entry(event_type)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn subscribe_any<F>(&self, handler: F)
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.any.push(Arc::new(handler));
    }

    /// Enqueue an event; never blocks
    pub fn publish(&self, event: DomainEvent) {
        // The bus owns a receiver, so the channel cannot be disconnected
        let _ = self.tx.send(BusMessage::Event(event));
    }

    pub fn is_running(&self) -> bool {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        worker
            .as_ref()
            .is_some_and(|c| !c.stopping && !c.handle.is_finished())
    }

    /// Start the consumer thread. No-op while one is running.
    ///
    /// A consumer abandoned by an earlier `stop` that is still alive is
    /// re-armed instead of spawning a second one, so there is never more than
    /// one consumer draining the queue.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(consumer) = worker.as_mut() {
            if !consumer.handle.is_finished() {
                if consumer.stopping {
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    consumer.stopping = false;
                }
                return;
            }
        }
        if let Some(finished) = worker.take() {
            let _ = finished.handle.join();
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let rx = self.rx.clone();
        let handlers = Arc::clone(&self.handlers);
        let current = Arc::clone(&self.generation);
        match spawn_named("event-bus", move || {
            run_consumer(rx, handlers, current);
        }) {
            Ok(handle) => {
                tracing::debug!(generation, "event bus consumer started");
                *worker = Some(Consumer {
                    handle,
                    stopping: false,
                });
            }
            Err(e) => tracing::error!("failed to spawn event bus consumer: {}", e),
        }
    }

    /// Deliver everything published so far, then stop the consumer.
    ///
    /// The wait is bounded; a consumer stuck in a slow handler is kept aside
    /// and exits once it reaches the shutdown marker, unless `start` re-arms
    /// it first.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(consumer) = worker.take() else {
            return;
        };
        if consumer.handle.is_finished() {
            let _ = consumer.handle.join();
            return;
        }
        if !consumer.stopping {
            let generation = self.generation.load(Ordering::SeqCst);
            let _ = self.tx.send(BusMessage::Shutdown(generation));
        }
        if wait_finished(&consumer.handle, STOP_TIMEOUT) {
            if consumer.handle.join().is_err() {
                tracing::error!("event bus consumer panicked");
            }
        } else {
            tracing::warn!(
                timeout = ?STOP_TIMEOUT,
                "event bus consumer still busy, leaving it to drain"
            );
            *worker = Some(Consumer {
                handle: consumer.handle,
                stopping: true,
            });
        }
    }

    pub fn stats(&self) -> BusStats {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        BusStats {
            registered_typed_handlers: handlers.typed.values().map(Vec::len).sum(),
            registered_any_handlers: handlers.any.len(),
            queued_events: self.rx.len(),
        }
    }
}

fn run_consumer(
    rx: Receiver<BusMessage>,
    handlers: Arc<RwLock<Handlers>>,
    current: Arc<AtomicU64>,
) {
    while let Ok(message) = rx.recv() {
        match message {
            BusMessage::Event(event) => dispatch(&event, &handlers),
            // A marker from before a restart is stale
            BusMessage::Shutdown(generation) if generation == current.load(Ordering::SeqCst) => {
                break;
            }
            BusMessage::Shutdown(_) => {}
        }
    }
}

fn dispatch(event: &DomainEvent, handlers: &RwLock<Handlers>) {
    // Clone the handler lists so a handler may subscribe without deadlocking
    let (typed, any) = {
        let handlers = handlers.read().unwrap_or_else(PoisonError::into_inner);
        (
            handlers
                .typed
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default(),
            handlers.any.clone(),
        )
    };

    for handler in typed.iter().chain(any.iter()) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
        if result.is_err() {
            tracing::error!(
                event_type = %event.event_type,
                "event handler panicked; continuing with remaining handlers"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_handler_receives_matching_events_only() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bus.subscribe(EventType::Startup, move |e| {
            sink.lock().unwrap().push(e.message.clone());
        });

        bus.start();
        bus.publish(DomainEvent::new(EventType::Startup, "boot"));
        bus.publish(DomainEvent::new(EventType::Heartbeat, "tick"));
        bus.stop();

        assert_eq!(*received.lock().unwrap(), vec!["boot".to_string()]);
    }

    #[test]
    fn test_events_published_before_start_are_delivered_in_order() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bus.subscribe_any(move |e| sink.lock().unwrap().push(e.message.clone()));

        for i in 0..50 {
            bus.publish(DomainEvent::new(EventType::Warning, format!("event-{}", i)));
        }
        bus.start();
        bus.stop();

        let expected: Vec<String> = (0..50).map(|i| format!("event-{}", i)).collect();
        assert_eq!(*received.lock().unwrap(), expected);
    }

    #[test]
    fn test_typed_handlers_run_before_any_handlers() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&order);
        let b = Arc::clone(&order);
        bus.subscribe_any(move |_| a.lock().unwrap().push("any"));
        bus.subscribe(EventType::Error, move |_| b.lock().unwrap().push("typed"));

        bus.publish(DomainEvent::new(EventType::Error, "x"));
        bus.start();
        bus.stop();

        assert_eq!(*order.lock().unwrap(), vec!["typed", "any"]);
    }

    #[test]
    fn test_panicking_handler_does_not_kill_consumer() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bus.subscribe(EventType::Warning, |e| {
            if e.message == "bad" {
                panic!("handler failure");
            }
        });
        bus.subscribe_any(move |e| sink.lock().unwrap().push(e.message.clone()));

        bus.start();
        bus.publish(DomainEvent::new(EventType::Warning, "bad"));
        bus.publish(DomainEvent::new(EventType::Warning, "good"));
        bus.stop();

        assert_eq!(
            *received.lock().unwrap(),
            vec!["bad".to_string(), "good".to_string()]
        );
    }

    #[test]
    fn test_stats_and_restart() {
        let bus = EventBus::new();
        bus.subscribe(EventType::Startup, |_| {});
        bus.subscribe_any(|_| {});
        bus.publish(DomainEvent::new(EventType::Startup, "queued"));

        let stats = bus.stats();
        assert_eq!(stats.registered_typed_handlers, 1);
        assert_eq!(stats.registered_any_handlers, 1);
        assert_eq!(stats.queued_events, 1);

        bus.start();
        assert!(bus.is_running());
        bus.stop();
        assert!(!bus.is_running());
        assert_eq!(bus.stats().queued_events, 0);

        bus.start();
        bus.stop();
        bus.stop();
    }

    #[test]
    fn test_restart_after_abandoned_stop_keeps_single_consumer() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        bus.subscribe_any(move |e| {
            if e.message == "slow" {
                std::thread::sleep(Duration::from_millis(2500));
            }
            sink.lock().unwrap().push(e.message.clone());
        });

        bus.start();
        bus.publish(DomainEvent::new(EventType::Warning, "slow"));
        std::thread::sleep(Duration::from_millis(50));
        bus.stop();
        assert!(!bus.is_running());

        bus.start();
        assert!(bus.is_running());
        bus.publish(DomainEvent::new(EventType::Warning, "after-restart"));
        bus.stop();
        assert!(!bus.is_running());

        bus.publish(DomainEvent::new(EventType::Warning, "after-final-stop"));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(
            *received.lock().unwrap(),
            vec!["slow".to_string(), "after-restart".to_string()]
        );
        assert_eq!(bus.stats().queued_events, 1);

        // Still queued for the next run
        bus.start();
        bus.stop();
        assert_eq!(received.lock().unwrap().len(), 3);
    }
}
