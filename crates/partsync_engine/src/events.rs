//! Event delivery to collaborators.

use partsync_protocol::SyncEvent;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Capability interface for collaborators that react to sync events.
///
/// Observers are called synchronously on the emitting task and must not
/// block.
pub trait SyncObserver: Send + Sync {
    /// Called for every emitted event.
    fn on_event(&self, _event: &SyncEvent) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Fan-out of [`SyncEvent`]s to an observer and to channel subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
    observer: Arc<dyn SyncObserver>,
}

impl EventBus {
    /// Creates a bus with a channel buffer of `capacity` events.
    ///
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize, observer: Arc<dyn SyncObserver>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, observer }
    }

    /// Delivers `event`.
    pub fn emit(&self, event: SyncEvent) {
        debug!(event = event.name(), "emit");
        self.observer.on_event(&event);
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    /// Returns a receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use partsync_protocol::{SyncReason, SyncStatus};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl SyncObserver for Recorder {
        fn on_event(&self, event: &SyncEvent) {
            self.0.lock().push(event.name());
        }
    }

    #[test]
    fn emits_to_observer_and_channel() {
        let recorder = Arc::new(Recorder::default());
        let bus = EventBus::new(8, recorder.clone());
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::status(SyncStatus::Start, SyncReason::Manual));
        bus.emit(SyncEvent::data_updated(vec![]));

        assert_eq!(*recorder.0.lock(), vec!["sync:status", "data:updated"]);
        assert_eq!(rx.try_recv().unwrap().name(), "sync:status");
        assert_eq!(rx.try_recv().unwrap().name(), "data:updated");
    }

    #[test]
    fn emit_without_receivers() {
        let bus = EventBus::new(1, Arc::new(NoopObserver));
        bus.emit(SyncEvent::data_updated(vec![]));
    }
}
