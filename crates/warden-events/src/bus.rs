//! Event bus for broadcasting events to subscribers.

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::event::WardenEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A synchronous listener: a closure invoked inline during `publish`.
type Listener = Arc<dyn Fn(&WardenEvent) + Send + Sync>;

/// Event bus for broadcasting events to all subscribers.
///
/// Two delivery paths:
/// - a broadcast channel for async consumers (the SSE stream), and
/// - a registry of synchronous listeners, notified in registration order
///   before the broadcast. Listeners never own the payload after the
///   call returns; they receive a reference and must clone what they
///   keep.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<WardenEvent>>,
    listeners: Arc<RwLock<Vec<(String, Listener)>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Publish an event.
    ///
    /// Synchronous listeners run first, in registration order; a
    /// panicking listener is logged and the rest still run. Returns the
    /// number of async receivers that got the event.
    pub fn publish(&self, event: WardenEvent) -> usize {
        let event = Arc::new(event);

        trace!(channel = event.channel(), "publishing event");
        self.notify_listeners(&event);

        if let Ok(count) = self.sender.send(Arc::clone(&event)) {
            debug!(channel = event.channel(), receiver_count = count, "event published");
            count
        } else {
            // No async receivers - this is fine.
            0
        }
    }

    /// Register a synchronous listener under a diagnostic name.
    pub fn listen(&self, name: impl Into<String>, listener: impl Fn(&WardenEvent) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push((name.into(), Arc::new(listener)));
        }
    }

    /// Subscribe to events on the async path.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// The current number of async subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn notify_listeners(&self, event: &Arc<WardenEvent>) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for (name, listener) in &listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(event);
            }));
            if result.is_err() {
                warn!(listener = %name, channel = event.channel(), "event listener panicked");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for events from the event bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<WardenEvent>>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` when the channel closes. Lagged receivers skip the
    /// dropped events and keep receiving.
    pub async fn recv(&mut self) -> Option<Arc<WardenEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive the next event without blocking.
    pub fn try_recv(&mut self) -> Option<Arc<WardenEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::{LimitOp, WorkerId, WorkerStatus};

    fn sample_event() -> WardenEvent {
        WardenEvent::WorkerStatus {
            metadata: EventMetadata::new("test"),
            worker_id: WorkerId::new("w1"),
            status: WorkerStatus::Online,
            current_wip: 0,
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let count = bus.publish(sample_event());
        assert_eq!(count, 1);

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.channel(), "worker:status");
    }

    #[tokio::test]
    async fn test_no_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(sample_event()), 0);
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.listen(tag, move |_| {
                order.write().unwrap().push(tag);
            });
        }

        bus.publish(sample_event());
        assert_eq!(*order.read().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_others() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.listen("bad", |_| panic!("listener bug"));
        let reached_clone = Arc::clone(&reached);
        bus.listen("good", move |_| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(sample_event());
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denial_event_round_trip() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(WardenEvent::LimitsDenial {
            metadata: EventMetadata::new("limits"),
            op: LimitOp::CockpitWrite,
            scope_key: "127.0.0.1".into(),
            code: "RATE_LIMIT_EXCEEDED".into(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.channel(), "limits:denial");
    }
}
