#![deny(missing_docs)]
//! A bounded ring-buffer implementation of [`fulcrum_core::EventBus`].
//!
//! A single dedicated dispatch task owns the ring and the subscriber list
//! (spec §5: "the Event Bus protects its ring and subscriber list with a
//! single mutex; dispatch runs in one dedicated worker"). `publish` hands
//! the event to that task over an unbounded channel and returns immediately
//! — the publisher itself never blocks on ring capacity or on a slow
//! subscriber. The dispatch task assigns the monotonic id (the publisher's
//! own timestamp is kept as-is), so ordering is exactly publish-arrival
//! order even under concurrent publishers (spec §4.1 "Ordering").

use fulcrum_core::{Event, EventBus, EventId, EventSubscriber};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct BusState {
    ring: VecDeque<Event>,
    ring_capacity: usize,
    subscribers: Vec<mpsc::Sender<Event>>,
    next_id: u64,
    closed: bool,
}

/// Bounded ring-buffer event bus (spec §4.1).
pub struct RingBus {
    publish_tx: mpsc::UnboundedSender<Event>,
    state: Arc<Mutex<BusState>>,
    subscriber_queue_capacity: usize,
}

impl RingBus {
    /// Default ring capacity (spec §4.1 "Design").
    pub const DEFAULT_RING_CAPACITY: usize = 1024;

    /// Default per-subscriber queue capacity.
    pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

    /// Create a new bus with the given ring and per-subscriber queue
    /// capacities, spawning its dispatch task on the current tokio runtime.
    pub fn new(ring_capacity: usize, subscriber_queue_capacity: usize) -> Arc<Self> {
        let state = Arc::new(Mutex::new(BusState {
            ring: VecDeque::with_capacity(ring_capacity.min(4096)),
            ring_capacity,
            subscribers: Vec::new(),
            next_id: 1,
            closed: false,
        }));
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();

        tokio::spawn(dispatch_loop(state.clone(), publish_rx));

        Arc::new(Self {
            publish_tx,
            state,
            subscriber_queue_capacity,
        })
    }

    /// Create a bus with the spec's stated defaults.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(
            Self::DEFAULT_RING_CAPACITY,
            Self::DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
        )
    }

    /// Current number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }
}

async fn dispatch_loop(state: Arc<Mutex<BusState>>, mut rx: mpsc::UnboundedReceiver<Event>) {
    while let Some(mut event) = rx.recv().await {
        let mut guard = state.lock().unwrap();
        if guard.closed {
            // publish() after close() is a no-op (Supplement A).
            continue;
        }

        event.id = EventId::new(guard.next_id.to_string());
        guard.next_id += 1;

        if guard.ring.len() >= guard.ring_capacity {
            guard.ring.pop_front();
        }
        guard.ring.push_back(event.clone());

        guard.subscribers.retain_mut(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event_type = event.event_type(), "fulcrum-bus: subscriber queue full, dropping event for it");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        debug!(event_type = event.event_type(), subscribers = guard.subscribers.len(), "fulcrum-bus: dispatched");
    }
}

impl EventBus for RingBus {
    fn publish(&self, event: Event) {
        // Unbounded and single-consumer: this send cannot block and only
        // fails if the dispatch task has already exited, which only
        // happens if every handle to `state` (and so every `RingBus`) was
        // dropped — in which case there is nothing left to publish to.
        let _ = self.publish_tx.send(event);
    }

    fn subscribe(&self) -> EventSubscriber {
        let mut guard = self.state.lock().unwrap();
        let (tx, rx) = mpsc::channel(self.subscriber_queue_capacity);
        if guard.closed {
            // Returning a subscriber backed by an already-dropped sender
            // gives an immediately-closed receiver, per Supplement A.
            drop(tx);
        } else {
            guard.subscribers.push(tx);
        }
        EventSubscriber::new(rx)
    }

    fn tail(&self, n: usize) -> Vec<Event> {
        let guard = self.state.lock().unwrap();
        let len = guard.ring.len();
        let skip = len.saturating_sub(n);
        guard.ring.iter().skip(skip).cloned().collect()
    }

    fn close(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.closed = true;
        guard.subscribers.clear();
    }
}
