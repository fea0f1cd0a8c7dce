//! Cost Tracker (spec §4.7): maintains each session's cumulative token
//! counters from `llm.call` events.

use fulcrum_core::event::LlmCallPhase;
use fulcrum_core::{Event, EventBus, EventPayload, EventSubscriber, SessionStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Subscribes to the bus and increments the owning session's `tokens_in`/
/// `tokens_out` on every `llm.call` response event.
///
/// Grounded on `neuron-hooks`' "dispatch, log, and continue" discipline:
/// one session-store failure must never stop the subscription loop, since
/// every other session's accounting still depends on it running.
pub struct CostTracker {
    session_store: Arc<dyn SessionStore>,
}

impl CostTracker {
    /// Build a cost tracker over the given session store.
    pub fn new(session_store: Arc<dyn SessionStore>) -> Self {
        Self { session_store }
    }

    /// Consume events from `subscriber` until the bus closes. Meant to be
    /// spawned once at startup.
    pub async fn run(self, mut subscriber: EventSubscriber) {
        while let Some(event) = subscriber.recv_matching(&["llm.call"]).await {
            self.handle(&event).await;
        }
    }

    async fn handle(&self, event: &Event) {
        let EventPayload::LlmCall { phase, tokens_in, tokens_out } = &event.payload else {
            return;
        };
        if *phase != LlmCallPhase::Response {
            return;
        }
        if *tokens_in == 0 && *tokens_out == 0 {
            return;
        }
        let Some(session_id) = &event.session_id else {
            return;
        };

        let mut session = match self.session_store.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                warn!(%session_id, "cost tracker: session not found for llm.call event");
                return;
            }
            Err(err) => {
                warn!(%session_id, error = %err, "cost tracker: failed to fetch session");
                return;
            }
        };

        session.tokens_in += tokens_in;
        session.tokens_out += tokens_out;
        if let Err(err) = self.session_store.update(&session).await {
            warn!(%session_id, error = %err, "cost tracker: failed to persist token counters");
        }
    }

    /// Subscribe to `bus` and spawn the run loop as a background task.
    pub fn spawn(self, bus: &dyn EventBus) -> JoinHandle<()> {
        let subscriber = bus.subscribe();
        tokio::spawn(self.run(subscriber))
    }
}
