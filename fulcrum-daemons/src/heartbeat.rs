//! Heartbeat publisher (Supplement B): periodically publishes `heartbeat`
//! events carrying a capacity snapshot, filling in the closed event-type
//! set's `heartbeat` member, which spec.md names but never schedules.
//!
//! Grounded on the Actor Pool's own scheduling-tick shape (spec §4.6): a
//! plain `tokio::time::interval` loop, observational only, never touching
//! scheduling or task state.

use fulcrum_core::{Event, EventBus, EventPayload, Source};
use fulcrum_pool::LocalActorPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Publishes a `heartbeat` event every `interval` with the pool's current
/// busy/total actor counts, summed across all providers.
pub struct HeartbeatPublisher {
    pool: LocalActorPool,
    bus: Arc<dyn EventBus>,
    interval: Duration,
}

/// Supplement B's default cadence.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

impl HeartbeatPublisher {
    /// Build a heartbeat publisher over `pool`, publishing to `bus` every
    /// `interval`.
    pub fn new(pool: LocalActorPool, bus: Arc<dyn EventBus>, interval: Duration) -> Self {
        Self { pool, bus, interval }
    }

    /// Publish one heartbeat immediately, then every `interval` thereafter,
    /// until the task is aborted. Meant to be spawned once at startup.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let (busy_actors, total_actors) = self.pool.actor_counts().await;
            self.bus.publish(Event::new(
                Source::System,
                EventPayload::Heartbeat { busy_actors, total_actors },
            ));
        }
    }

    /// Spawn [`HeartbeatPublisher::run`] as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
