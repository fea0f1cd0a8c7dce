//! Ambient configuration shape and defaults.
//!
//! Loading these values from a JSONC/TOML/env source is the out-of-scope
//! configuration loader's job (spec §1); this module only defines the shape
//! and the defaults the spec states explicitly, so that callers can
//! construct a [`CoreConfig`] however they like and hand it to the rest of
//! the workspace.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static per-provider capacity configuration (spec §4.6 "Static configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// How many actors to create for this provider at startup.
    pub max_concurrent: u32,
    /// Tags every actor for this provider inherits.
    pub tags: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            tags: Vec::new(),
        }
    }
}

/// Top-level configuration for the execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Event bus ring buffer capacity (spec §4.1 "Design", default 1024).
    pub bus_ring_capacity: usize,
    /// Per-subscriber bounded queue capacity.
    pub bus_subscriber_queue_capacity: usize,
    /// Providers known to the actor pool at startup.
    pub providers: HashMap<String, ProviderConfig>,
    /// Tool recovery middleware retry budget per tool name, per task (spec
    /// §4.4 "Tool recovery middleware", default 3).
    pub tool_max_retries: u32,
    /// Cooperative preemption hard-cancel watchdog, in seconds (spec §4.6,
    /// §5, default 30).
    pub preemption_watchdog_secs: u64,
    /// How long the pool waits for cooperative preemption before forcing
    /// the actor busy anyway, in seconds (spec §4.6, default 5; not a hard
    /// contract per spec §9).
    pub preemption_cooperative_wait_secs: u64,
    /// Scheduling loop tick interval, in seconds (spec §4.6, default 5).
    pub scheduler_tick_secs: u64,
    /// Fraction of a provider's context window at which the Compressor
    /// triggers (spec §9 "Cumulative conversation summarization", default 0.8).
    pub compaction_threshold: f32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bus_ring_capacity: 1024,
            bus_subscriber_queue_capacity: 256,
            providers: HashMap::new(),
            tool_max_retries: 3,
            preemption_watchdog_secs: 30,
            preemption_cooperative_wait_secs: 5,
            scheduler_tick_secs: 5,
            compaction_threshold: 0.8,
        }
    }
}
