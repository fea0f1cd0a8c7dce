#![deny(missing_docs)]
//! Durable [`fulcrum_core::SessionStore`] and [`fulcrum_core::TaskStore`]
//! implementations (spec §4.2).
//!
//! [`memory::MemoryStore`] is an in-process `RwLock<HashMap<..>>` store for
//! tests and ephemeral runs. [`fs::FsStore`] persists the same data to disk
//! with atomic metadata rewrites and durable append-only logs.

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;
