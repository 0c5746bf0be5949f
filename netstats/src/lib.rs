//! Per-application and per-interface traffic accounting over the counter
//! tables maintained by an in-kernel probe.
//!
//! The tables are reached through [`store::KeyedStore`]; [`bpf::PinnedMap`]
//! reads the real pinned maps and [`store::MemoryStore`] stands in for them
//! in tests.

pub mod aggregate;
pub mod bpf;
pub mod config;
pub mod error;
pub mod model;
pub mod parse;
pub mod policy;
pub mod reconcile;
pub mod resolver;
pub mod stats;
pub mod store;
pub mod unknown_iface;

pub use aggregate::Total;
pub use error::{RowError, StatsError, StoreError};
pub use model::{CounterValue, ReportRecord, TAG_NONE, TrafficSet, UID_ALL};
pub use stats::{NetworkStats, StatsTables};
