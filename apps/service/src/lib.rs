//! Uptime monitoring engine.
//!
//! Probes user-registered HTTP(S) targets on per-target intervals, records
//! every result, tracks each target's up/down status and notifies owners when
//! a target goes down or comes back.

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod management;
pub mod monitoring;
pub mod notifications;
pub mod pool;
pub mod retention;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::Engine;
pub use error::{EngineError, ProbeError, StoreError};
pub use management::{ManagementError, MonitorService};
