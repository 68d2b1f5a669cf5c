//! Monitoring engine - schedules and executes availability probes
//!
//! Probes run with a hard timeout, one timer per target feeds a bounded
//! worker pool, and consecutive results are classified into transitions.

pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod transition;
pub mod types;


pub use executor::ProbeExecutor;
pub use scheduler::{MonitoringScheduler, SchedulerOptions};
pub use transition::{TransitionKind, classify};
pub use types::{MonitorStatus, MonitorTarget, ProbeResult};
