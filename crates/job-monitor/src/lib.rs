//! Asynchronous job triggering and run monitoring.
//!
//! A [`JobApi`] starts a job on an external service and reports its status;
//! [`RunMonitor`] drives it to a terminal state, either by waiting in place
//! ([`RunMonitor::wait_until_terminal`]) or one poll at a time
//! ([`RunMonitor::step`]) for hosts that persist [`MonitorState`] between
//! their own scheduling slots.

mod api;
mod monitor;
pub mod scripted;


pub use api::{JobApi, JobHandle, JobStatus};
pub use monitor::{MonitorConfig, MonitorState, RunMonitor, StepOutcome};
pub use tokio_util::sync::CancellationToken;
