//! Scheduling, notification plumbing and reporting for the sentinel daemon.

pub mod report;
pub mod scheduler;
pub mod shutdown;
pub mod watcher;
