//! Baseline registry and check pipeline for the configuration sentinel.
//!
//! A check of one tracked file runs probe, classify, log, remediate and
//! alert in sequence; [`checker::Checker`] drives it and the service crate
//! schedules it.

pub mod alert;
pub mod baseline;
pub mod checker;
pub mod classifier;
pub mod error;
pub mod hasher;
pub mod models;
pub mod paths;
pub mod preflight;
pub mod privilege;
pub mod probe;
pub mod remediation;
pub mod settings;
pub mod store;

pub use checker::Checker;
pub use classifier::{classify, Observed, Verdict};
pub use error::{Result, SentinelError};
pub use remediation::CheckOutcome;
pub use store::BaselineStore;
