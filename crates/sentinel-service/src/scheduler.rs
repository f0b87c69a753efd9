//! Event-driven check loop.
//!
//! The scheduler waits on change notifications and a periodic tick. A burst
//! of notifications is debounced into one batch; the distinct affected paths
//! plus the carry-over set are checked one at a time. Each periodic tick runs
//! a full sweep of the active set.
//!
//! Carry-over: any path whose check in a notification cycle ended in
//! `Remediated` or `RemediationFailed` is checked once more in the next cycle,
//! which catches multi-step edits such as write-then-rename. A carried path
//! that diverges again is carried again; a clean or degraded result ends the
//! chain.

use crate::shutdown::ShutdownSignal;
use crate::watcher::{ChangeEvent, ChangeSource};
use anyhow::Result;
use sentinel_core::settings::ScheduleSettings;
use sentinel_core::{CheckOutcome, Checker};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Granularity of the shutdown check while idle
const STOP_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// A burst is cut off after this many debounce windows.
const MAX_DEBOUNCE_WINDOWS: u32 = 4;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub debounce: Duration,
    pub poll_timeout: Duration,
}

impl From<&ScheduleSettings> for SchedulerConfig {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            debounce: Duration::from_millis(settings.debounce_ms),
            poll_timeout: Duration::from_millis(settings.poll_timeout_ms),
        }
    }
}

/// What one cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    pub checked: Vec<(String, CheckOutcome)>,
    pub rebuilt: bool,
}

impl CycleReport {
    pub fn outcome_for(&self, path: &str) -> Option<&CheckOutcome> {
        self.checked
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, outcome)| outcome)
    }
}

pub struct WatchScheduler<S: ChangeSource> {
    checker: Checker,
    source: S,
    config: SchedulerConfig,
    watched: HashSet<String>,
    recheck: HashSet<String>,
    generation: i64,
}

impl<S: ChangeSource> WatchScheduler<S> {
    pub fn new(checker: Checker, source: S, config: SchedulerConfig) -> Result<Self> {
        let mut scheduler = Self {
            checker,
            source,
            config,
            watched: HashSet::new(),
            recheck: HashSet::new(),
            generation: -1,
        };
        scheduler.rebuild()?;
        Ok(scheduler)
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn watched(&self) -> &HashSet<String> {
        &self.watched
    }

    pub fn recheck(&self) -> &HashSet<String> {
        &self.recheck
    }

    /// Reload the watch set from the store's active list.
    pub fn rebuild(&mut self) -> Result<()> {
        let store = self.checker.store();
        self.generation = store.watch_generation()?;
        let active = store.list_active()?;
        self.watched = active.iter().map(|f| f.path.clone()).collect();
        let paths: Vec<PathBuf> = active.iter().map(|f| PathBuf::from(&f.path)).collect();
        self.source.subscribe(&paths)?;
        debug!(files = self.watched.len(), generation = self.generation, "watch set rebuilt");
        Ok(())
    }

    /// Run until `shutdown` requests a stop. A check in progress always
    /// completes; the stop request is observed between waits.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<()> {
        info!(files = self.watched.len(), "scheduler started");
        self.sweep()?;
        let mut next_sweep = Instant::now() + self.config.interval;

        loop {
            if shutdown.should_stop() {
                info!("shutdown requested; scheduler stopping");
                return Ok(());
            }

            let deadline = (Instant::now() + STOP_CHECK_INTERVAL).min(next_sweep);
            let batch = self.wait_for_batch(deadline);
            if !batch.is_empty() || !self.recheck.is_empty() {
                self.process_batch(batch)?;
            } else if self.checker.store().watch_generation()? != self.generation {
                self.rebuild()?;
            }

            if Instant::now() >= next_sweep {
                self.sweep()?;
                next_sweep = Instant::now() + self.config.interval;
            }
        }
    }

    /// Collect notifications until `deadline`, or until a started burst has
    /// been quiet for the debounce period. A burst never extends past
    /// `deadline`, so the caller's stop check keeps its cadence.
    pub fn wait_for_batch(&mut self, deadline: Instant) -> Vec<ChangeEvent> {
        let mut batch = Vec::new();
        let mut until = deadline;
        let mut burst_cap = deadline;
        loop {
            let now = Instant::now();
            if now >= until {
                break;
            }
            let wait = self.config.poll_timeout.min(until - now);
            if let Some(event) = self.source.poll(wait) {
                let received = Instant::now();
                if batch.is_empty() {
                    burst_cap = received + self.config.debounce * MAX_DEBOUNCE_WINDOWS;
                }
                batch.push(event);
                until = (received + self.config.debounce).min(burst_cap).min(deadline);
            }
        }
        batch
    }

    /// Check the distinct paths named by `events` plus the carry-over set.
    pub fn process_batch(&mut self, events: Vec<ChangeEvent>) -> Result<CycleReport> {
        let store = self.checker.store();
        let mut fresh = BTreeSet::new();
        let mut recorded = HashSet::new();
        for event in events {
            if event.kind.is_read_only() {
                continue;
            }
            let key = event.path.display().to_string();
            if self.watched.contains(&key) {
                if recorded.insert(event.notification) {
                    store.append_change_notification(&event.raw)?;
                }
                fresh.insert(key);
            }
        }

        let carried = std::mem::take(&mut self.recheck);
        let targets: BTreeSet<String> = fresh.into_iter().chain(carried).collect();

        let mut report = CycleReport::default();
        let mut remediated = false;
        for path in targets {
            let Some(outcome) = self.checker.check_path(&path)? else {
                self.watched.remove(&path);
                continue;
            };
            match &outcome {
                CheckOutcome::Degraded => {
                    self.watched.remove(&path);
                }
                CheckOutcome::Remediated | CheckOutcome::RemediationFailed { .. } => {
                    remediated = true;
                    self.recheck.insert(path.clone());
                }
                CheckOutcome::Clean => {}
            }
            report.checked.push((path, outcome));
        }

        if remediated || self.checker.store().watch_generation()? != self.generation {
            self.rebuild()?;
            report.rebuilt = true;
        }
        Ok(report)
    }

    /// Check every active file once.
    pub fn sweep(&mut self) -> Result<CycleReport> {
        let checked = self.checker.check_all()?;
        let mut remediated = false;
        for (path, outcome) in &checked {
            match outcome {
                CheckOutcome::Degraded => {
                    self.watched.remove(path);
                }
                CheckOutcome::Remediated | CheckOutcome::RemediationFailed { .. } => {
                    remediated = true;
                }
                CheckOutcome::Clean => {}
            }
        }
        let mut report = CycleReport {
            checked,
            rebuilt: false,
        };
        if remediated || self.checker.store().watch_generation()? != self.generation {
            self.rebuild()?;
            report.rebuilt = true;
        }
        debug!(checked = report.checked.len(), "sweep complete");
        Ok(report)
    }
}
