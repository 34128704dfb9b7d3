//! Shared run statistics with serialized increments.
//!
//! Every workflow mutates counters through [`StatsAggregator::increment`]; the
//! final [`StatsSnapshot`] is read only after the run supervisor has joined
//! all workflows, so it observes a quiescent aggregate.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Well-known counter keys emitted by the stage pipeline.
///
/// The key space is open: the aggregator accepts any `&'static str`, but the
/// stages and the final report agree on the names below.
pub mod keys {
    /// Case completed registration.
    pub const REGISTERED: &str = "registered";
    /// Case was assigned a priority by triage.
    pub const TRIAGED: &str = "triaged";
    /// Case received a diagnosis label.
    pub const DIAGNOSED: &str = "diagnosed";
    /// Case acquired a bed permit.
    pub const BED_ASSIGNED: &str = "bed_assigned";
    /// Case could not be given a bed.
    pub const NO_BED: &str = "no_bed";
    /// Case completed treatment while holding a bed.
    pub const TREATED: &str = "treated";
    /// Case needed an additional observation period.
    pub const OBSERVATION: &str = "observation";
    /// Case discharged.
    pub const DISCHARGED: &str = "discharged";
    /// Case discharged without ever completing treatment in a bed.
    pub const DISCHARGED_WITHOUT_BED: &str = "discharged_without_bed";
    /// Registration stage failed; fatal for the workflow.
    pub const ERROR_REGISTRATION: &str = "error_registration";
    /// Triage classification failed; fatal for the workflow.
    pub const ERROR_TRIAGE: &str = "error_triage";
    /// Diagnosis classification failed; the case continues degraded.
    pub const ERROR_DIAGNOSIS: &str = "error_diagnosis";
    /// Treatment failed while holding a bed; the case continues degraded.
    pub const ERROR_BED: &str = "error_bed";
    /// Follow-up failed at the last stage.
    pub const ERROR_FOLLOWUP: &str = "error_followup";
    /// Workflow cancelled during registration.
    pub const CANCELLED_REGISTRATION: &str = "cancelled_registration";
    /// Workflow cancelled while waiting for or holding a bed.
    pub const CANCELLED_BED: &str = "cancelled_bed";
    /// Workflow cancelled during follow-up or observation.
    pub const CANCELLED_FOLLOWUP: &str = "cancelled_followup";
    /// Workflow cancelled during a classification call.
    pub const CANCELLED_WORKFLOW: &str = "cancelled_workflow";
    /// Workflow task failed outside any stage's own handling.
    pub const UNKNOWN_ERROR: &str = "unknown_error";
}

/// Run-wide counter aggregate shared by every workflow.
///
/// Increments are serialized behind a single mutex; the guard is never held
/// across an await point, so contention stays bounded by the increment itself.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl StatsAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `key`.
    pub fn increment(&self, key: &'static str) {
        self.increment_by(key, 1);
    }

    /// Add `amount` to `key`, creating the counter on first use.
    pub fn increment_by(&self, key: &'static str, amount: u64) {
        let mut counts = self.counts.lock();
        let entry = counts.entry(key).or_insert(0);
        *entry += amount;
        debug!(key, value = *entry, "counter updated");
    }

    /// Copy the current counts.
    ///
    /// Concurrent increments are never lost, but a snapshot taken while
    /// workflows are still running may or may not include them; take it after
    /// every workflow has been joined.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            counts: self.counts.lock().clone(),
        }
    }
}

/// Immutable copy of the counter aggregate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    counts: HashMap<&'static str, u64>,
}

impl StatsSnapshot {
    /// Count recorded for `key`; zero when the counter never fired.
    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Sum of every `error_*` and `cancelled_*` counter plus `unknown_error`.
    #[must_use]
    pub fn errors_and_cancellations(&self) -> u64 {
        self.counts
            .iter()
            .filter(|(key, _)| {
                key.starts_with("error_")
                    || key.starts_with("cancelled_")
                    || **key == keys::UNKNOWN_ERROR
            })
            .map(|(_, count)| count)
            .sum()
    }

    /// Sum of every terminal-state counter.
    ///
    /// Each case lands in exactly one terminal counter, so after a full run
    /// this equals the number of cases spawned. Degraded counters
    /// (`error_diagnosis`, `error_bed`, `no_bed`) are not terminal and are
    /// excluded.
    #[must_use]
    pub fn total_terminal(&self) -> u64 {
        [
            keys::DISCHARGED,
            keys::ERROR_REGISTRATION,
            keys::ERROR_TRIAGE,
            keys::ERROR_FOLLOWUP,
            keys::CANCELLED_REGISTRATION,
            keys::CANCELLED_BED,
            keys::CANCELLED_FOLLOWUP,
            keys::CANCELLED_WORKFLOW,
            keys::UNKNOWN_ERROR,
        ]
        .iter()
        .map(|key| self.get(key))
        .sum()
    }

    /// True when no counter ever fired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Counters sorted by key, for deterministic rendering.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<_> = self.counts.iter().map(|(key, count)| (*key, *count)).collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }
}

/// Wall-clock durations of successful registrations.
///
/// Kept apart from the counter aggregate: durations feed the running average
/// logged by the registration stage and the latency summary in the final
/// report.
#[derive(Debug, Default)]
pub struct RegistrationLog {
    durations: Mutex<Vec<Duration>>,
}

impl RegistrationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one registration duration and return the running average.
    pub fn record(&self, took: Duration) -> Duration {
        let mut durations = self.durations.lock();
        durations.push(took);
        let total: Duration = durations.iter().sum();
        total / durations.len() as u32
    }

    /// Summary of everything recorded so far.
    #[must_use]
    pub fn stats(&self) -> RegistrationStats {
        let durations = self.durations.lock();
        if durations.is_empty() {
            return RegistrationStats::default();
        }
        let total: Duration = durations.iter().sum();
        RegistrationStats {
            count: durations.len(),
            average: total / durations.len() as u32,
            max: durations.iter().copied().max().unwrap_or_default(),
            min: durations.iter().copied().min().unwrap_or_default(),
        }
    }
}

/// Aggregate view of registration latencies for one run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegistrationStats {
    /// Number of completed registrations.
    pub count: usize,
    /// Mean registration duration.
    pub average: Duration,
    /// Slowest registration.
    pub max: Duration,
    /// Fastest registration.
    pub min: Duration,
}
