//! Final run report and its fixed-width text rendering.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::core::stats::{keys, RegistrationStats, StatsSnapshot};
use crate::sim::workflow::CaseOutcome;

const TABLE_WIDTH: usize = 60;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Final counter aggregate.
    pub snapshot: StatsSnapshot,
    /// Per-case terminal summaries, in arrival order.
    pub outcomes: Vec<CaseOutcome>,
    /// Registration latency summary.
    pub registration: RegistrationStats,
    /// Wall-clock duration of the whole run.
    pub elapsed: Duration,
}

impl RunReport {
    /// Render the summary table printed at the end of a run.
    ///
    /// Success counters appear in pipeline order; fault counters appear
    /// sorted by name and only when observed.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let edge = "=".repeat(TABLE_WIDTH);
        let _ = writeln!(out, "{edge}");
        let _ = writeln!(out, "{:^TABLE_WIDTH$}", "FINAL RUN STATISTICS");
        let _ = writeln!(out, "{edge}");
        for (label, key) in [
            ("Registered", keys::REGISTERED),
            ("Triaged", keys::TRIAGED),
            ("Diagnosed", keys::DIAGNOSED),
            ("Beds assigned", keys::BED_ASSIGNED),
            ("Treatments completed", keys::TREATED),
            ("Observation stays", keys::OBSERVATION),
            ("Discharged", keys::DISCHARGED),
            ("Discharged without a bed", keys::DISCHARGED_WITHOUT_BED),
        ] {
            let value = self.snapshot.get(key);
            let _ = writeln!(out, "| {label:<38} {value:>17} |");
        }
        let _ = writeln!(out, "{}", "-".repeat(TABLE_WIDTH));
        for (key, count) in self.snapshot.sorted() {
            if Self::is_fault_key(key) {
                let _ = writeln!(out, "| {key:<38} {count:>17} |");
            }
        }
        let faults = self.snapshot.errors_and_cancellations();
        let _ = writeln!(out, "| {:<38} {faults:>17} |", "Cases with errors or cancellations");
        if self.registration.count > 0 {
            let average = self.registration.average.as_secs_f64();
            let _ = writeln!(out, "| {:<38} {average:>16.2}s |", "Average registration time");
        }
        let _ = writeln!(out, "{edge}");
        let _ = writeln!(out, "Total wall-clock time: {:.2}s", self.elapsed.as_secs_f64());
        out
    }

    fn is_fault_key(key: &str) -> bool {
        key.starts_with("error_")
            || key.starts_with("cancelled_")
            || key == keys::UNKNOWN_ERROR
            || key == keys::NO_BED
    }
}
