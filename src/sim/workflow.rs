//! Per-case workflow: drives a record through every stage in order.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{FailureRates, RunConfig};
use crate::core::beds::BedPool;
use crate::core::case::{CaseId, CaseRecord, CaseState, Diagnosis, Priority};
use crate::core::classifier::ClassifierPort;
use crate::core::stats::{RegistrationLog, StatsAggregator};
use crate::sim::events::{EventSink, Severity, Stage, StageEvent};
use crate::sim::stages::{self, SimTiming, StageContext};

/// Terminal summary of one case, returned by the workflow task.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    /// Case identifier.
    pub id: CaseId,
    /// Terminal state the case ended in.
    pub state: CaseState,
    /// Priority assigned by triage, if that stage completed.
    pub priority: Option<Priority>,
    /// Diagnosis label, if that stage completed.
    pub diagnosis: Option<Diagnosis>,
    /// Whether treatment completed while holding a bed.
    pub got_bed: bool,
}

impl CaseOutcome {
    fn from_case(case: CaseRecord) -> Self {
        Self {
            id: case.id,
            state: case.state,
            priority: case.priority,
            diagnosis: case.diagnosis,
            got_bed: case.got_bed,
        }
    }

    /// Outcome substituted when a workflow task dies outside its own error
    /// handling, for example by panicking.
    #[must_use]
    pub const fn unknown_error(id: CaseId) -> Self {
        Self {
            id,
            state: CaseState::UnknownError,
            priority: None,
            diagnosis: None,
            got_bed: false,
        }
    }
}

/// Shared pipeline driver for every case task in a run.
///
/// The workflow itself is immutable; all mutable state lives in the shared
/// collaborators (stats, bed pool, registration log) or in the case record a
/// task owns.
pub struct CaseWorkflow {
    stats: Arc<StatsAggregator>,
    beds: Arc<BedPool>,
    classifier: Arc<dyn ClassifierPort>,
    events: Arc<dyn EventSink>,
    registration_log: Arc<RegistrationLog>,
    cancel: CancellationToken,
    timing: SimTiming,
    failure: FailureRates,
}

impl CaseWorkflow {
    /// Wire a workflow over the run's shared collaborators.
    pub fn new(
        config: &RunConfig,
        stats: Arc<StatsAggregator>,
        beds: Arc<BedPool>,
        classifier: Arc<dyn ClassifierPort>,
        events: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stats,
            beds,
            classifier,
            events,
            registration_log: Arc::new(RegistrationLog::new()),
            cancel,
            timing: SimTiming::new(config.time_scale),
            failure: config.failure_rates,
        }
    }

    /// Registration latency log for this run.
    #[must_use]
    pub fn registration_log(&self) -> &RegistrationLog {
        &self.registration_log
    }

    fn context(&self) -> StageContext<'_> {
        StageContext {
            stats: self.stats.as_ref(),
            beds: self.beds.as_ref(),
            classifier: self.classifier.as_ref(),
            events: self.events.as_ref(),
            registration_log: self.registration_log.as_ref(),
            cancel: &self.cancel,
            timing: self.timing,
            failure: self.failure,
        }
    }

    /// Drive one case to a terminal state and summarize it.
    ///
    /// Stages run strictly in order; the pipeline halts at the first stage
    /// that leaves the case terminal. Degraded states pass through so a case
    /// without a diagnosis or a bed still reaches follow-up.
    pub async fn run(&self, case: CaseRecord, mut rng: StdRng) -> CaseOutcome {
        let started = Instant::now();
        self.emit(&case, Severity::Info, "workflow starting".to_string());
        let ctx = self.context();

        let case = stages::register(case, &ctx, &mut rng).await;
        if case.state.is_terminal() {
            return self.halt(case, started);
        }
        let case = stages::triage(case, &ctx).await;
        if case.state.is_terminal() {
            return self.halt(case, started);
        }
        let case = stages::diagnose(case, &ctx).await;
        if case.state.is_terminal() {
            return self.halt(case, started);
        }
        let case = stages::assign_bed(case, &ctx, &mut rng).await;
        if case.state.is_terminal() {
            return self.halt(case, started);
        }
        let case = stages::follow_up(case, &ctx, &mut rng).await;
        self.finish(case, started)
    }

    fn emit(&self, case: &CaseRecord, severity: Severity, message: String) {
        self.events
            .emit(StageEvent::new(case.id, Stage::Simulation, severity, message));
    }

    fn halt(&self, case: CaseRecord, started: Instant) -> CaseOutcome {
        self.emit(
            &case,
            Severity::Warn,
            format!(
                "workflow halted in state {} after {:.2}s",
                case.state,
                started.elapsed().as_secs_f64()
            ),
        );
        CaseOutcome::from_case(case)
    }

    fn finish(&self, case: CaseRecord, started: Instant) -> CaseOutcome {
        let severity = if case.state == CaseState::Discharged {
            Severity::Info
        } else {
            Severity::Warn
        };
        self.emit(
            &case,
            severity,
            format!(
                "workflow completed in state {} after {:.2}s",
                case.state,
                started.elapsed().as_secs_f64()
            ),
        );
        CaseOutcome::from_case(case)
    }
}
