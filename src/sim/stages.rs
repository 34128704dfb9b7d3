//! Stage implementations for the case pipeline.
//!
//! Every stage takes the case by value and hands it back mutated, increments
//! exactly one success or failure counter, and observes the cancellation
//! token at each of its suspension points. A stage that holds a bed releases
//! it on every exit path through the permit's drop.

use std::fmt;
use std::ops::Range;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::FailureRates;
use crate::core::beds::BedPool;
use crate::core::case::{CaseRecord, CaseState};
use crate::core::classifier::ClassifierPort;
use crate::core::stats::{keys, RegistrationLog, StatsAggregator};
use crate::sim::events::{EventSink, Severity, Stage, StageEvent};

const REGISTRATION_LATENCY: Range<f64> = 0.5..2.0;
const TREATMENT_TIME: Range<f64> = 2.0..5.0;
const FOLLOW_UP_LATENCY: Range<f64> = 1.0..3.0;
const OBSERVATION_TIME: Range<f64> = 1.0..3.0;
const ARRIVAL_GAP: Range<f64> = 0.1..0.5;

/// Latency sampling in simulated seconds, scaled by the run's time scale.
#[derive(Debug, Clone, Copy)]
pub struct SimTiming {
    scale: f64,
}

impl SimTiming {
    /// Timing with the given scale; `1.0` means wall-clock seconds.
    #[must_use]
    pub const fn new(scale: f64) -> Self {
        Self { scale }
    }

    fn sample(self, rng: &mut StdRng, range: Range<f64>) -> Duration {
        Duration::from_secs_f64(rng.random_range(range) * self.scale)
    }

    /// Registration latency draw.
    pub fn registration(self, rng: &mut StdRng) -> Duration {
        self.sample(rng, REGISTRATION_LATENCY)
    }

    /// Treatment duration draw.
    pub fn treatment(self, rng: &mut StdRng) -> Duration {
        self.sample(rng, TREATMENT_TIME)
    }

    /// Follow-up latency draw.
    pub fn follow_up(self, rng: &mut StdRng) -> Duration {
        self.sample(rng, FOLLOW_UP_LATENCY)
    }

    /// Additional observation duration draw.
    pub fn observation(self, rng: &mut StdRng) -> Duration {
        self.sample(rng, OBSERVATION_TIME)
    }

    /// Gap between consecutive case arrivals.
    pub fn arrival_gap(self, rng: &mut StdRng) -> Duration {
        self.sample(rng, ARRIVAL_GAP)
    }
}

/// Shared collaborators handed to every stage call.
pub struct StageContext<'a> {
    /// Run-wide counters.
    pub stats: &'a StatsAggregator,
    /// Shared bed pool.
    pub beds: &'a BedPool,
    /// Classification boundary.
    pub classifier: &'a dyn ClassifierPort,
    /// Event destination.
    pub events: &'a dyn EventSink,
    /// Registration duration log.
    pub registration_log: &'a RegistrationLog,
    /// Cooperative cancellation signal for this workflow.
    pub cancel: &'a CancellationToken,
    /// Scaled latency sampling.
    pub timing: SimTiming,
    /// Injected fault probabilities.
    pub failure: FailureRates,
}

impl StageContext<'_> {
    fn emit(&self, case: &CaseRecord, stage: Stage, severity: Severity, message: impl Into<String>) {
        self.events
            .emit(StageEvent::new(case.id, stage, severity, message));
    }

    fn fail(&self, mut case: CaseRecord, state: CaseState, stage: Stage, message: &str) -> CaseRecord {
        case.state = state;
        self.stats.increment(state.as_str());
        self.emit(&case, stage, Severity::Error, message);
        case
    }

    fn cancelled(&self, mut case: CaseRecord, state: CaseState, stage: Stage) -> CaseRecord {
        case.state = state;
        self.stats.increment(state.as_str());
        self.emit(&case, stage, Severity::Warn, format!("{stage} cancelled"));
        case
    }

    fn roll(&self, rng: &mut StdRng, rate: f64) -> bool {
        rate > 0.0 && rng.random_bool(rate.clamp(0.0, 1.0))
    }
}

/// Register an arriving case, simulating admission backend latency.
///
/// Failure here is fatal for the workflow.
pub async fn register(mut case: CaseRecord, ctx: &StageContext<'_>, rng: &mut StdRng) -> CaseRecord {
    ctx.emit(&case, Stage::Registration, Severity::Info, "registering case");
    let started = Instant::now();
    let wait = ctx.timing.registration(rng);
    tokio::select! {
        () = ctx.cancel.cancelled() => {
            return ctx.cancelled(case, CaseState::CancelledRegistration, Stage::Registration);
        }
        () = tokio::time::sleep(wait) => {}
    }
    if ctx.roll(rng, ctx.failure.registration) {
        return ctx.fail(
            case,
            CaseState::ErrorRegistration,
            Stage::Registration,
            "registration backend fault",
        );
    }
    let took = started.elapsed();
    let average = ctx.registration_log.record(took);
    case.state = CaseState::Registered;
    ctx.stats.increment(keys::REGISTERED);
    ctx.emit(
        &case,
        Stage::Registration,
        Severity::Info,
        format!(
            "registered in {:.2}s (avg {:.2}s)",
            took.as_secs_f64(),
            average.as_secs_f64()
        ),
    );
    case
}

/// Classify case priority on the worker pool.
///
/// Failure here is fatal for the workflow.
pub async fn triage(mut case: CaseRecord, ctx: &StageContext<'_>) -> CaseRecord {
    ctx.emit(&case, Stage::Triage, Severity::Info, "starting triage");
    let classify = ctx.classifier.classify_priority(case.symptoms.as_features());
    let outcome = tokio::select! {
        () = ctx.cancel.cancelled() => {
            return ctx.cancelled(case, CaseState::CancelledWorkflow, Stage::Triage);
        }
        outcome = classify => outcome,
    };
    match outcome {
        Ok(priority) => {
            ctx.emit(&case, Stage::Triage, Severity::Info, format!("priority {priority}"));
            case.priority = Some(priority);
            case.state = CaseState::Triaged;
            ctx.stats.increment(keys::TRIAGED);
            case
        }
        Err(err) => ctx.fail(
            case,
            CaseState::ErrorTriage,
            Stage::Triage,
            &format!("triage classification failed: {err}"),
        ),
    }
}

/// Classify a diagnosis on the worker pool.
///
/// Failure degrades the case; later stages still run.
pub async fn diagnose(mut case: CaseRecord, ctx: &StageContext<'_>) -> CaseRecord {
    ctx.emit(&case, Stage::Diagnosis, Severity::Info, "starting diagnosis");
    let classify = ctx.classifier.classify_diagnosis(case.symptoms.as_features());
    let outcome = tokio::select! {
        () = ctx.cancel.cancelled() => {
            return ctx.cancelled(case, CaseState::CancelledWorkflow, Stage::Diagnosis);
        }
        outcome = classify => outcome,
    };
    match outcome {
        Ok(diagnosis) => {
            ctx.emit(&case, Stage::Diagnosis, Severity::Info, format!("diagnosis: {diagnosis}"));
            case.diagnosis = Some(diagnosis);
            case.state = CaseState::Diagnosed;
            ctx.stats.increment(keys::DIAGNOSED);
            case
        }
        Err(err) => ctx.fail(
            case,
            CaseState::ErrorDiagnosis,
            Stage::Diagnosis,
            &format!("diagnosis classification failed: {err}"),
        ),
    }
}

/// Acquire a bed and run treatment while holding it.
///
/// Cancellation while waiting never claims a bed; failure or cancellation
/// during treatment releases the bed before the stage returns. A closed pool
/// degrades the case to the bed-less path.
pub async fn assign_bed(mut case: CaseRecord, ctx: &StageContext<'_>, rng: &mut StdRng) -> CaseRecord {
    ctx.emit(&case, Stage::Bed, Severity::Info, "waiting for a free bed");
    let acquired = tokio::select! {
        () = ctx.cancel.cancelled() => {
            return ctx.cancelled(case, CaseState::CancelledBed, Stage::Bed);
        }
        acquired = ctx.beds.acquire() => acquired,
    };
    let Ok(_bed) = acquired else {
        case.state = CaseState::NoBed;
        ctx.stats.increment(keys::NO_BED);
        ctx.emit(
            &case,
            Stage::Bed,
            Severity::Warn,
            "no bed available, continuing without one",
        );
        return case;
    };
    case.state = CaseState::BedAssigned;
    ctx.stats.increment(keys::BED_ASSIGNED);
    ctx.emit(&case, Stage::Bed, Severity::Info, "bed assigned, treatment starting");

    let treatment = ctx.timing.treatment(rng);
    tokio::select! {
        () = ctx.cancel.cancelled() => {
            return ctx.cancelled(case, CaseState::CancelledBed, Stage::Treatment);
        }
        () = tokio::time::sleep(treatment) => {}
    }
    if ctx.roll(rng, ctx.failure.bed) {
        return ctx.fail(
            case,
            CaseState::ErrorBed,
            Stage::Treatment,
            "treatment fault, bed released",
        );
    }
    case.got_bed = true;
    case.state = CaseState::Treated;
    ctx.stats.increment(keys::TREATED);
    ctx.emit(
        &case,
        Stage::Treatment,
        Severity::Info,
        format!("treatment completed in {:.1}s", treatment.as_secs_f64()),
    );
    case
}

/// Post-treatment follow-up, optional observation, and discharge.
///
/// Failure lands in the `error_followup` terminal; cancellation maps to
/// `cancelled_followup`.
pub async fn follow_up(mut case: CaseRecord, ctx: &StageContext<'_>, rng: &mut StdRng) -> CaseRecord {
    ctx.emit(&case, Stage::FollowUp, Severity::Info, "starting follow-up");
    let wait = ctx.timing.follow_up(rng);
    tokio::select! {
        () = ctx.cancel.cancelled() => {
            return ctx.cancelled(case, CaseState::CancelledFollowup, Stage::FollowUp);
        }
        () = tokio::time::sleep(wait) => {}
    }
    if ctx.roll(rng, ctx.failure.follow_up) {
        return ctx.fail(
            case,
            CaseState::ErrorFollowup,
            Stage::FollowUp,
            "follow-up check failed",
        );
    }
    let outcome = FollowUpOutcome::sample(rng);
    ctx.emit(
        &case,
        Stage::FollowUp,
        Severity::Info,
        format!("follow-up result after {:.1}s: {outcome}", wait.as_secs_f64()),
    );
    if outcome == FollowUpOutcome::NeedsObservation {
        case.state = CaseState::Observation;
        ctx.stats.increment(keys::OBSERVATION);
        let observation = ctx.timing.observation(rng);
        ctx.emit(
            &case,
            Stage::FollowUp,
            Severity::Info,
            format!("additional observation for {:.1}s", observation.as_secs_f64()),
        );
        tokio::select! {
            () = ctx.cancel.cancelled() => {
                return ctx.cancelled(case, CaseState::CancelledFollowup, Stage::FollowUp);
            }
            () = tokio::time::sleep(observation) => {}
        }
    }
    case.state = CaseState::Discharged;
    ctx.stats.increment(keys::DISCHARGED);
    if !case.got_bed {
        ctx.stats.increment(keys::DISCHARGED_WITHOUT_BED);
    }
    ctx.emit(&case, Stage::Discharge, Severity::Info, "discharged");
    case
}

/// Result of the follow-up check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpOutcome {
    /// Case is stable; discharge directly.
    Stable,
    /// Case is improving; discharge directly.
    Improving,
    /// Case needs an extra observation period before discharge.
    NeedsObservation,
}

impl FollowUpOutcome {
    /// Draw an outcome: 40% stable, 40% improving, 20% observation.
    pub fn sample(rng: &mut StdRng) -> Self {
        let roll: f64 = rng.random();
        if roll < 0.4 {
            Self::Stable
        } else if roll < 0.8 {
            Self::Improving
        } else {
            Self::NeedsObservation
        }
    }
}

impl fmt::Display for FollowUpOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stable => "stable",
            Self::Improving => "improving",
            Self::NeedsObservation => "needs observation",
        };
        f.write_str(label)
    }
}
