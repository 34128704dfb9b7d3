//! Case records and the per-case state machine.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::stats::keys;

/// Unique sequential identifier assigned to a case at arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-shape symptom indicators carried by every case.
///
/// Field order matches the feature order classifiers expect, see
/// [`Symptoms::as_features`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symptoms {
    /// Fever present.
    pub fever: bool,
    /// Cough present.
    pub cough: bool,
    /// Pain present.
    pub pain: bool,
    /// Fatigue present.
    pub fatigue: bool,
    /// Difficulty breathing.
    pub short_breath: bool,
}

impl Symptoms {
    /// Sample a random symptom set for a synthetic case.
    pub fn sample(rng: &mut impl Rng) -> Self {
        Self {
            fever: rng.random(),
            cough: rng.random(),
            pain: rng.random(),
            fatigue: rng.random(),
            short_breath: rng.random(),
        }
    }

    /// Feature vector in classifier order: fever, cough, pain, fatigue,
    /// breathing.
    #[must_use]
    pub fn as_features(&self) -> [u8; 5] {
        [
            u8::from(self.fever),
            u8::from(self.cough),
            u8::from(self.pain),
            u8::from(self.fatigue),
            u8::from(self.short_breath),
        ]
    }
}

/// Closed set of triage priority labels, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Needs immediate attention.
    Critical,
    /// Urgent.
    High,
    /// Standard queue.
    Medium,
    /// Can safely wait.
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(label)
    }
}

/// Opaque diagnosis label produced by the classification boundary.
///
/// The simulation core never branches on the label; it only records and
/// displays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis(String);

impl Diagnosis {
    /// Wrap a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The raw label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of workflow states a case moves through.
///
/// Healthy progression is registered, triaged, diagnosed, bed assigned (or no
/// bed), treated, optionally observation, discharged. Registration and triage
/// errors halt the workflow; diagnosis, bed, and follow-up issues degrade the
/// case but let later stages run. Every cancelled state halts the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    /// Admission recorded.
    Registered,
    /// Priority assigned by triage.
    Triaged,
    /// Diagnosis label assigned.
    Diagnosed,
    /// Bed permit acquired, treatment underway.
    BedAssigned,
    /// No bed could be granted; the case continues without one.
    NoBed,
    /// Treatment completed while holding a bed.
    Treated,
    /// Additional observation underway after follow-up.
    Observation,
    /// Final healthy terminal state.
    Discharged,
    /// Registration failed; fatal.
    ErrorRegistration,
    /// Triage classification failed; fatal.
    ErrorTriage,
    /// Diagnosis classification failed; the case continues degraded.
    ErrorDiagnosis,
    /// Treatment failed while holding a bed; the case continues degraded.
    ErrorBed,
    /// Follow-up failed at the final stage.
    ErrorFollowup,
    /// Cancelled during registration.
    CancelledRegistration,
    /// Cancelled while waiting for or holding a bed.
    CancelledBed,
    /// Cancelled during follow-up or observation.
    CancelledFollowup,
    /// Cancelled during a classification call.
    CancelledWorkflow,
    /// The workflow task failed outside any stage's own handling.
    UnknownError,
}

impl CaseState {
    /// Stable snake_case name, also used as the stats counter key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => keys::REGISTERED,
            Self::Triaged => keys::TRIAGED,
            Self::Diagnosed => keys::DIAGNOSED,
            Self::BedAssigned => keys::BED_ASSIGNED,
            Self::NoBed => keys::NO_BED,
            Self::Treated => keys::TREATED,
            Self::Observation => keys::OBSERVATION,
            Self::Discharged => keys::DISCHARGED,
            Self::ErrorRegistration => keys::ERROR_REGISTRATION,
            Self::ErrorTriage => keys::ERROR_TRIAGE,
            Self::ErrorDiagnosis => keys::ERROR_DIAGNOSIS,
            Self::ErrorBed => keys::ERROR_BED,
            Self::ErrorFollowup => keys::ERROR_FOLLOWUP,
            Self::CancelledRegistration => keys::CANCELLED_REGISTRATION,
            Self::CancelledBed => keys::CANCELLED_BED,
            Self::CancelledFollowup => keys::CANCELLED_FOLLOWUP,
            Self::CancelledWorkflow => keys::CANCELLED_WORKFLOW,
            Self::UnknownError => keys::UNKNOWN_ERROR,
        }
    }

    /// True for states the workflow never advances past.
    ///
    /// The degraded states (`ErrorDiagnosis`, `ErrorBed`, `NoBed`) are not
    /// terminal: later stages still run and overwrite them.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Discharged
                | Self::ErrorRegistration
                | Self::ErrorTriage
                | Self::ErrorFollowup
                | Self::CancelledRegistration
                | Self::CancelledBed
                | Self::CancelledFollowup
                | Self::CancelledWorkflow
                | Self::UnknownError
        )
    }

    /// True for the cancellation family of terminal states.
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(
            self,
            Self::CancelledRegistration
                | Self::CancelledBed
                | Self::CancelledFollowup
                | Self::CancelledWorkflow
        )
    }

    /// True for non-fatal failure states the workflow continues through.
    ///
    /// `ErrorFollowup` is also non-fatal but occurs at the last stage, so it
    /// lands in the terminal set instead.
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::ErrorDiagnosis | Self::ErrorBed | Self::NoBed)
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulated case flowing through the admission pipeline.
///
/// A record is owned by exactly one workflow task and dropped once a terminal
/// state is reached; cross-case coordination happens only through the shared
/// bed pool and stats aggregator.
#[derive(Debug)]
pub struct CaseRecord {
    /// Sequential case identifier.
    pub id: CaseId,
    /// Symptom indicators sampled at arrival.
    pub symptoms: Symptoms,
    /// Priority label, set by the triage stage.
    pub priority: Option<Priority>,
    /// Diagnosis label, set by the diagnosis stage.
    pub diagnosis: Option<Diagnosis>,
    /// Current workflow state.
    pub state: CaseState,
    /// Whether the case completed treatment in a bed.
    pub got_bed: bool,
}

impl CaseRecord {
    /// Create a freshly arrived case.
    #[must_use]
    pub fn new(id: CaseId, symptoms: Symptoms) -> Self {
        Self {
            id,
            symptoms,
            priority: None,
            diagnosis: None,
            state: CaseState::Registered,
            got_bed: false,
        }
    }
}
