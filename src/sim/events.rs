//! Structured events emitted at every case state transition.
//!
//! The core only produces `{case_id, stage, severity, message}` tuples;
//! rendering (colors, layout, localization) belongs to whatever consumes the
//! sink.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::case::CaseId;
use crate::util::clock::now_ms;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Admission and registration.
    Registration,
    /// Priority classification.
    Triage,
    /// Diagnosis classification.
    Diagnosis,
    /// Bed acquisition.
    Bed,
    /// In-bed treatment.
    Treatment,
    /// Post-treatment follow-up and observation.
    FollowUp,
    /// Final discharge.
    Discharge,
    /// Run-level events outside a single stage.
    Simulation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Registration => "registration",
            Self::Triage => "triage",
            Self::Diagnosis => "diagnosis",
            Self::Bed => "bed",
            Self::Treatment => "treatment",
            Self::FollowUp => "follow_up",
            Self::Discharge => "discharge",
            Self::Simulation => "simulation",
        };
        f.write_str(name)
    }
}

/// How loud an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Normal progress.
    Info,
    /// Degraded or halted progress.
    Warn,
    /// Stage failure.
    Error,
}

/// One structured transition event.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    /// Case the event belongs to.
    pub case_id: CaseId,
    /// Stage that produced the event.
    pub stage: Stage,
    /// Event loudness.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Milliseconds since the Unix epoch at emission.
    pub at_ms: u128,
}

impl StageEvent {
    /// Build an event stamped with the current time.
    pub fn new(
        case_id: CaseId,
        stage: Stage,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            case_id,
            stage,
            severity,
            message: message.into(),
            at_ms: now_ms(),
        }
    }
}

/// Destination for stage events.
pub trait EventSink: Send + Sync {
    /// Consume one event.
    fn emit(&self, event: StageEvent);
}

/// Sink that forwards events to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create the sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: StageEvent) {
        match event.severity {
            Severity::Info => {
                tracing::info!(case = %event.case_id, stage = %event.stage, "{}", event.message);
            }
            Severity::Warn => {
                tracing::warn!(case = %event.case_id, stage = %event.stage, "{}", event.message);
            }
            Severity::Error => {
                tracing::error!(case = %event.case_id, stage = %event.stage, "{}", event.message);
            }
        }
    }
}

/// Sink that buffers events in memory, mainly for tests and inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<StageEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: StageEvent) {
        self.events.lock().push(event);
    }
}
