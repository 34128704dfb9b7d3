//! Simulation layer: staggered arrivals, the per-case stage pipeline, and
//! the run supervisor that joins everything into a report.

pub mod arrivals;
pub mod events;
pub mod stages;
pub mod supervisor;
pub mod workflow;

pub use arrivals::ArrivalGenerator;
pub use events::{EventSink, MemorySink, Severity, Stage, StageEvent, TracingSink};
pub use stages::{FollowUpOutcome, SimTiming, StageContext};
pub use supervisor::{SimError, Simulation};
pub use workflow::{CaseOutcome, CaseWorkflow};
