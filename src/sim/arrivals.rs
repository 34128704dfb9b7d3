//! Staggered case arrivals.
//!
//! The generator fires workflow tasks and forgets them; only the returned
//! join handles tie the run supervisor back to the detached cases.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::case::{CaseId, CaseRecord, Symptoms};
use crate::sim::events::{EventSink, Severity, Stage, StageEvent};
use crate::sim::stages::SimTiming;
use crate::sim::workflow::{CaseOutcome, CaseWorkflow};

/// Spawns one detached workflow task per arriving case.
pub struct ArrivalGenerator {
    count: u64,
    seed: u64,
    timing: SimTiming,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl ArrivalGenerator {
    /// Generator producing `count` sequentially numbered cases from `seed`.
    pub fn new(
        count: u64,
        seed: u64,
        timing: SimTiming,
        events: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            count,
            seed,
            timing,
            events,
            cancel,
        }
    }

    /// Spawn every case task, sleeping a sampled gap between arrivals.
    ///
    /// Cancellation stops further arrivals immediately; workflows already
    /// spawned keep running until their own cancel checks fire.
    pub async fn spawn_all(
        &self,
        workflow: &Arc<CaseWorkflow>,
    ) -> Vec<(CaseId, JoinHandle<CaseOutcome>)> {
        let mut gap_rng = StdRng::seed_from_u64(self.seed);
        let mut handles = Vec::with_capacity(usize::try_from(self.count).unwrap_or_default());
        for seq in 1..=self.count {
            if self.cancel.is_cancelled() {
                info!(spawned = handles.len(), "arrivals stopped by cancellation");
                break;
            }
            let id = CaseId(seq);
            let case = CaseRecord::new(id, Symptoms::sample(&mut gap_rng));
            self.events
                .emit(StageEvent::new(id, Stage::Simulation, Severity::Info, "case arrived"));
            // Distinct RNG stream per case keeps each workflow deterministic
            // under any task interleaving.
            let case_rng = StdRng::seed_from_u64(
                self.seed
                    .wrapping_add(seq.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            );
            let task_workflow = Arc::clone(workflow);
            handles.push((
                id,
                tokio::spawn(async move { task_workflow.run(case, case_rng).await }),
            ));
            if seq < self.count {
                let gap = self.timing.arrival_gap(&mut gap_rng);
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = tokio::time::sleep(gap) => {}
                }
            }
        }
        handles
    }
}
