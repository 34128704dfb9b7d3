//! Run supervisor: builds the shared collaborators, launches arrivals, and
//! joins every case into a final report.

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ConfigError, RunConfig};
use crate::core::beds::BedPool;
use crate::core::classifier::{ClassifierError, ClassifierPort, RuleClassifier};
use crate::core::classifier_pool::ClassifierPool;
use crate::core::stats::{keys, StatsAggregator};
use crate::report::RunReport;
use crate::sim::arrivals::ArrivalGenerator;
use crate::sim::events::{EventSink, TracingSink};
use crate::sim::stages::SimTiming;
use crate::sim::workflow::{CaseOutcome, CaseWorkflow};

/// Errors that prevent a run from starting.
///
/// Once cases are in flight nothing aborts the run; stage failures become
/// case states and task failures become `unknown_error` outcomes.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The classifier pool could not be built.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// One configured simulation run.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: RunConfig,
}

impl Simulation {
    /// Validate `config` and wrap it in a runnable simulation.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] naming the first invalid field.
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run to completion with no external cancellation.
    ///
    /// # Errors
    ///
    /// [`SimError`] only for startup failures; see [`Self::run_with_cancel`].
    pub async fn run(&self) -> Result<RunReport, SimError> {
        self.run_with_cancel(CancellationToken::new()).await
    }

    /// Run until every spawned case terminates or `cancel` stops the run.
    ///
    /// Cancellation is cooperative: arrivals stop, in-flight cases settle in
    /// a cancelled state at their next check, and the report covers whatever
    /// was spawned.
    ///
    /// # Errors
    ///
    /// [`SimError::Classifier`] when the classifier pool cannot spawn its
    /// workers.
    pub async fn run_with_cancel(&self, cancel: CancellationToken) -> Result<RunReport, SimError> {
        let started = Instant::now();
        info!(
            cases = self.config.case_count,
            beds = self.config.bed_capacity,
            workers = self.config.classifier.workers,
            "simulation starting"
        );

        let stats = Arc::new(StatsAggregator::new());
        let beds = Arc::new(BedPool::new(self.config.bed_capacity));
        let classifier = RuleClassifier::new()
            .with_priority_failure_rate(self.config.failure_rates.triage)
            .with_diagnosis_failure_rate(self.config.failure_rates.diagnosis);
        let pool = Arc::new(ClassifierPool::new(&self.config.classifier, classifier)?);
        let port: Arc<dyn ClassifierPort> = pool.clone();
        let events: Arc<dyn EventSink> = Arc::new(TracingSink::new());
        let workflow = Arc::new(CaseWorkflow::new(
            &self.config,
            Arc::clone(&stats),
            Arc::clone(&beds),
            port,
            Arc::clone(&events),
            cancel.clone(),
        ));

        // Late bed waiters fail over to the bed-less path once the run is
        // cancelled, instead of queueing on a pool nobody will drain.
        let bed_closer = {
            let beds = Arc::clone(&beds);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                beds.close();
            })
        };

        let seed = self.config.rng_seed.unwrap_or_else(|| rand::rng().random());
        let arrivals = ArrivalGenerator::new(
            self.config.case_count,
            seed,
            SimTiming::new(self.config.time_scale),
            Arc::clone(&events),
            cancel.clone(),
        );
        let handles = arrivals.spawn_all(&workflow).await;

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    // A dead workflow task is accounted for here; its
                    // siblings keep running.
                    error!(case = %id, error = %err, "workflow task failed");
                    stats.increment(keys::UNKNOWN_ERROR);
                    outcomes.push(CaseOutcome::unknown_error(id));
                }
            }
        }

        bed_closer.abort();
        pool.shutdown();

        let elapsed = started.elapsed();
        let snapshot = stats.snapshot();
        info!(
            cases = outcomes.len(),
            faults = snapshot.errors_and_cancellations(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "simulation complete"
        );
        Ok(RunReport {
            snapshot,
            outcomes,
            registration: workflow.registration_log().stats(),
            elapsed,
        })
    }
}
