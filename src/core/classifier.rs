//! Classification boundary consumed by the triage and diagnosis stages.
//!
//! [`Classifier`] is the synchronous, CPU-bound decision procedure.
//! [`ClassifierPort`] is what workflows actually call; implementations are
//! expected to run the classifier somewhere that cannot stall the cooperative
//! scheduler, see [`ClassifierPool`](crate::core::classifier_pool::ClassifierPool).

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

use crate::core::case::{Diagnosis, Priority};

/// Errors produced by classification calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// The decision procedure itself failed.
    #[error("classification failed: {0}")]
    Failed(String),
    /// The pool's job queue is at capacity.
    #[error("classifier queue is full")]
    QueueFull,
    /// The worker executing the job went away before replying.
    #[error("classifier worker unavailable")]
    WorkerGone,
    /// The pool has been shut down.
    #[error("classifier pool is shut down")]
    PoolClosed,
    /// Pool configuration failed validation.
    #[error("invalid classifier pool configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn classifier worker: {0}")]
    Spawn(String),
}

/// Synchronous decision procedure mapping feature vectors to labels.
///
/// Implementations are invoked from dedicated worker threads and may burn CPU
/// freely; they must never block on the async runtime.
pub trait Classifier: Send + Sync + 'static {
    /// Assign a priority label to a feature vector.
    ///
    /// # Errors
    ///
    /// [`ClassifierError::Failed`] when the procedure cannot produce a label.
    fn classify_priority(&self, features: [u8; 5]) -> Result<Priority, ClassifierError>;

    /// Assign a diagnosis label to a feature vector.
    ///
    /// # Errors
    ///
    /// [`ClassifierError::Failed`] when the procedure cannot produce a label.
    fn classify_diagnosis(&self, features: [u8; 5]) -> Result<Diagnosis, ClassifierError>;
}

/// Async boundary workflows use to request classification.
///
/// The production implementation offloads to a bounded worker-thread pool;
/// tests substitute in-place ports.
#[async_trait]
pub trait ClassifierPort: Send + Sync {
    /// Classify priority for `features`, suspending only the calling workflow.
    ///
    /// # Errors
    ///
    /// Any [`ClassifierError`], including transport failures from the port
    /// implementation.
    async fn classify_priority(&self, features: [u8; 5]) -> Result<Priority, ClassifierError>;

    /// Classify diagnosis for `features`, suspending only the calling
    /// workflow.
    ///
    /// # Errors
    ///
    /// Any [`ClassifierError`], including transport failures from the port
    /// implementation.
    async fn classify_diagnosis(&self, features: [u8; 5]) -> Result<Diagnosis, ClassifierError>;
}

/// Decision-tree style rule classifier used by default in simulation runs.
///
/// Breathing trouble together with fever is critical, fever with cough is
/// high, pain with fatigue is medium, anything else is low. Optional per-call
/// failure rates let runs exercise the error branches of the triage and
/// diagnosis stages.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    priority_failure_rate: f64,
    diagnosis_failure_rate: f64,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleClassifier {
    /// Classifier that never fails.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            priority_failure_rate: 0.0,
            diagnosis_failure_rate: 0.0,
        }
    }

    /// Probability in `[0, 1]` that a priority call fails.
    #[must_use]
    pub fn with_priority_failure_rate(mut self, rate: f64) -> Self {
        self.priority_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Probability in `[0, 1]` that a diagnosis call fails.
    #[must_use]
    pub fn with_diagnosis_failure_rate(mut self, rate: f64) -> Self {
        self.diagnosis_failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn rule(features: [u8; 5]) -> (Priority, &'static str) {
        let [fever, cough, pain, fatigue, short_breath] = features.map(|flag| flag != 0);
        if short_breath && fever {
            (Priority::Critical, "covid-19")
        } else if fever && cough {
            (Priority::High, "flu")
        } else if pain && fatigue {
            (Priority::Medium, "infection")
        } else {
            (Priority::Low, "common")
        }
    }

    fn faulted(rate: f64) -> bool {
        rate > 0.0 && rand::rng().random_bool(rate)
    }
}

impl Classifier for RuleClassifier {
    fn classify_priority(&self, features: [u8; 5]) -> Result<Priority, ClassifierError> {
        if Self::faulted(self.priority_failure_rate) {
            return Err(ClassifierError::Failed(
                "priority model rejected the feature vector".into(),
            ));
        }
        Ok(Self::rule(features).0)
    }

    fn classify_diagnosis(&self, features: [u8; 5]) -> Result<Diagnosis, ClassifierError> {
        if Self::faulted(self.diagnosis_failure_rate) {
            return Err(ClassifierError::Failed(
                "diagnosis model rejected the feature vector".into(),
            ));
        }
        Ok(Diagnosis::new(Self::rule(features).1))
    }
}
