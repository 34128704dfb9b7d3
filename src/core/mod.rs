//! Core simulation primitives: cases, statistics, beds, classification.

pub mod beds;
pub mod case;
pub mod classifier;
pub mod classifier_pool;
pub mod stats;

pub use beds::{BedPermit, BedPool, BedPoolError};
pub use case::{CaseId, CaseRecord, CaseState, Diagnosis, Priority, Symptoms};
pub use classifier::{Classifier, ClassifierError, ClassifierPort, RuleClassifier};
pub use classifier_pool::{ClassifierPool, ClassifierPoolStats};
pub use stats::{RegistrationLog, RegistrationStats, StatsAggregator, StatsSnapshot};
