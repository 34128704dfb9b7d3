//! Run configuration and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration failures detected before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The case-count argument was not a non-negative integer.
    #[error("invalid case count {0:?}: expected a non-negative integer")]
    InvalidCaseCount(String),
    /// A field value is outside its allowed range.
    #[error("invalid configuration: {field} {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Worker-thread pool sizing for the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierPoolConfig {
    /// Number of dedicated worker threads.
    pub workers: usize,
    /// Maximum jobs waiting in the channel before submissions are rejected.
    pub queue_depth: usize,
}

impl Default for ClassifierPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 64,
        }
    }
}

impl ClassifierPoolConfig {
    /// Default sizing: two workers, queue depth 64.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker-thread count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the job-queue depth.
    #[must_use]
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Validate the sizing values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when either value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.workers",
                reason: "must be greater than 0".into(),
            });
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.queue_depth",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

/// Per-stage probabilities of an injected fault, all in `[0, 1]`.
///
/// Zero everywhere by default; raise individual rates to exercise the error
/// branches of the pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureRates {
    /// Registration stage failure probability.
    pub registration: f64,
    /// Triage classification failure probability.
    pub triage: f64,
    /// Diagnosis classification failure probability.
    pub diagnosis: f64,
    /// Treatment failure probability while holding a bed.
    pub bed: f64,
    /// Follow-up stage failure probability.
    pub follow_up: f64,
}

impl FailureRates {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, rate) in [
            ("failure_rates.registration", self.registration),
            ("failure_rates.triage", self.triage),
            ("failure_rates.diagnosis", self.diagnosis),
            ("failure_rates.bed", self.bed),
            ("failure_rates.follow_up", self.follow_up),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{rate} is not a probability in [0, 1]"),
                });
            }
        }
        Ok(())
    }
}

/// Everything one simulation run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of cases to simulate.
    pub case_count: u64,
    /// Beds available for the whole run.
    pub bed_capacity: usize,
    /// Classifier worker-pool sizing.
    pub classifier: ClassifierPoolConfig,
    /// Multiplier applied to every simulated latency; `1.0` means wall-clock
    /// seconds, tests use small values.
    pub time_scale: f64,
    /// Seed for reproducible runs; `None` seeds from the thread RNG.
    pub rng_seed: Option<u64>,
    /// Injected fault probabilities.
    pub failure_rates: FailureRates,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            case_count: 10,
            bed_capacity: 3,
            classifier: ClassifierPoolConfig::default(),
            time_scale: 1.0,
            rng_seed: None,
            failure_rates: FailureRates::default(),
        }
    }
}

impl RunConfig {
    /// Defaults: ten cases, three beds, wall-clock latencies, no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of cases to simulate.
    #[must_use]
    pub fn with_case_count(mut self, case_count: u64) -> Self {
        self.case_count = case_count;
        self
    }

    /// Set the bed capacity.
    #[must_use]
    pub fn with_bed_capacity(mut self, bed_capacity: usize) -> Self {
        self.bed_capacity = bed_capacity;
        self
    }

    /// Replace the classifier pool sizing.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ClassifierPoolConfig) -> Self {
        self.classifier = classifier;
        self
    }

    /// Set the latency multiplier.
    #[must_use]
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Pin the RNG seed for a reproducible run.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Replace the injected fault probabilities.
    #[must_use]
    pub fn with_failure_rates(mut self, failure_rates: FailureRates) -> Self {
        self.failure_rates = failure_rates;
        self
    }

    /// Build a config from command-line arguments.
    ///
    /// The only positional argument is the case count; when omitted the
    /// default of ten applies.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCaseCount`] when the argument is not a
    /// non-negative integer. Nothing else is touched, so the caller can abort
    /// before any workflow starts.
    pub fn from_cli_args(mut args: impl Iterator<Item = String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = args.next() {
            match raw.trim().parse() {
                Ok(count) => config.case_count = count,
                Err(_) => return Err(ConfigError::InvalidCaseCount(raw)),
            }
        }
        Ok(config)
    }

    /// Parse a config from JSON and validate it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] for malformed JSON or any validation
    /// failure.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input).map_err(|err| ConfigError::InvalidValue {
            field: "json",
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bed_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bed_capacity",
                reason: "must be greater than 0".into(),
            });
        }
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "time_scale",
                reason: format!("{} is not a positive finite number", self.time_scale),
            });
        }
        self.classifier.validate()?;
        self.failure_rates.validate()?;
        Ok(())
    }
}
