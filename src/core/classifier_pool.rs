//! Dedicated worker threads for CPU-bound classification.
//!
//! The pool keeps heavy classification off the cooperative scheduler: jobs
//! travel over a bounded channel to named OS threads, and the calling
//! workflow only awaits a oneshot reply. Dropping the job sender is the
//! shutdown signal; workers drain the queue and exit once the channel closes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::ClassifierPoolConfig;
use crate::core::case::{Diagnosis, Priority};
use crate::core::classifier::{Classifier, ClassifierError, ClassifierPort};

/// A classification request plus its reply channel.
enum ClassifyJob {
    Priority {
        features: [u8; 5],
        reply: oneshot::Sender<Result<Priority, ClassifierError>>,
    },
    Diagnosis {
        features: [u8; 5],
        reply: oneshot::Sender<Result<Diagnosis, ClassifierError>>,
    },
}

/// Lock-free counters tracking pool activity.
#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    queued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl PoolCounters {
    fn snapshot(&self, workers: usize) -> ClassifierPoolStats {
        ClassifierPoolStats {
            workers,
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierPoolStats {
    /// Number of worker threads.
    pub workers: usize,
    /// Jobs accepted for execution.
    pub submitted: u64,
    /// Jobs currently waiting in the channel.
    pub queued: u64,
    /// Jobs that produced a label.
    pub completed: u64,
    /// Jobs that returned an error, including contained classifier panics.
    pub failed: u64,
}

/// Bounded pool of OS threads executing [`Classifier`] jobs.
#[derive(Debug)]
pub struct ClassifierPool {
    job_tx: Mutex<Option<Sender<ClassifyJob>>>,
    counters: Arc<PoolCounters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    shutdown: AtomicBool,
}

impl ClassifierPool {
    /// Spawn the configured number of worker threads around `classifier`.
    ///
    /// # Errors
    ///
    /// [`ClassifierError::InvalidConfig`] when the configuration fails
    /// validation, [`ClassifierError::Spawn`] when a worker thread cannot be
    /// created.
    pub fn new<C: Classifier>(
        config: &ClassifierPoolConfig,
        classifier: C,
    ) -> Result<Self, ClassifierError> {
        config
            .validate()
            .map_err(|err| ClassifierError::InvalidConfig(err.to_string()))?;

        let (job_tx, job_rx) = bounded::<ClassifyJob>(config.queue_depth);
        let counters = Arc::new(PoolCounters::default());
        let classifier = Arc::new(classifier);

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            workers.push(spawn_worker(
                worker_id,
                job_rx.clone(),
                Arc::clone(&classifier),
                Arc::clone(&counters),
            )?);
        }

        debug!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            "classifier pool started"
        );

        Ok(Self {
            job_tx: Mutex::new(Some(job_tx)),
            counters,
            workers: Mutex::new(workers),
            worker_count: config.workers,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Classify priority on a worker thread, suspending only the caller.
    ///
    /// # Errors
    ///
    /// Queue and lifecycle errors from the pool, or the classifier's own
    /// [`ClassifierError::Failed`].
    pub async fn submit_priority(&self, features: [u8; 5]) -> Result<Priority, ClassifierError> {
        let (reply, response) = oneshot::channel();
        self.enqueue(ClassifyJob::Priority { features, reply })?;
        response.await.map_err(|_| ClassifierError::WorkerGone)?
    }

    /// Classify diagnosis on a worker thread, suspending only the caller.
    ///
    /// # Errors
    ///
    /// Queue and lifecycle errors from the pool, or the classifier's own
    /// [`ClassifierError::Failed`].
    pub async fn submit_diagnosis(&self, features: [u8; 5]) -> Result<Diagnosis, ClassifierError> {
        let (reply, response) = oneshot::channel();
        self.enqueue(ClassifyJob::Diagnosis { features, reply })?;
        response.await.map_err(|_| ClassifierError::WorkerGone)?
    }

    fn enqueue(&self, job: ClassifyJob) -> Result<(), ClassifierError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(ClassifierError::PoolClosed);
        }
        let guard = self.job_tx.lock();
        let Some(job_tx) = guard.as_ref() else {
            return Err(ClassifierError::PoolClosed);
        };
        // The gauge goes up before the job is visible to any worker; rejected
        // sends roll it back.
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        match job_tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                warn!("classifier queue is full, rejecting job");
                Err(ClassifierError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                Err(ClassifierError::PoolClosed)
            }
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> ClassifierPoolStats {
        self.counters.snapshot(self.worker_count)
    }

    /// Stop accepting jobs, let workers drain the queue, and join them.
    ///
    /// Idempotent; later calls return immediately.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender closes the channel; workers exit after draining.
        *self.job_tx.lock() = None;
        let mut workers = self.workers.lock();
        for worker in workers.drain(..) {
            if worker.join().is_err() {
                warn!("classifier worker panicked");
            }
        }
        debug!("classifier pool shut down");
    }
}

impl Drop for ClassifierPool {
    fn drop(&mut self) {
        // Signal shutdown without joining; detached workers exit once the
        // channel drains.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.job_tx.lock() = None;
            debug!("classifier pool dropped without explicit shutdown");
        }
    }
}

#[async_trait]
impl ClassifierPort for ClassifierPool {
    async fn classify_priority(&self, features: [u8; 5]) -> Result<Priority, ClassifierError> {
        self.submit_priority(features).await
    }

    async fn classify_diagnosis(&self, features: [u8; 5]) -> Result<Diagnosis, ClassifierError> {
        self.submit_diagnosis(features).await
    }
}

fn spawn_worker<C: Classifier>(
    worker_id: usize,
    job_rx: Receiver<ClassifyJob>,
    classifier: Arc<C>,
    counters: Arc<PoolCounters>,
) -> Result<JoinHandle<()>, ClassifierError> {
    thread::Builder::new()
        .name(format!("classifier-{worker_id}"))
        .spawn(move || {
            debug!(worker_id, "classifier worker started");
            // Blocking recv; the loop ends when the sender side is dropped.
            while let Ok(job) = job_rx.recv() {
                counters.queued.fetch_sub(1, Ordering::Relaxed);
                run_job(classifier.as_ref(), &counters, job);
            }
            debug!(worker_id, "classifier worker exiting");
        })
        .map_err(|err| ClassifierError::Spawn(err.to_string()))
}

/// Run one job and reply on its oneshot channel.
///
/// Counters are updated before the reply goes out, so a caller that has seen
/// its result also sees consistent stats.
fn run_job<C: Classifier>(classifier: &C, counters: &PoolCounters, job: ClassifyJob) {
    match job {
        ClassifyJob::Priority { features, reply } => {
            let result = contained(|| classifier.classify_priority(features));
            count(counters, result.is_err());
            // The caller may have been cancelled; a dead reply channel is fine.
            let _ = reply.send(result);
        }
        ClassifyJob::Diagnosis { features, reply } => {
            let result = contained(|| classifier.classify_diagnosis(features));
            count(counters, result.is_err());
            let _ = reply.send(result);
        }
    }
}

fn count(counters: &PoolCounters, failed: bool) {
    if failed {
        counters.failed.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Convert a panic inside the classifier into an error so the worker thread
/// survives and the caller still gets a reply.
fn contained<T>(
    call: impl FnOnce() -> Result<T, ClassifierError>,
) -> Result<T, ClassifierError> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|_| Err(ClassifierError::Failed("classifier panicked".into())))
}
