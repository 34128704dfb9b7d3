//! Comprehensive integration tests for ClassifierPool
//!
//! These tests validate real-world functionality including:
//! - Classification running on dedicated worker threads, off the runtime
//! - Rule labels travelling through the queue untouched
//! - Forced failures surfacing at the async call site
//! - Concurrent submission from many tasks
//! - Panic containment inside the classifier
//! - Queue-full rejection and gauge accounting
//! - Graceful shutdown semantics

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use triage_flow::config::ClassifierPoolConfig;
use triage_flow::core::{
    Classifier, ClassifierError, ClassifierPool, Diagnosis, Priority, RuleClassifier,
};

// ============================================================================
// TEST CLASSIFIERS - Real implementations for testing
// ============================================================================

/// Classifier that records the thread name of every call
struct ThreadProbe {
    names: Arc<Mutex<Vec<String>>>,
}

impl ThreadProbe {
    fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let names = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                names: Arc::clone(&names),
            },
            names,
        )
    }

    fn record(&self) {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        self.names.lock().push(name);
    }
}

impl Classifier for ThreadProbe {
    fn classify_priority(&self, _features: [u8; 5]) -> Result<Priority, ClassifierError> {
        self.record();
        Ok(Priority::Low)
    }

    fn classify_diagnosis(&self, _features: [u8; 5]) -> Result<Diagnosis, ClassifierError> {
        self.record();
        Ok(Diagnosis::new("common"))
    }
}

/// Classifier that panics on every call
struct Panicker;

impl Classifier for Panicker {
    fn classify_priority(&self, _features: [u8; 5]) -> Result<Priority, ClassifierError> {
        panic!("model blew up");
    }

    fn classify_diagnosis(&self, _features: [u8; 5]) -> Result<Diagnosis, ClassifierError> {
        panic!("model blew up");
    }
}

/// Classifier that signals each call and blocks until released
struct Gate {
    started: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Classifier for Gate {
    fn classify_priority(&self, _features: [u8; 5]) -> Result<Priority, ClassifierError> {
        let _ = self.started.send(());
        let _ = self.release.lock().recv();
        Ok(Priority::Low)
    }

    fn classify_diagnosis(&self, _features: [u8; 5]) -> Result<Diagnosis, ClassifierError> {
        let _ = self.started.send(());
        let _ = self.release.lock().recv();
        Ok(Diagnosis::new("common"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

/// Test that classification runs on named pool threads, not the runtime
#[tokio::test]
async fn test_classification_runs_off_the_runtime_thread() {
    let (probe, names) = ThreadProbe::new();
    let config = ClassifierPoolConfig::new().with_workers(2);
    let pool = ClassifierPool::new(&config, probe).expect("failed to create pool");

    let priority = pool
        .submit_priority([0; 5])
        .await
        .expect("priority submit failed");
    assert_eq!(priority, Priority::Low);

    let diagnosis = pool
        .submit_diagnosis([0; 5])
        .await
        .expect("diagnosis submit failed");
    assert_eq!(diagnosis.label(), "common");

    let recorded = names.lock().clone();
    println!("calls ran on threads: {recorded:?}");
    assert_eq!(recorded.len(), 2);
    for name in &recorded {
        assert!(
            name.starts_with("classifier-"),
            "classification ran on {name}"
        );
    }

    pool.shutdown();
}

/// Test that rule labels come back exactly as the classifier produced them
#[tokio::test]
async fn test_rule_labels_travel_through_the_queue() {
    let config = ClassifierPoolConfig::new().with_workers(1);
    let pool =
        ClassifierPool::new(&config, RuleClassifier::new()).expect("failed to create pool");

    // fever + breathing difficulty is the most urgent rule
    let priority = pool
        .submit_priority([1, 0, 0, 0, 1])
        .await
        .expect("priority submit failed");
    assert_eq!(priority, Priority::Critical);

    let diagnosis = pool
        .submit_diagnosis([1, 0, 0, 0, 1])
        .await
        .expect("diagnosis submit failed");
    assert_eq!(diagnosis.label(), "covid-19");

    pool.shutdown();
}

/// Test that an injected failure reaches the async caller as an error
#[tokio::test]
async fn test_forced_failure_surfaces_at_the_call_site() {
    let classifier = RuleClassifier::new().with_priority_failure_rate(1.0);
    let config = ClassifierPoolConfig::new().with_workers(1);
    let pool = ClassifierPool::new(&config, classifier).expect("failed to create pool");

    let err = pool.submit_priority([0; 5]).await.unwrap_err();
    assert!(matches!(err, ClassifierError::Failed(_)), "got {err:?}");

    // Diagnosis has its own failure rate and still works
    let diagnosis = pool
        .submit_diagnosis([1, 0, 0, 0, 1])
        .await
        .expect("diagnosis submit failed");
    assert_eq!(diagnosis.label(), "covid-19");

    let stats = pool.stats();
    println!("stats after one failure and one success: {stats:?}");
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);

    pool.shutdown();
}

/// Test concurrent submission from many tasks
#[tokio::test]
async fn test_many_concurrent_submissions_all_complete() {
    let config = ClassifierPoolConfig::new()
        .with_workers(4)
        .with_queue_depth(64);
    let pool = Arc::new(
        ClassifierPool::new(&config, RuleClassifier::new()).expect("failed to create pool"),
    );

    let mut handles = Vec::new();
    for i in 0..32u8 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let features = [i % 2, (i >> 1) % 2, (i >> 2) % 2, (i >> 3) % 2, (i >> 4) % 2];
            pool.submit_priority(features).await
        }));
    }

    let results = futures::future::join_all(handles).await;
    for result in results {
        result
            .expect("submitting task panicked")
            .expect("classification failed");
    }

    let stats = pool.stats();
    println!("final stats: {stats:?}");
    assert_eq!(stats.submitted, 32);
    assert_eq!(stats.completed, 32);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.queued, 0);

    pool.shutdown();
}

/// Test that a rejected submission rolls the queued gauge back
#[tokio::test]
async fn test_rejected_submission_rolls_back_the_queued_gauge() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate = Gate {
        started: started_tx,
        release: Mutex::new(release_rx),
    };
    let config = ClassifierPoolConfig::new()
        .with_workers(1)
        .with_queue_depth(1);
    let pool = Arc::new(ClassifierPool::new(&config, gate).expect("failed to create pool"));

    // First job: wait until the worker holds it, leaving the channel empty.
    let first = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.submit_priority([0; 5]).await })
    };
    let deadline = Instant::now() + Duration::from_secs(5);
    while started_rx.try_recv().is_err() {
        assert!(Instant::now() < deadline, "worker never picked up the first job");
        tokio::task::yield_now().await;
    }

    // Second job: fills the single queue slot behind the gated worker.
    let second = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.submit_priority([0; 5]).await })
    };
    while pool.stats().queued == 0 {
        assert!(Instant::now() < deadline, "second job never queued");
        tokio::task::yield_now().await;
    }

    let err = pool.submit_priority([0; 5]).await.unwrap_err();
    assert_eq!(err, ClassifierError::QueueFull);
    assert_eq!(pool.stats().queued, 1, "rejected submission left the gauge high");

    release_tx.send(()).expect("worker exited early");
    release_tx.send(()).expect("worker exited early");
    first
        .await
        .expect("first task panicked")
        .expect("first classification failed");
    second
        .await
        .expect("second task panicked")
        .expect("second classification failed");

    let stats = pool.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.queued, 0);

    pool.shutdown();
}

/// Test that a panicking classifier is contained and the worker survives
#[tokio::test]
async fn test_panicking_classifier_is_contained() {
    let config = ClassifierPoolConfig::new().with_workers(1);
    let pool = ClassifierPool::new(&config, Panicker).expect("failed to create pool");

    for _ in 0..2 {
        let err = pool.submit_priority([0; 5]).await.unwrap_err();
        match err {
            ClassifierError::Failed(message) => {
                assert!(message.contains("panicked"), "unexpected message: {message}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    // The single worker survived both panics
    let stats = pool.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.completed, 0);

    pool.shutdown();
}

/// Test that shutdown is prompt and later submissions are rejected
#[tokio::test]
async fn test_shutdown_rejects_later_submissions() {
    let config = ClassifierPoolConfig::new().with_workers(2);
    let pool =
        ClassifierPool::new(&config, RuleClassifier::new()).expect("failed to create pool");

    let _ = pool
        .submit_priority([0; 5])
        .await
        .expect("priority submit failed");

    let start = Instant::now();
    pool.shutdown();
    let took = start.elapsed();
    println!("shutdown completed in {took:?}");
    assert!(took < Duration::from_millis(500), "shutdown stalled");

    let err = pool.submit_priority([0; 5]).await.unwrap_err();
    assert_eq!(err, ClassifierError::PoolClosed);

    // A second shutdown is a no-op
    pool.shutdown();
}
