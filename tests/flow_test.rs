//! Integration tests for the complete admission pipeline.
//!
//! These tests validate:
//! 1. Every case reaches exactly one terminal state
//! 2. Fatal stage failures halt their workflow without touching siblings
//! 3. Degraded states (no diagnosis, no bed) still reach discharge
//! 4. The counters in the final report add up for every scenario
//! 5. Cancellation stops the run cleanly mid-flight
//! 6. A pinned seed reproduces a run exactly

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use triage_flow::config::{FailureRates, RunConfig};
use triage_flow::core::CaseState;
use triage_flow::sim::Simulation;

fn fast_config(case_count: u64, seed: u64) -> RunConfig {
    RunConfig::new()
        .with_case_count(case_count)
        .with_time_scale(0.01)
        .with_rng_seed(seed)
}

/// Test that an empty run produces an empty report without hanging
#[tokio::test]
async fn test_zero_cases_completes_immediately() {
    let simulation = Simulation::new(fast_config(0, 1)).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert!(report.outcomes.is_empty());
    assert!(report.snapshot.is_empty());
    assert_eq!(report.registration.count, 0);
}

/// Test the healthy path: every case discharges and every counter adds up
#[tokio::test]
async fn test_every_case_reaches_exactly_one_terminal_state() {
    let simulation = Simulation::new(fast_config(12, 7)).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert_eq!(report.outcomes.len(), 12);
    for outcome in &report.outcomes {
        assert_eq!(outcome.state, CaseState::Discharged, "case {}", outcome.id);
        assert!(outcome.got_bed, "case {} treated without a bed", outcome.id);
        assert!(outcome.priority.is_some());
        assert!(outcome.diagnosis.is_some());
    }

    let snapshot = &report.snapshot;
    assert_eq!(snapshot.get("registered"), 12);
    assert_eq!(snapshot.get("triaged"), 12);
    assert_eq!(snapshot.get("diagnosed"), 12);
    assert_eq!(snapshot.get("bed_assigned"), 12);
    assert_eq!(snapshot.get("treated"), 12);
    assert_eq!(snapshot.get("discharged"), 12);
    assert_eq!(snapshot.get("discharged_without_bed"), 0);
    assert_eq!(snapshot.errors_and_cancellations(), 0);
    assert_eq!(snapshot.total_terminal(), 12);
    assert_eq!(report.registration.count, 12);
}

/// Test that a registration fault is fatal for the case
#[tokio::test]
async fn test_registration_failure_is_fatal() {
    let config = fast_config(4, 3).with_failure_rates(FailureRates {
        registration: 1.0,
        ..FailureRates::default()
    });
    let simulation = Simulation::new(config).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert_eq!(report.outcomes.len(), 4);
    for outcome in &report.outcomes {
        assert_eq!(outcome.state, CaseState::ErrorRegistration);
    }
    assert_eq!(report.snapshot.get("error_registration"), 4);
    assert_eq!(report.snapshot.get("registered"), 0);
    assert_eq!(report.snapshot.get("triaged"), 0);
    assert_eq!(report.registration.count, 0);
}

/// Test that a triage fault is fatal for the case
#[tokio::test]
async fn test_fatal_triage_failure_halts_cases() {
    let config = fast_config(6, 5).with_failure_rates(FailureRates {
        triage: 1.0,
        ..FailureRates::default()
    });
    let simulation = Simulation::new(config).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert_eq!(report.outcomes.len(), 6);
    for outcome in &report.outcomes {
        assert_eq!(outcome.state, CaseState::ErrorTriage);
        assert!(outcome.priority.is_none());
    }
    let snapshot = &report.snapshot;
    assert_eq!(snapshot.get("registered"), 6);
    assert_eq!(snapshot.get("error_triage"), 6);
    assert_eq!(snapshot.get("triaged"), 0);
    assert_eq!(snapshot.get("diagnosed"), 0);
    assert_eq!(snapshot.get("bed_assigned"), 0);
    assert_eq!(snapshot.get("discharged"), 0);
    assert_eq!(snapshot.total_terminal(), 6);
}

/// Test that a diagnosis fault degrades the case but the pipeline continues
#[tokio::test]
async fn test_diagnosis_failure_degrades_but_still_discharges() {
    let config = fast_config(6, 9).with_failure_rates(FailureRates {
        diagnosis: 1.0,
        ..FailureRates::default()
    });
    let simulation = Simulation::new(config).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert_eq!(report.outcomes.len(), 6);
    for outcome in &report.outcomes {
        assert_eq!(outcome.state, CaseState::Discharged);
        assert!(outcome.priority.is_some());
        assert!(outcome.diagnosis.is_none(), "case {} kept a diagnosis", outcome.id);
    }
    let snapshot = &report.snapshot;
    assert_eq!(snapshot.get("error_diagnosis"), 6);
    assert_eq!(snapshot.get("diagnosed"), 0);
    assert_eq!(snapshot.get("bed_assigned"), 6);
    assert_eq!(snapshot.get("discharged"), 6);
}

/// Test that a treatment fault releases the bed and the case discharges
/// through the bed-less path
#[tokio::test]
async fn test_treatment_failure_still_discharges_without_bed() {
    let config = fast_config(4, 13).with_failure_rates(FailureRates {
        bed: 1.0,
        ..FailureRates::default()
    });
    let simulation = Simulation::new(config).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert_eq!(report.outcomes.len(), 4);
    for outcome in &report.outcomes {
        assert_eq!(outcome.state, CaseState::Discharged);
        assert!(!outcome.got_bed);
    }
    let snapshot = &report.snapshot;
    assert_eq!(snapshot.get("bed_assigned"), 4);
    assert_eq!(snapshot.get("error_bed"), 4);
    assert_eq!(snapshot.get("treated"), 0);
    assert_eq!(snapshot.get("discharged"), 4);
    assert_eq!(snapshot.get("discharged_without_bed"), 4);
}

/// Test that a follow-up fault is terminal even for a treated case
#[tokio::test]
async fn test_follow_up_failure_is_terminal() {
    let config = fast_config(6, 11).with_failure_rates(FailureRates {
        follow_up: 1.0,
        ..FailureRates::default()
    });
    let simulation = Simulation::new(config).expect("valid config");
    let report = simulation.run().await.expect("run failed");

    assert_eq!(report.outcomes.len(), 6);
    for outcome in &report.outcomes {
        assert_eq!(outcome.state, CaseState::ErrorFollowup);
        assert!(outcome.got_bed, "case {} failed before follow-up", outcome.id);
    }
    let snapshot = &report.snapshot;
    assert_eq!(snapshot.get("treated"), 6);
    assert_eq!(snapshot.get("error_followup"), 6);
    assert_eq!(snapshot.get("discharged"), 0);
    assert_eq!(snapshot.errors_and_cancellations(), 6);
    assert_eq!(snapshot.total_terminal(), 6);
}

/// Test that cancelling mid-run stops arrivals and settles every spawned
/// case in a cancelled state
#[tokio::test]
async fn test_cancellation_stops_the_run_cleanly() {
    // Slow enough that nothing can discharge before the cancel fires: the
    // fastest healthy case needs at least 500ms of registration plus
    // treatment at this scale.
    let config = RunConfig::new()
        .with_case_count(8)
        .with_time_scale(0.2)
        .with_rng_seed(17);
    let simulation = Simulation::new(config).expect("valid config");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let report = simulation.run_with_cancel(cancel).await.expect("run failed");
    canceller.await.expect("canceller panicked");

    assert!(!report.outcomes.is_empty(), "no case was spawned before cancel");
    assert!(report.outcomes.len() <= 8);
    for outcome in &report.outcomes {
        assert!(outcome.state.is_terminal(), "case {} left in {}", outcome.id, outcome.state);
        assert!(
            outcome.state.is_cancelled() || outcome.state == CaseState::UnknownError,
            "case {} ended in {}",
            outcome.id,
            outcome.state
        );
    }
    assert_eq!(report.snapshot.get("discharged"), 0);
    assert_eq!(
        report.snapshot.errors_and_cancellations(),
        report.outcomes.len() as u64
    );
    assert_eq!(report.snapshot.total_terminal(), report.outcomes.len() as u64);
}

/// Test that the same seed reproduces the same terminal states
#[tokio::test]
async fn test_pinned_seed_reproduces_a_run() {
    let config = fast_config(10, 21).with_failure_rates(FailureRates {
        registration: 0.3,
        ..FailureRates::default()
    });
    let simulation = Simulation::new(config).expect("valid config");

    let first = simulation.run().await.expect("first run failed");
    let second = simulation.run().await.expect("second run failed");

    let states = |report: &triage_flow::report::RunReport| {
        report
            .outcomes
            .iter()
            .map(|outcome| outcome.state)
            .collect::<Vec<_>>()
    };
    assert_eq!(states(&first), states(&second));
    assert_eq!(
        first.snapshot.errors_and_cancellations(),
        second.snapshot.errors_and_cancellations()
    );
}
