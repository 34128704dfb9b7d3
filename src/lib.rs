//! # Triage Flow
//!
//! A concurrent hospital admission-flow simulator built on cooperative tasks.
//!
//! This library drives synthetic patient cases through a fixed pipeline of
//! stages (registration, triage, diagnosis, bed assignment with treatment,
//! follow-up with optional observation, discharge) while a bounded bed pool
//! and a thread-backed classifier create the contention real admission
//! systems live with.
//!
//! ## Core Problem Solved
//!
//! Admission flows mix three kinds of work that are easy to get wrong when
//! combined:
//!
//! - **Bounded contention**: beds are scarce; waiting must be fair and
//!   cancel-safe, and a bed must never leak on a failure path
//! - **CPU-bound classification**: triage and diagnosis models burn CPU and
//!   must not stall the async runtime that hosts every other case
//! - **Partial failure**: one case erroring, panicking, or being cancelled
//!   must never take down its siblings or skew the final accounting
//!
//! ## Key Features
//!
//! - **Fire-and-forget arrivals**: cases spawn as detached tasks on a
//!   staggered schedule and only their join handles tie them to the run
//! - **Bed pool**: FIFO semaphore-backed permits that release on every exit
//!   path, including cancellation and panic
//! - **Classifier pool**: dedicated OS worker threads behind an async port,
//!   with panic containment and per-pool counters
//! - **Exactly-once accounting**: every stage outcome lands in exactly one
//!   counter, so the final report always adds up
//! - **Reproducible runs**: one seed fixes arrivals, symptoms, and every
//!   latency draw, independent of task interleaving
//!
//! ## Running a Simulation
//!
//! ```rust,ignore
//! use triage_flow::config::RunConfig;
//! use triage_flow::sim::Simulation;
//!
//! let config = RunConfig::new()
//!     .with_case_count(25)
//!     .with_bed_capacity(3)
//!     .with_rng_seed(42);
//!
//! let report = Simulation::new(config)?.run().await?;
//! println!("{}", report.render());
//! ```
//!
//! Shared state is limited to the bed pool, the stats aggregator, and the
//! registration log; everything else is owned by exactly one task, so cases
//! never observe each other except through those three seams.
//!
//! For complete examples, see:
//! - `tests/flow_test.rs` - Full pipeline integration tests
//! - `tests/bed_pool_test.rs` - Contention and cancel-safety tests

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Case model, bed pool, classification, and run-wide statistics.
pub mod core;
/// Configuration models for runs, failure injection, and pool sizing.
pub mod config;
/// Final report aggregation and rendering.
pub mod report;
/// Arrivals, the stage pipeline, and the run supervisor.
pub mod sim;
/// Shared utilities.
pub mod util;
