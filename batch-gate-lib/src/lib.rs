//! # Batch Gate Library
//!
//! Bounded concurrency for async work: a counting admission gate and a batch
//! executor that pushes many units through it while keeping at most N in
//! flight, collecting one outcome per unit.
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_gate_lib::{BatchExecutor, BoundedGate, WorkUnit};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let units: Vec<WorkUnit<usize>> = (0..200)
//!         .map(|i| {
//!             WorkUnit::new(format!("job-{}", i), async move {
//!                 tokio::time::sleep(Duration::from_millis(1)).await;
//!                 Ok::<_, String>(i)
//!             })
//!         })
//!         .collect();
//!
//!     let executor = BatchExecutor::with_gate(BoundedGate::new(20)?);
//!     let result = executor.run_batch(units).await?;
//!
//!     for entry in result.entries() {
//!         match entry.outcome.success() {
//!             Some(value) => println!("{}: {}", entry.label, value),
//!             None => println!("{}: {:?}", entry.label, entry.outcome.failure()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! With the `http` feature, `HttpFetcher::units` turns a list of URLs into
//! GET work units for the same executor.
//!
//! ## Features
//!
//! - **Scoped permits**: a slot is released on every exit path
//! - **Structured join**: a batch returns only after every unit finished
//! - **Isolation**: a failing or panicking unit never aborts the batch (panic capture needs `panic = "unwind"`)
//! - **Cancellation**: explicit tokens and batch deadlines
//! - **HTTP units**: reqwest-backed GET requests (feature `http`)

pub use config::{
    load_env_config, load_env_config_from, parse_duration, ConfigManager, DefaultsConfig,
    EnvConfig, FileConfig, OutputConfig,
};
pub use error::BatchGateError;
pub use executor::{run_batch, BatchExecutor, OutcomeStream};
pub use gate::{BoundedGate, GatePermit};
#[cfg(feature = "http")]
pub use protocols::{FetchResponse, HttpFetcher};
pub use types::{
    BatchConfig, BatchEntry, BatchResult, FailureKind, Outcome, UnitFailure, WorkUnit,
    MAX_CONCURRENCY,
};
pub use utils::{expand_targets, normalize_target, parse_target_lines, read_targets_file, validate_target};

// Cancellation tokens are part of the public API.
pub use tokio_util::sync::CancellationToken;

mod config;
mod error;
mod executor;
mod gate;
mod protocols;
mod types;
mod utils;

pub type Result<T> = std::result::Result<T, BatchGateError>;
