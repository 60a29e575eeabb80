//! Scheduling, aggregation and reporting for the xssbench benchmark.
//!
//! The scheduler owns the case space `vectors × sanitizers × engines`,
//! dispenses cases to a worker pool, and folds the results into one
//! serializable artifact per engine. Everything browser-shaped is behind
//! the `CaseRunner` seam so the scheduling logic is testable without a
//! browser installed.

pub mod error;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use error::BenchError;
pub use report::{print_summary, write_artifacts, CaseResult, RunArtifact, Tally};
pub use runner::{BrowserRunnerFactory, CaseRunner, RunnerFactory};
pub use scheduler::{run_bench, RunConfig};
