//! Sluice Controller
//!
//! Execution control for pipeline runs.
//!
//! Architecture:
//! - Configuration: API connection settings and run defaults from the environment
//! - Repositories: where runs are stored and where pipelines come from
//! - Validation: dry-run admission of referenced definitions
//! - Reconciler: one pass over one run, wiring everything together
//!
//! Delivering "reconcile this run" requests, one at a time per run, is left
//! to the caller.

pub mod config;
pub mod reconciler;
pub mod repository;
pub mod telemetry;
pub mod validation;

pub use config::Config;
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler, RunPlan};
pub use validation::{ReferenceValidator, ValidationError};
