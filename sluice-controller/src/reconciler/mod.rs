//! Pipeline-run reconciler
//!
//! One [`Reconciler::reconcile`] call is one pass over one run: load it,
//! advance its lifecycle, decide timeouts, resolve and validate the pipeline
//! it references, work out the effective settings of every task, and write
//! the status back. Serialising passes per run is the caller's job.

mod plan;

pub use plan::RunPlan;

use sluice_core::clock::Clock;
use sluice_core::config::Defaults;
use sluice_core::domain::{NamespacedName, PipelineRun, PipelineRunReason, PipelineTaskNames};
use sluice_core::error::{MessageArg, UserError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::repository::{PipelineResolver, ResolveError, RunRepository};
use crate::validation::{ReferenceValidator, ValidationError};

/// Errors returned from a reconcile pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to load run {key}: {source}")]
    Load {
        key: NamespacedName,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist status of run {key}: {source}")]
    Persist {
        key: NamespacedName,
        #[source]
        source: anyhow::Error,
    },

    /// Pipeline validation hit a transient failure
    #[error("validation of the pipeline for run {key} must be retried: {source}")]
    Retryable {
        key: NamespacedName,
        #[source]
        source: ValidationError,
    },

    /// The pipeline could not be fetched for a reason outside the run
    #[error("failed to resolve the pipeline for run {key}: {source}")]
    Resolve {
        key: NamespacedName,
        #[source]
        source: ResolveError,
    },

    #[error("reconcile of run {0} was cancelled")]
    Cancelled(NamespacedName),

    /// Validation failed outside the known classes
    #[error(transparent)]
    Validation(ValidationError),
}

impl ReconcileError {
    /// Whether the dispatch layer should requeue the run with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Load { .. } | Self::Persist { .. } | Self::Retryable { .. } => true,
            Self::Resolve { source, .. } => source.is_transient(),
            Self::Cancelled(_) => false,
            Self::Validation(e) => !matches!(e, ValidationError::UnsupportedKind(_)),
        }
    }
}

/// Result of a successful reconcile pass
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The run no longer exists
    NotFound,
    /// The run had already finished; nothing was changed
    AlreadyDone,
    /// The run is held in the pending state
    Pending,
    /// This pass moved the run to a terminal state
    Finished(PipelineRunReason),
    /// The run is executing
    Running {
        plan: RunPlan,
        /// Time until the overall deadline; `None` without a deadline
        requeue_after: Option<Duration>,
    },
}

/// Drives pipeline runs through their lifecycle
pub struct Reconciler {
    runs: Arc<dyn RunRepository>,
    pipelines: Arc<dyn PipelineResolver>,
    validator: ReferenceValidator,
    defaults: Defaults,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        runs: Arc<dyn RunRepository>,
        pipelines: Arc<dyn PipelineResolver>,
        validator: ReferenceValidator,
        defaults: Defaults,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runs,
            pipelines,
            validator,
            defaults,
            clock,
        }
    }

    /// Runs one reconcile pass for the run identified by `key`
    #[tracing::instrument(skip_all, fields(run = %key))]
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        key: &NamespacedName,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let clock = self.clock.as_ref();

        let Some(mut run) = self
            .runs
            .get(key)
            .await
            .map_err(|source| ReconcileError::Load {
                key: key.clone(),
                source,
            })?
        else {
            debug!("Run no longer exists");
            return Ok(ReconcileOutcome::NotFound);
        };

        if run.is_done() {
            debug!("Run already finished");
            return Ok(ReconcileOutcome::AlreadyDone);
        }

        if run.is_pending() {
            let message = format!("PipelineRun {:?} is pending", run.metadata.name);
            run.status
                .mark_running(PipelineRunReason::Pending, message, clock);
            self.persist(&run).await?;
            return Ok(ReconcileOutcome::Pending);
        }

        if !run.has_started() {
            info!("Starting run");
        }
        run.status.initialize_conditions(clock);

        if run.is_cancelled() {
            info!("Run cancelled");
            run.mark_cancelled(clock);
            self.persist(&run).await?;
            return Ok(ReconcileOutcome::Finished(PipelineRunReason::Cancelled));
        }

        if let Some(timeouts) = run.spec.timeouts
            && let Err(err) = timeouts.validate(&self.defaults)
        {
            warn!(error = %err, "Run has invalid timeouts");
            run.status.mark_failed(
                PipelineRunReason::InvalidTimeouts,
                "PipelineRun {} has invalid timeouts: {}",
                &[key.to_string().into(), UserError::wrap(err).into()],
                clock,
            );
            self.persist(&run).await?;
            return Ok(ReconcileOutcome::Finished(PipelineRunReason::InvalidTimeouts));
        }

        if run.has_timed_out(&self.defaults, clock) {
            if run.has_timed_out_for_a_long_time(&self.defaults, clock) {
                warn!(
                    timeout = ?run.pipeline_timeout(&self.defaults),
                    "Run is well past its deadline"
                );
            } else {
                info!("Run timed out");
            }
            run.set_timeout_condition(&self.defaults, clock);
            self.persist(&run).await?;
            return Ok(ReconcileOutcome::Finished(PipelineRunReason::TimedOut));
        }

        let resolved = match self.pipelines.resolve(&run).await {
            Ok(resolved) => resolved,
            Err(err) => return self.fail_resolution(run, key, err).await,
        };

        let pipeline = if resolved.remote {
            match self
                .validator
                .dry_run_validate(cancel, &key.namespace, &resolved.object)
                .await
            {
                Ok(admitted) => admitted,
                Err(err) => return self.fail_validation(run, key, err).await,
            }
        } else {
            resolved.object
        };

        let names = pipeline
            .spec()
            .map(PipelineTaskNames::from_spec)
            .unwrap_or_default();
        let plan = RunPlan::build(&run, &names, &self.defaults, clock);
        if plan.run_finally {
            run.status.mark_finally_started(clock);
        }

        let (reason, message) = if run.is_gracefully_cancelled() {
            (
                PipelineRunReason::CancelledRunningFinally,
                format!("PipelineRun {:?} was cancelled, running finally tasks", run.metadata.name),
            )
        } else if run.is_gracefully_stopped() {
            (
                PipelineRunReason::StoppedRunningFinally,
                format!("PipelineRun {:?} was stopped, running finally tasks", run.metadata.name),
            )
        } else {
            (
                PipelineRunReason::Running,
                format!(
                    "Tasks: {} (Finally: {})",
                    names.tasks.len(),
                    names.finally.len()
                ),
            )
        };
        run.status.mark_running(reason, message, clock);
        self.persist(&run).await?;

        let requeue_after = run.remaining_time(&self.defaults, clock);
        debug!(?requeue_after, tasks = plan.tasks.len(), "Run reconciled");
        Ok(ReconcileOutcome::Running {
            plan,
            requeue_after,
        })
    }

    async fn fail_resolution(
        &self,
        mut run: PipelineRun,
        key: &NamespacedName,
        err: ResolveError,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let clock = self.clock.as_ref();
        warn!(error = %err, "Couldn't retrieve pipeline");

        let cause = match err {
            ResolveError::UnsupportedResolver(_) => MessageArg::from(err.to_string()),
            err if err.is_user_error() => UserError::wrap(err).into(),
            err => {
                self.persist(&run).await?;
                return Err(ReconcileError::Resolve {
                    key: key.clone(),
                    source: err,
                });
            }
        };

        run.status.mark_failed(
            PipelineRunReason::CouldntGetPipeline,
            "Error retrieving pipeline for pipelinerun {}: {}",
            &[key.to_string().into(), cause],
            clock,
        );
        self.persist(&run).await?;
        Ok(ReconcileOutcome::Finished(
            PipelineRunReason::CouldntGetPipeline,
        ))
    }

    async fn fail_validation(
        &self,
        mut run: PipelineRun,
        key: &NamespacedName,
        err: ValidationError,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let clock = self.clock.as_ref();
        match err {
            ValidationError::ReferencedObjectValidationFailed(_) => {
                run.status.mark_failed(
                    PipelineRunReason::PipelineValidationFailed,
                    "Pipeline for pipelinerun {} can't be run; it has an invalid spec: {}",
                    &[key.to_string().into(), UserError::wrap(err).into()],
                    clock,
                );
                self.persist(&run).await?;
                Ok(ReconcileOutcome::Finished(
                    PipelineRunReason::PipelineValidationFailed,
                ))
            }
            ValidationError::CouldntValidateObjectPermanent(_) => {
                run.status.mark_failed(
                    PipelineRunReason::CouldntValidatePipeline,
                    "Couldn't validate pipeline for pipelinerun {}: {}",
                    &[key.to_string().into(), err.to_string().into()],
                    clock,
                );
                self.persist(&run).await?;
                Ok(ReconcileOutcome::Finished(
                    PipelineRunReason::CouldntValidatePipeline,
                ))
            }
            ValidationError::CouldntValidateObjectRetryable(_) => {
                self.persist(&run).await?;
                Err(ReconcileError::Retryable {
                    key: key.clone(),
                    source: err,
                })
            }
            ValidationError::Cancelled(_) => Err(ReconcileError::Cancelled(key.clone())),
            other => {
                self.persist(&run).await?;
                Err(ReconcileError::Validation(other))
            }
        }
    }

    async fn persist(&self, run: &PipelineRun) -> Result<(), ReconcileError> {
        self.runs
            .update_status(run)
            .await
            .map_err(|source| ReconcileError::Persist {
                key: run.namespaced_name(),
                source,
            })
    }
}
