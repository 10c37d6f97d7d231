//! Timeout budgets
//!
//! A run may set an overall (`pipeline`) timeout and separate `tasks` and
//! `finally` phase timeouts. Each is independently optional, and an explicit
//! zero means "no timeout" for that scope, which is different from unset.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::Defaults;
use crate::domain::condition::{CONDITION_SUCCEEDED, Condition, ConditionStatus};
use crate::domain::reason::PipelineRunReason;
use crate::domain::run::{PipelineRun, is_time_set};
use crate::duration::{format_duration, option_text};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutFields {
    #[serde(default, with = "option_text", skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Duration>,

    #[serde(default, with = "option_text", skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Duration>,

    #[serde(default, with = "option_text", skip_serializing_if = "Option::is_none")]
    pub finally: Option<Duration>,
}

/// Inconsistent timeout settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    #[error("tasks timeout {tasks} must not exceed the pipeline timeout {pipeline}")]
    TasksExceedPipeline { tasks: String, pipeline: String },

    #[error("finally timeout {finally} must not exceed the pipeline timeout {pipeline}")]
    FinallyExceedsPipeline { finally: String, pipeline: String },

    #[error(
        "tasks timeout {tasks} plus finally timeout {finally} must not exceed the pipeline timeout {pipeline}"
    )]
    SumExceedsPipeline {
        tasks: String,
        finally: String,
        pipeline: String,
    },
}

impl TimeoutFields {
    /// Timeout of the tasks phase
    ///
    /// An explicit `tasks` value is returned as-is. Otherwise, when `finally` is
    /// explicit and `pipeline` is a positive ceiling, the remainder
    /// `pipeline - finally` is returned. Anything else is unset, including a
    /// budget `finally` already uses up, since a zero remainder would read as
    /// "no timeout".
    pub fn tasks_timeout(&self) -> Option<Duration> {
        remainder(self.tasks, self.finally, self.pipeline)
    }

    /// Timeout of the finally phase; mirror image of [`Self::tasks_timeout`]
    pub fn finally_timeout(&self) -> Option<Duration> {
        remainder(self.finally, self.tasks, self.pipeline)
    }

    /// Checks that the phase timeouts fit inside the overall timeout
    ///
    /// An unset `pipeline` is checked against the default timeout. No check
    /// applies when the effective overall timeout is zero.
    pub fn validate(&self, defaults: &Defaults) -> Result<(), TimeoutError> {
        let pipeline = self.pipeline.unwrap_or_else(|| defaults.default_timeout());
        if pipeline.is_zero() {
            return Ok(());
        }

        if let Some(tasks) = self.tasks
            && tasks > pipeline
        {
            return Err(TimeoutError::TasksExceedPipeline {
                tasks: format_duration(tasks),
                pipeline: format_duration(pipeline),
            });
        }

        if let Some(finally) = self.finally
            && finally > pipeline
        {
            return Err(TimeoutError::FinallyExceedsPipeline {
                finally: format_duration(finally),
                pipeline: format_duration(pipeline),
            });
        }

        if let (Some(tasks), Some(finally)) = (self.tasks, self.finally)
            && tasks.saturating_add(finally) > pipeline
        {
            return Err(TimeoutError::SumExceedsPipeline {
                tasks: format_duration(tasks),
                finally: format_duration(finally),
                pipeline: format_duration(pipeline),
            });
        }

        Ok(())
    }
}

fn remainder(
    own: Option<Duration>,
    sibling: Option<Duration>,
    pipeline: Option<Duration>,
) -> Option<Duration> {
    if own.is_some() {
        return own;
    }
    match (sibling, pipeline) {
        (Some(sibling), Some(pipeline)) if !pipeline.is_zero() => pipeline
            .checked_sub(sibling)
            .filter(|left| !left.is_zero()),
        _ => None,
    }
}

impl PipelineRun {
    /// Explicit overall timeout, or the default when unset
    pub fn pipeline_timeout(&self, defaults: &Defaults) -> Duration {
        self.spec
            .timeouts
            .and_then(|t| t.pipeline)
            .unwrap_or_else(|| defaults.default_timeout())
    }

    pub fn tasks_timeout(&self) -> Option<Duration> {
        self.spec.timeouts.and_then(|t| t.tasks_timeout())
    }

    pub fn finally_timeout(&self) -> Option<Duration> {
        self.spec.timeouts.and_then(|t| t.finally_timeout())
    }

    /// True when the run has been going for longer than its overall timeout
    pub fn has_timed_out(&self, defaults: &Defaults, clock: &dyn Clock) -> bool {
        let Some(start) = self.status.start_time.filter(|_| self.has_started()) else {
            return false;
        };
        let timeout = self.pipeline_timeout(defaults);
        !timeout.is_zero() && clock.since(start) > timeout
    }

    /// True when the run has been going for at least twice its overall timeout
    pub fn has_timed_out_for_a_long_time(&self, defaults: &Defaults, clock: &dyn Clock) -> bool {
        if !self.has_timed_out(defaults, clock) {
            return false;
        }
        let Some(start) = self.status.start_time else {
            return false;
        };
        let timeout = self.pipeline_timeout(defaults);
        clock.since(start) >= timeout.saturating_mul(2)
    }

    /// True when the tasks phase has outlived its timeout
    pub fn have_tasks_timed_out(&self, clock: &dyn Clock) -> bool {
        phase_timed_out(self.status.start_time, self.tasks_timeout(), clock)
    }

    /// True when the finally phase has outlived its timeout
    pub fn has_finally_timed_out(&self, clock: &dyn Clock) -> bool {
        phase_timed_out(self.status.finally_start_time, self.finally_timeout(), clock)
    }

    /// Time left before the overall deadline; `None` when there is no deadline
    pub fn remaining_time(&self, defaults: &Defaults, clock: &dyn Clock) -> Option<Duration> {
        let start = self.status.start_time.filter(|_| self.has_started())?;
        let timeout = self.pipeline_timeout(defaults);
        if timeout.is_zero() {
            return None;
        }
        Some(timeout.saturating_sub(clock.since(start)))
    }

    /// Marks the run as failed because it exceeded its overall timeout
    pub fn set_timeout_condition(&mut self, defaults: &Defaults, clock: &dyn Clock) {
        let message = format!(
            "PipelineRun {:?} failed to finish within {:?}",
            self.metadata.name,
            format_duration(self.pipeline_timeout(defaults))
        );
        self.status.set_condition(
            Condition::new(CONDITION_SUCCEEDED, ConditionStatus::False)
                .with_reason(PipelineRunReason::TimedOut)
                .with_message(message),
            clock,
        );
        if self.status.completion_time.is_none() {
            self.status.completion_time = Some(clock.now());
        }
    }
}

fn phase_timed_out(
    start: Option<chrono::DateTime<chrono::Utc>>,
    timeout: Option<Duration>,
    clock: &dyn Clock,
) -> bool {
    match (start, timeout) {
        (Some(start), Some(timeout)) if is_time_set(Some(start)) && !timeout.is_zero() => {
            clock.since(start) > timeout
        }
        _ => false,
    }
}
