//! Reasons recorded on a run's `Succeeded` condition

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineRunReason {
    /// Conditions were just initialised
    Started,
    /// Tasks are executing
    Running,
    /// Every task succeeded
    Succeeded,
    /// Finished with some tasks skipped
    Completed,
    /// A task or the run itself failed
    Failed,
    /// Cancelled on request
    Cancelled,
    #[serde(rename = "PipelineRunPending")]
    Pending,
    #[serde(rename = "PipelineRunTimeout")]
    TimedOut,
    #[serde(rename = "PipelineRunStopping")]
    Stopping,
    /// Cancelled gracefully; finally tasks are still running
    CancelledRunningFinally,
    /// Stopped gracefully; finally tasks are still running
    StoppedRunningFinally,
    /// The referenced pipeline could not be retrieved
    CouldntGetPipeline,
    /// The referenced pipeline was rejected by the control plane
    PipelineValidationFailed,
    /// The referenced pipeline could not be checked at all
    CouldntValidatePipeline,
    /// The run's timeouts are inconsistent
    InvalidTimeouts,
}

impl PipelineRunReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineRunReason::Started => "Started",
            PipelineRunReason::Running => "Running",
            PipelineRunReason::Succeeded => "Succeeded",
            PipelineRunReason::Completed => "Completed",
            PipelineRunReason::Failed => "Failed",
            PipelineRunReason::Cancelled => "Cancelled",
            PipelineRunReason::Pending => "PipelineRunPending",
            PipelineRunReason::TimedOut => "PipelineRunTimeout",
            PipelineRunReason::Stopping => "PipelineRunStopping",
            PipelineRunReason::CancelledRunningFinally => "CancelledRunningFinally",
            PipelineRunReason::StoppedRunningFinally => "StoppedRunningFinally",
            PipelineRunReason::CouldntGetPipeline => "CouldntGetPipeline",
            PipelineRunReason::PipelineValidationFailed => "PipelineValidationFailed",
            PipelineRunReason::CouldntValidatePipeline => "CouldntValidatePipeline",
            PipelineRunReason::InvalidTimeouts => "InvalidTimeouts",
        }
    }
}

impl std::fmt::Display for PipelineRunReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PipelineRunReason> for String {
    fn from(reason: PipelineRunReason) -> Self {
        reason.as_str().to_string()
    }
}

impl AsRef<str> for PipelineRunReason {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
