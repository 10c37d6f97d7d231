//! Core domain types
//!
//! These types describe a pipeline run and the objects it references. They
//! are shared between the client (wire format) and the controller (logic).

pub mod condition;
pub mod meta;
pub mod object;
pub mod reason;
pub mod run;
pub mod template;
pub mod timeout;

pub use condition::{CONDITION_SUCCEEDED, Condition, ConditionStatus, Conditions};
pub use meta::{NamespacedName, ObjectMeta};
pub use object::{DynamicObject, GroupVersionKind, PipelineTaskNames};
pub use reason::PipelineRunReason;
pub use run::{Param, PipelineRef, PipelineRun, PipelineRunSpec, PipelineRunStatus, RunSpecStatus};
pub use template::{PipelineTaskRunSpec, PodTemplate, TaskRunTemplate};
pub use timeout::{TimeoutError, TimeoutFields};
