//! Pipeline run records and their lifecycle
//!
//! A [`PipelineRun`] is created once per execution request and mutated in
//! place by successive reconciliation passes until its `Succeeded`
//! condition becomes `True` or `False`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::clock::Clock;
use crate::domain::condition::{CONDITION_SUCCEEDED, Condition, ConditionStatus, Conditions};
use crate::domain::meta::{NamespacedName, ObjectMeta};
use crate::domain::reason::PipelineRunReason;
use crate::domain::template::{PipelineTaskRunSpec, TaskRunTemplate, resolve_task_run_spec};
use crate::domain::timeout::TimeoutFields;
use crate::error::{MessageArg, format_message};

pub const PIPELINE_RUN_API_VERSION: &str = "tekton.dev/v1";
pub const PIPELINE_RUN_KIND: &str = "PipelineRun";

fn default_api_version() -> String {
    PIPELINE_RUN_API_VERSION.to_string()
}

fn default_kind() -> String {
    PIPELINE_RUN_KIND.to_string()
}

/// One execution instance of a declared pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PipelineRunSpec,

    #[serde(default)]
    pub status: PipelineRunStatus,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::default(),
            spec: PipelineRunSpec::default(),
            status: PipelineRunStatus::default(),
        }
    }
}

/// Cancellation and pending requests written to a run's spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunSpecStatus {
    /// Cancel immediately; running tasks are stopped and finally tasks are skipped
    Cancelled,
    /// Let started tasks finish, then run the finally tasks
    CancelledRunFinally,
    /// Start no new tasks, then run the finally tasks
    StoppedRunFinally,
    /// Hold the run before it starts
    #[serde(rename = "PipelineRunPending")]
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_ref: Option<PipelineRef>,

    /// Embedded pipeline definition, used when no reference is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_spec: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutFields>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RunSpecStatus>,

    #[serde(default)]
    pub task_run_template: TaskRunTemplate,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_run_specs: Vec<PipelineTaskRunSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceBinding>,

    /// Spec fields this crate does not interpret, such as `params`
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Reference to a pipeline definition, in-cluster by name or through a resolver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: JsonValue,
}

/// Binds a pipeline workspace to a volume source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceBinding {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunStatus {
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finally_start_time: Option<DateTime<Utc>>,

    /// Status written by other collaborators (child references, results),
    /// carried through every write-back untouched
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// A timestamp at or before the Unix epoch counts as unset
pub(crate) fn is_time_set(time: Option<DateTime<Utc>>) -> bool {
    time.is_some_and(|t| t.timestamp() > 0)
}

impl PipelineRunStatus {
    pub fn get_condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.get(condition_type)
    }

    pub fn set_condition(&mut self, condition: Condition, clock: &dyn Clock) {
        self.conditions.set(condition, clock);
    }

    /// The `Succeeded` condition, if initialised
    pub fn succeeded(&self) -> Option<&Condition> {
        self.conditions.get(CONDITION_SUCCEEDED)
    }

    /// Installs `Succeeded=Unknown/Started` if absent and records the start time if unset
    ///
    /// An existing `Succeeded` condition is left untouched, so calling this on a
    /// run that already reported progress keeps its reason and message.
    pub fn initialize_conditions(&mut self, clock: &dyn Clock) {
        if !is_time_set(self.start_time) {
            self.start_time = Some(clock.now());
        }

        if self.succeeded().is_none() {
            self.set_condition(
                Condition::new(CONDITION_SUCCEEDED, ConditionStatus::Unknown)
                    .with_reason(PipelineRunReason::Started),
                clock,
            );
        }
    }

    /// True once `Succeeded` is `True` or `False`
    pub fn is_done(&self) -> bool {
        self.succeeded().is_some_and(|c| !c.is_unknown())
    }

    /// Marks the run as in progress with the given reason
    pub fn mark_running(
        &mut self,
        reason: impl AsRef<str>,
        message: impl Into<String>,
        clock: &dyn Clock,
    ) {
        self.set_condition(
            Condition::new(CONDITION_SUCCEEDED, ConditionStatus::Unknown)
                .with_reason(reason.as_ref())
                .with_message(message),
            clock,
        );
    }

    /// Marks the run as succeeded and records the completion time
    pub fn mark_succeeded(
        &mut self,
        reason: impl AsRef<str>,
        message: impl Into<String>,
        clock: &dyn Clock,
    ) {
        self.set_condition(
            Condition::new(CONDITION_SUCCEEDED, ConditionStatus::True)
                .with_reason(reason.as_ref())
                .with_message(message),
            clock,
        );
        self.record_completion(clock);
    }

    /// Marks the run as failed with a message built from `template` and `args`
    ///
    /// `{}` placeholders in `template` are replaced by `args` in order. If any
    /// argument is a [`crate::error::UserError`] the message is prefixed with
    /// `[User error]`.
    pub fn mark_failed(
        &mut self,
        reason: impl AsRef<str>,
        template: &str,
        args: &[MessageArg],
        clock: &dyn Clock,
    ) {
        self.set_condition(
            Condition::new(CONDITION_SUCCEEDED, ConditionStatus::False)
                .with_reason(reason.as_ref())
                .with_message(format_message(template, args)),
            clock,
        );
        self.record_completion(clock);
    }

    /// Records when the finally phase began; an existing value is kept
    pub fn mark_finally_started(&mut self, clock: &dyn Clock) {
        if !is_time_set(self.finally_start_time) {
            self.finally_start_time = Some(clock.now());
        }
    }

    fn record_completion(&mut self, clock: &dyn Clock) {
        if self.completion_time.is_none() {
            self.completion_time = Some(clock.now());
        }
    }
}

impl PipelineRun {
    pub fn namespaced_name(&self) -> NamespacedName {
        self.metadata.namespaced_name()
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }

    /// True iff the start time is set and non-zero
    pub fn has_started(&self) -> bool {
        is_time_set(self.status.start_time)
    }

    /// Immediate cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.spec.status == Some(RunSpecStatus::Cancelled)
    }

    /// Graceful cancellation was requested: started tasks finish, finally still runs
    pub fn is_gracefully_cancelled(&self) -> bool {
        self.spec.status == Some(RunSpecStatus::CancelledRunFinally)
    }

    /// Graceful stop was requested: no new tasks start, finally still runs
    pub fn is_gracefully_stopped(&self) -> bool {
        self.spec.status == Some(RunSpecStatus::StoppedRunFinally)
    }

    pub fn is_pending(&self) -> bool {
        self.spec.status == Some(RunSpecStatus::Pending)
    }

    pub fn has_volume_claim_template(&self) -> bool {
        self.spec
            .workspaces
            .iter()
            .any(|ws| ws.volume_claim_template.is_some())
    }

    /// Effective execution settings for `task_name`
    pub fn get_task_run_spec(&self, task_name: &str) -> PipelineTaskRunSpec {
        resolve_task_run_spec(
            task_name,
            &self.spec.task_run_template,
            &self.spec.task_run_specs,
        )
    }

    /// True iff `Succeeded` is `False` with the timed-out reason
    pub fn is_timeout_condition_set(&self) -> bool {
        self.status.succeeded().is_some_and(|c| {
            c.is_false() && c.reason == PipelineRunReason::TimedOut.as_str()
        })
    }

    /// Marks the run as cancelled following an immediate cancellation request
    pub fn mark_cancelled(&mut self, clock: &dyn Clock) {
        let message = format!("PipelineRun {:?} was cancelled", self.metadata.name);
        self.status
            .mark_failed(PipelineRunReason::Cancelled, &message, &[], clock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::UserError;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn run_with_spec_status(status: RunSpecStatus) -> PipelineRun {
        PipelineRun {
            spec: PipelineRunSpec {
                status: Some(status),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_conditions() {
        let clock = FakeClock::new(now());
        let mut run = PipelineRun {
            metadata: ObjectMeta::named("test-ns", "test-name"),
            ..Default::default()
        };
        run.status.initialize_conditions(&clock);

        assert_eq!(run.status.start_time, Some(now()));
        let cond = run.status.succeeded().unwrap();
        assert!(cond.is_unknown());
        assert_eq!(cond.reason, "Started");

        run.status.set_condition(
            Condition::new(CONDITION_SUCCEEDED, ConditionStatus::Unknown)
                .with_reason("not just started")
                .with_message("hello"),
            &clock,
        );
        clock.advance(chrono::Duration::minutes(3));
        run.status.initialize_conditions(&clock);

        let cond = run.status.succeeded().unwrap();
        assert_eq!(cond.reason, "not just started");
        assert_eq!(cond.message, "hello");
        assert_eq!(run.status.start_time, Some(now()));
    }

    #[test]
    fn test_is_done() {
        let clock = FakeClock::new(now());
        let mut run = PipelineRun::default();
        assert!(!run.is_done());

        run.status
            .set_condition(Condition::new(CONDITION_SUCCEEDED, ConditionStatus::False), &clock);
        assert!(run.is_done());
    }

    #[test]
    fn test_spec_status_signals() {
        assert!(run_with_spec_status(RunSpecStatus::Cancelled).is_cancelled());
        assert!(run_with_spec_status(RunSpecStatus::CancelledRunFinally).is_gracefully_cancelled());
        assert!(run_with_spec_status(RunSpecStatus::StoppedRunFinally).is_gracefully_stopped());
        assert!(run_with_spec_status(RunSpecStatus::Pending).is_pending());

        let graceful = run_with_spec_status(RunSpecStatus::CancelledRunFinally);
        assert!(!graceful.is_cancelled());
        assert!(!graceful.is_gracefully_stopped());
    }

    #[test]
    fn test_spec_status_wire_values() {
        let json = serde_json::to_value(RunSpecStatus::Pending).unwrap();
        assert_eq!(json, "PipelineRunPending");
        let parsed: RunSpecStatus = serde_json::from_value("StoppedRunFinally".into()).unwrap();
        assert_eq!(parsed, RunSpecStatus::StoppedRunFinally);
    }

    #[test]
    fn test_has_volume_claim_template() {
        let run = PipelineRun {
            spec: PipelineRunSpec {
                workspaces: vec![WorkspaceBinding {
                    name: "my-workspace".to_string(),
                    volume_claim_template: Some(serde_json::json!({
                        "metadata": { "name": "pvc" },
                        "spec": {}
                    })),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(run.has_volume_claim_template());
        assert!(!PipelineRun::default().has_volume_claim_template());
    }

    #[test]
    fn test_has_started() {
        let mut run = PipelineRun::default();
        assert!(!run.has_started());

        run.status.start_time = Some(now());
        assert!(run.has_started());

        run.status.start_time = Some(DateTime::<Utc>::UNIX_EPOCH);
        assert!(!run.has_started());
    }

    #[test]
    fn test_is_timeout_condition_set() {
        let clock = FakeClock::new(now());
        let cases = [
            (ConditionStatus::False, PipelineRunReason::TimedOut, true),
            (ConditionStatus::Unknown, PipelineRunReason::TimedOut, false),
            (ConditionStatus::False, PipelineRunReason::Failed, false),
        ];

        for (status, reason, want) in cases {
            let mut run = PipelineRun::default();
            run.status.set_condition(
                Condition::new(CONDITION_SUCCEEDED, status).with_reason(reason),
                &clock,
            );
            assert_eq!(run.is_timeout_condition_set(), want, "{:?}/{}", status, reason);
        }
    }

    #[test]
    fn test_mark_failed_with_user_error() {
        let clock = FakeClock::new(now());
        let mut run = PipelineRun::default();
        run.status.start_time = Some(now());

        run.status.mark_failed(
            PipelineRunReason::Failed,
            "error bar occurred {}",
            &[UserError::wrap("original error").into()],
            &clock,
        );

        let cond = run.status.succeeded().unwrap();
        assert!(cond.is_false());
        assert_eq!(cond.reason, "Failed");
        assert_eq!(cond.message, "[User error] error bar occurred original error");
        assert_eq!(run.status.conditions.len(), 1);
    }

    #[test]
    fn test_mark_failed_plain_message() {
        let clock = FakeClock::new(now());
        let mut run = PipelineRun::default();

        run.status.mark_failed(
            PipelineRunReason::Failed,
            "error bar occurred {}",
            &["baz error message".into()],
            &clock,
        );

        let cond = run.status.succeeded().unwrap();
        assert_eq!(cond.message, "error bar occurred baz error message");
        assert_eq!(run.status.completion_time, Some(now()));
    }

    #[test]
    fn test_mark_succeeded_keeps_first_completion_time() {
        let clock = FakeClock::new(now());
        let mut run = PipelineRun::default();
        run.status.mark_succeeded(PipelineRunReason::Succeeded, "All Tasks have completed executing", &clock);
        clock.advance(chrono::Duration::minutes(1));
        run.status.mark_succeeded(PipelineRunReason::Succeeded, "again", &clock);

        assert!(run.status.succeeded().unwrap().is_true());
        assert_eq!(run.status.completion_time, Some(now()));
    }

    #[test]
    fn test_mark_finally_started_never_moves() {
        let clock = FakeClock::new(now());
        let mut status = PipelineRunStatus::default();
        status.mark_finally_started(&clock);
        clock.advance(chrono::Duration::minutes(10));
        status.mark_finally_started(&clock);
        assert_eq!(status.finally_start_time, Some(now()));
    }

    #[test]
    fn test_mark_cancelled() {
        let clock = FakeClock::new(now());
        let mut run = PipelineRun {
            metadata: ObjectMeta::named("ns", "build-42"),
            ..Default::default()
        };
        run.mark_cancelled(&clock);

        let cond = run.status.succeeded().unwrap();
        assert!(cond.is_false());
        assert_eq!(cond.reason, "Cancelled");
        assert_eq!(cond.message, "PipelineRun \"build-42\" was cancelled");
    }

    #[test]
    fn test_run_json_round_trip_keeps_optional_timeouts() {
        let json = serde_json::json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": { "name": "pr", "namespace": "ns" },
            "spec": {
                "pipelineRef": { "name": "build" },
                "timeouts": { "pipeline": "0s", "tasks": "0s" },
                "taskRunTemplate": { "serviceAccountName": "builder" }
            }
        });

        let run: PipelineRun = serde_json::from_value(json).unwrap();
        let timeouts = run.spec.timeouts.unwrap();
        assert_eq!(timeouts.pipeline, Some(std::time::Duration::ZERO));
        assert_eq!(timeouts.tasks, Some(std::time::Duration::ZERO));
        assert_eq!(timeouts.finally, None);

        let out = serde_json::to_value(&run).unwrap();
        assert_eq!(out["spec"]["timeouts"], serde_json::json!({ "pipeline": "0s", "tasks": "0s" }));
    }

    #[test]
    fn test_unmodelled_fields_survive_a_status_update() {
        let clock = FakeClock::new(now());
        let json = serde_json::json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": { "name": "pr", "namespace": "ns", "generation": 3 },
            "spec": {
                "pipelineRef": { "name": "build" },
                "params": [{ "name": "revision", "value": "main" }]
            },
            "status": {
                "startTime": "2024-05-01T12:00:00Z",
                "childReferences": [{ "name": "pr-compile", "pipelineTaskName": "compile" }],
                "results": [{ "name": "digest", "value": "sha256:abc" }]
            }
        });

        let mut run: PipelineRun = serde_json::from_value(json.clone()).unwrap();
        run.status.initialize_conditions(&clock);
        let out = serde_json::to_value(&run).unwrap();

        assert_eq!(out["status"]["childReferences"], json["status"]["childReferences"]);
        assert_eq!(out["status"]["results"], json["status"]["results"]);
        assert_eq!(out["spec"]["params"], json["spec"]["params"]);
        assert_eq!(out["metadata"]["generation"], 3);
        assert_eq!(out["status"]["conditions"][0]["type"], "Succeeded");
    }
}
