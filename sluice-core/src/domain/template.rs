//! Execution templates and per-task overrides
//!
//! A run carries a default [`TaskRunTemplate`] and an optional list of
//! [`PipelineTaskRunSpec`] overrides keyed by pipeline task name.
//! [`resolve_task_run_spec`] produces the effective settings for one task by
//! merging the override onto the default field by field.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashSet};

/// Task name used to ask for the run-level defaults
pub const UNKNOWN_TASK: &str = "unknown";

/// Scheduling, placement and security settings for the pods running a task
///
/// Every field is optional: `None` means "not set here" and is inherited
/// during a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automount_service_account_token: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_service_links: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplemental_groups: Option<Vec<i64>>,
}

/// A pod volume; the source (`emptyDir`, `secret`, ...) is kept opaque
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,

    #[serde(flatten)]
    pub source: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for EnvVar {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Volume {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Override entries first, then default entries whose name the override does not use
fn merge_by_name<T: Named + Clone>(defaults: &[T], overrides: &[T]) -> Vec<T> {
    let taken: HashSet<&str> = overrides.iter().map(Named::name).collect();
    overrides
        .iter()
        .cloned()
        .chain(defaults.iter().filter(|d| !taken.contains(d.name())).cloned())
        .collect()
}

fn merge_named_list<T: Named + Clone>(
    overrides: &Option<Vec<T>>,
    defaults: &Option<Vec<T>>,
) -> Option<Vec<T>> {
    match (overrides, defaults) {
        (Some(o), Some(d)) => Some(merge_by_name(d, o)),
        (Some(o), None) => Some(o.clone()),
        (None, d) => d.clone(),
    }
}

impl PodTemplate {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self == &PodTemplate::default()
    }

    /// Merges `overrides` onto `defaults`
    ///
    /// Each field set on `overrides` wins; each unset field is inherited from
    /// `defaults` individually. `env` and `volumes` are merged by entry name.
    pub fn merge_with_default(
        overrides: Option<&PodTemplate>,
        defaults: Option<&PodTemplate>,
    ) -> Option<PodTemplate> {
        let (o, d) = match (overrides, defaults) {
            (None, None) => return None,
            (Some(o), None) => return Some(o.clone()),
            (None, Some(d)) => return Some(d.clone()),
            (Some(o), Some(d)) => (o, d),
        };

        Some(PodTemplate {
            node_selector: o.node_selector.clone().or_else(|| d.node_selector.clone()),
            env: merge_named_list(&o.env, &d.env),
            tolerations: o.tolerations.clone().or_else(|| d.tolerations.clone()),
            security_context: o
                .security_context
                .clone()
                .or_else(|| d.security_context.clone()),
            volumes: merge_named_list(&o.volumes, &d.volumes),
            runtime_class_name: o
                .runtime_class_name
                .clone()
                .or_else(|| d.runtime_class_name.clone()),
            automount_service_account_token: o
                .automount_service_account_token
                .or(d.automount_service_account_token),
            dns_policy: o.dns_policy.clone().or_else(|| d.dns_policy.clone()),
            enable_service_links: o.enable_service_links.or(d.enable_service_links),
            priority_class_name: o
                .priority_class_name
                .clone()
                .or_else(|| d.priority_class_name.clone()),
            scheduler_name: o
                .scheduler_name
                .clone()
                .or_else(|| d.scheduler_name.clone()),
            image_pull_secrets: o
                .image_pull_secrets
                .clone()
                .or_else(|| d.image_pull_secrets.clone()),
            host_network: o.host_network.or(d.host_network),
        })
    }
}

/// Run-level defaults for every task execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunTemplate {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplate>,
}

/// Labels and annotations added to a single task's execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Resource limits and requests, e.g. `cpu: "500m"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Execution settings for one pipeline task
///
/// Used both as the per-task override stored on a run and as the resolved
/// result of [`resolve_task_run_spec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTaskRunSpec {
    pub pipeline_task_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_resources: Option<ResourceRequirements>,
}

/// Resolves the effective execution settings for `task_name`
///
/// Without an override for `task_name` (including [`UNKNOWN_TASK`]) the
/// run-level template is returned verbatim. With one, a non-empty override
/// service account wins and the pod templates are merged field by field.
pub fn resolve_task_run_spec(
    task_name: &str,
    template: &TaskRunTemplate,
    overrides: &[PipelineTaskRunSpec],
) -> PipelineTaskRunSpec {
    let mut resolved = PipelineTaskRunSpec {
        pipeline_task_name: task_name.to_string(),
        service_account_name: template.service_account_name.clone(),
        pod_template: template.pod_template.clone(),
        metadata: None,
        compute_resources: None,
    };

    let Some(task_override) = overrides.iter().find(|o| o.pipeline_task_name == task_name) else {
        return resolved;
    };

    if !task_override.service_account_name.is_empty() {
        resolved.service_account_name = task_override.service_account_name.clone();
    }
    resolved.pod_template = PodTemplate::merge_with_default(
        task_override.pod_template.as_ref(),
        template.pod_template.as_ref(),
    );
    resolved.metadata = task_override.metadata.clone();
    resolved.compute_resources = task_override.compute_resources.clone();

    resolved
}
