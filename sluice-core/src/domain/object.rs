//! Untyped API objects
//!
//! Referenced definitions (tasks, pipelines, step actions) are carried as
//! JSON with just enough structure to route them by kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::meta::ObjectMeta;

/// API group, version and kind of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Splits an `apiVersion` such as `tekton.dev/v1` into group and version
    ///
    /// A value without a slash belongs to the core group.
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.api_version(), self.kind)
    }
}

/// Any API object: type header, metadata, and everything else kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub data: Map<String, JsonValue>,
}

impl DynamicObject {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version(&self.api_version, self.kind.clone())
    }

    pub fn spec(&self) -> Option<&JsonValue> {
        self.data.get("spec")
    }
}

/// Names of the main and finally tasks declared by a pipeline spec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineTaskNames {
    pub tasks: Vec<String>,
    pub finally: Vec<String>,
}

impl PipelineTaskNames {
    /// Reads `tasks[].name` and `finally[].name`; entries without a name are skipped
    pub fn from_spec(spec: &JsonValue) -> Self {
        Self {
            tasks: names_in(spec, "tasks"),
            finally: names_in(spec, "finally"),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().chain(self.finally.iter()).map(String::as_str)
    }
}

fn names_in(spec: &JsonValue, field: &str) -> Vec<String> {
    spec.get(field)
        .and_then(JsonValue::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|t| t.get("name").and_then(JsonValue::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
