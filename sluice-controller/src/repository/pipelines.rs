//! Pipeline resolution
//!
//! Turns a run's pipeline reference (or embedded spec) into the pipeline
//! object the run executes.

use async_trait::async_trait;
use sluice_client::{ApiResource, ClientError, ControlPlaneClient};
use sluice_core::domain::{
    DynamicObject, GroupVersionKind, NamespacedName, ObjectMeta, PipelineRef, PipelineRun,
};
use std::collections::HashMap;
use thiserror::Error;

const PIPELINE_KIND: &str = "Pipeline";
const DEFAULT_PIPELINE_API_VERSION: &str = "tekton.dev/v1";

/// Resolver that fetches definitions from another namespace of this cluster
pub const CLUSTER_RESOLVER: &str = "cluster";

/// A pipeline ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPipeline {
    pub object: DynamicObject,
    /// Fetched through a resolver; must be dry-run validated before use
    pub remote: bool,
}

/// Why a run's pipeline could not be resolved
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("run {0} has neither pipelineRef nor pipelineSpec")]
    MissingReference(NamespacedName),

    #[error("invalid pipelineRef: {0}")]
    InvalidReference(String),

    #[error("pipeline {name:?} not found in namespace {namespace:?}")]
    NotFound { namespace: String, name: String },

    #[error("resolver {0:?} is not available to this controller")]
    UnsupportedResolver(String),

    #[error("failed to fetch pipeline {name:?}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: ClientError,
    },
}

impl ResolveError {
    /// The run's own reference is at fault and only editing the run helps
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::MissingReference(_) | Self::InvalidReference(_) | Self::NotFound { .. }
        )
    }

    /// Another attempt may succeed without anything changing on the run
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { source, .. } if source.is_transient())
    }
}

/// Resolves the pipeline a run refers to
///
/// Implementations set [`ResolvedPipeline::remote`] for definitions that did
/// not come from the run's own namespace by name; the reconciler dry-run
/// validates those before planning.
#[async_trait]
pub trait PipelineResolver: Send + Sync {
    async fn resolve(&self, run: &PipelineRun) -> Result<ResolvedPipeline, ResolveError>;
}

/// Wraps an embedded pipeline spec as a pipeline object named after the run
fn embedded(run: &PipelineRun) -> Option<ResolvedPipeline> {
    let spec = run.spec.pipeline_spec.clone()?;
    let mut object = DynamicObject {
        api_version: DEFAULT_PIPELINE_API_VERSION.to_string(),
        kind: PIPELINE_KIND.to_string(),
        metadata: ObjectMeta::named(run.metadata.namespace.clone(), run.metadata.name.clone()),
        ..Default::default()
    };
    object.data.insert("spec".to_string(), spec);
    Some(ResolvedPipeline {
        object,
        remote: false,
    })
}

fn param<'a>(reference: &'a PipelineRef, name: &str) -> Option<&'a str> {
    reference
        .params
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_str())
}

/// Where a pipeline reference points inside the cluster
#[derive(Debug, PartialEq)]
struct Target {
    api_version: String,
    namespace: String,
    name: String,
    remote: bool,
}

fn target(run: &PipelineRun, reference: &PipelineRef) -> Result<Target, ResolveError> {
    let api_version = reference
        .api_version
        .clone()
        .unwrap_or_else(|| DEFAULT_PIPELINE_API_VERSION.to_string());

    match reference.resolver.as_deref() {
        None => {
            if reference.name.is_empty() {
                return Err(ResolveError::InvalidReference(format!(
                    "pipelineRef of run {} has no name",
                    run.namespaced_name()
                )));
            }
            Ok(Target {
                api_version,
                namespace: run.metadata.namespace.clone(),
                name: reference.name.clone(),
                remote: false,
            })
        }
        Some(CLUSTER_RESOLVER) => {
            let kind = param(reference, "kind").unwrap_or("pipeline");
            if !kind.eq_ignore_ascii_case(PIPELINE_KIND) {
                return Err(ResolveError::InvalidReference(format!(
                    "cluster resolver kind {:?} is not a pipeline",
                    kind
                )));
            }
            let name = param(reference, "name").filter(|n| !n.is_empty()).ok_or_else(|| {
                ResolveError::InvalidReference("cluster resolver needs a name param".to_string())
            })?;
            let namespace = param(reference, "namespace")
                .filter(|n| !n.is_empty())
                .unwrap_or(&run.metadata.namespace);
            Ok(Target {
                api_version,
                namespace: namespace.to_string(),
                name: name.to_string(),
                remote: true,
            })
        }
        Some(other) => Err(ResolveError::UnsupportedResolver(other.to_string())),
    }
}

/// Resolves references through the control-plane API
///
/// Plain references are read from the run's namespace. The `cluster`
/// resolver reads from the namespace named in its params, and what it
/// returns is treated as remote. Other resolvers are not served here.
pub struct ApiPipelineResolver {
    client: ControlPlaneClient,
}

impl ApiPipelineResolver {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineResolver for ApiPipelineResolver {
    async fn resolve(&self, run: &PipelineRun) -> Result<ResolvedPipeline, ResolveError> {
        if let Some(resolved) = embedded(run) {
            return Ok(resolved);
        }

        let reference = run
            .spec
            .pipeline_ref
            .as_ref()
            .ok_or_else(|| ResolveError::MissingReference(run.namespaced_name()))?;
        let location = target(run, reference)?;

        let gvk = GroupVersionKind::from_api_version(&location.api_version, PIPELINE_KIND);
        let resource = ApiResource::new(gvk.group, gvk.version, "pipelines");
        let object: DynamicObject = self
            .client
            .get(&resource, &location.namespace, &location.name)
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    ResolveError::NotFound {
                        namespace: location.namespace.clone(),
                        name: location.name.clone(),
                    }
                } else {
                    ResolveError::Fetch {
                        name: location.name.clone(),
                        source,
                    }
                }
            })?;

        Ok(ResolvedPipeline {
            object,
            remote: location.remote,
        })
    }
}

/// Pipelines registered up front, keyed by reference name
///
/// Useful wherever pipelines come from a fixed catalogue, such as tests.
#[derive(Default)]
pub struct InMemoryPipelineResolver {
    pipelines: HashMap<String, ResolvedPipeline>,
}

impl InMemoryPipelineResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, name: impl Into<String>, pipeline: ResolvedPipeline) -> Self {
        self.pipelines.insert(name.into(), pipeline);
        self
    }
}

#[async_trait]
impl PipelineResolver for InMemoryPipelineResolver {
    async fn resolve(&self, run: &PipelineRun) -> Result<ResolvedPipeline, ResolveError> {
        if let Some(resolved) = embedded(run) {
            return Ok(resolved);
        }
        let reference = run
            .spec
            .pipeline_ref
            .as_ref()
            .ok_or_else(|| ResolveError::MissingReference(run.namespaced_name()))?;
        self.pipelines
            .get(&reference.name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                namespace: run.metadata.namespace.clone(),
                name: reference.name.clone(),
            })
    }
}
