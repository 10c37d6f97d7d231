//! Dry-run routes per object kind
//!
//! Each supported group/version/kind maps to a [`DryRunCreate`] that knows
//! where to send a non-persisting create for that kind.

use async_trait::async_trait;
use sluice_client::{ApiResource, ClientError, ControlPlaneClient};
use sluice_core::domain::{DynamicObject, GroupVersionKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Kinds routed by [`KindRegistry::with_default_routes`]: group, version, kind, plural
const DEFAULT_KINDS: &[(&str, &str, &str, &str)] = &[
    ("tekton.dev", "v1", "Task", "tasks"),
    ("tekton.dev", "v1beta1", "Task", "tasks"),
    ("tekton.dev", "v1", "Pipeline", "pipelines"),
    ("tekton.dev", "v1beta1", "Pipeline", "pipelines"),
    ("tekton.dev", "v1alpha1", "StepAction", "stepactions"),
    ("tekton.dev", "v1beta1", "StepAction", "stepactions"),
];

/// Issues a non-persisting create for one kind
#[async_trait]
pub trait DryRunCreate: Send + Sync {
    /// Returns the object as the server would have stored it
    async fn dry_run_create(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError>;
}

/// Dry-run create through the control-plane API
pub struct ApiDryRunCreate {
    client: ControlPlaneClient,
    resource: ApiResource,
}

impl ApiDryRunCreate {
    pub fn new(client: ControlPlaneClient, resource: ApiResource) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl DryRunCreate for ApiDryRunCreate {
    async fn dry_run_create(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        self.client
            .create(&self.resource, namespace, object, true)
            .await
    }
}

/// Map from kind to its dry-run route
#[derive(Clone, Default)]
pub struct KindRegistry {
    routes: BTreeMap<GroupVersionKind, Arc<dyn DryRunCreate>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every default kind through `client`
    pub fn with_default_routes(client: &ControlPlaneClient) -> Self {
        let mut registry = Self::new();
        for (group, version, kind, plural) in DEFAULT_KINDS {
            registry.register(
                GroupVersionKind::new(*group, *version, *kind),
                Arc::new(ApiDryRunCreate::new(
                    client.clone(),
                    ApiResource::new(*group, *version, *plural),
                )),
            );
        }
        registry
    }

    /// Adds or replaces the route for `gvk`
    pub fn register(&mut self, gvk: GroupVersionKind, route: Arc<dyn DryRunCreate>) {
        self.routes.insert(gvk, route);
    }

    pub fn get(&self, gvk: &GroupVersionKind) -> Option<Arc<dyn DryRunCreate>> {
        self.routes.get(gvk).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.routes.keys()
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds().map(ToString::to_string)).finish()
    }
}
