//! Namespaced resource endpoints

use crate::ControlPlaneClient;
use crate::error::Result;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A namespaced collection on the API server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiResource {
    /// API group; empty for the core group
    pub group: String,
    pub version: String,
    /// Lower-case plural used in URLs, e.g. `pipelineruns`
    pub plural: String,
}

impl ApiResource {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
        }
    }

    /// `tekton.dev/v1` pipeline runs
    pub fn pipeline_runs() -> Self {
        Self::new("tekton.dev", "v1", "pipelineruns")
    }

    /// Path of the collection inside `namespace`
    pub fn collection_path(&self, namespace: &str) -> String {
        if self.group.is_empty() {
            format!("/api/{}/namespaces/{}/{}", self.version, namespace, self.plural)
        } else {
            format!(
                "/apis/{}/{}/namespaces/{}/{}",
                self.group, self.version, namespace, self.plural
            )
        }
    }

    /// Path of a single object inside `namespace`
    pub fn object_path(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_path(namespace), name)
    }
}

impl ControlPlaneClient {
    // =============================================================================
    // Create
    // =============================================================================

    /// Create an object in `namespace`
    ///
    /// With `dry_run` set the server runs admission and defaulting but stores
    /// nothing; the returned object is what would have been persisted.
    pub async fn create<B, T>(
        &self,
        resource: &ApiResource,
        namespace: &str,
        body: &B,
        dry_run: bool,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, resource.collection_path(namespace));
        tracing::debug!(%url, dry_run, "Creating object");

        let mut request = self.request(Method::POST, &url).json(body);
        if dry_run {
            request = request.query(&[("dryRun", "All")]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Read & Status
    // =============================================================================

    /// Get an object by name
    pub async fn get<T: DeserializeOwned>(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, resource.object_path(namespace, name));
        let response = self.request(Method::GET, &url).send().await?;

        self.handle_response(response).await
    }

    /// Replace the status subresource of an object
    pub async fn replace_status<B, T>(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!(
            "{}{}/status",
            self.base_url,
            resource.object_path(namespace, name)
        );
        let response = self.request(Method::PUT, &url).json(body).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let tasks = ApiResource::new("tekton.dev", "v1beta1", "tasks");
        assert_eq!(
            tasks.collection_path("ci"),
            "/apis/tekton.dev/v1beta1/namespaces/ci/tasks"
        );
        assert_eq!(
            ApiResource::pipeline_runs().object_path("ci", "pr-1"),
            "/apis/tekton.dev/v1/namespaces/ci/pipelineruns/pr-1"
        );

        let config_maps = ApiResource::new("", "v1", "configmaps");
        assert_eq!(config_maps.collection_path("ci"), "/api/v1/namespaces/ci/configmaps");
    }
}
