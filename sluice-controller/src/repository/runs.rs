//! Runs repository
//!
//! Loads a run by identity and writes back its status at the end of a pass.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sluice_client::ControlPlaneClient;
use sluice_core::domain::{NamespacedName, PipelineRun};
use std::collections::HashMap;
use std::sync::Mutex;

/// Repository trait for pipeline runs
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Fetches a run; `None` when it no longer exists
    async fn get(&self, key: &NamespacedName) -> Result<Option<PipelineRun>>;

    /// Persists the status of `run`
    async fn update_status(&self, run: &PipelineRun) -> Result<()>;
}

/// Runs kept in process memory
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<HashMap<NamespacedName, PipelineRun>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `run`, replacing any run with the same identity
    pub fn insert(&self, run: PipelineRun) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.insert(run.namespaced_name(), run);
    }

    /// Returns a copy of the stored run
    pub fn snapshot(&self, key: &NamespacedName) -> Option<PipelineRun> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.get(key).cloned()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn get(&self, key: &NamespacedName) -> Result<Option<PipelineRun>> {
        Ok(self.snapshot(key))
    }

    async fn update_status(&self, run: &PipelineRun) -> Result<()> {
        let key = run.namespaced_name();
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let stored = runs
            .get_mut(&key)
            .with_context(|| format!("run {} does not exist", key))?;
        stored.status = run.status.clone();
        Ok(())
    }
}

/// Runs stored behind the control-plane API
pub struct ApiRunRepository {
    client: ControlPlaneClient,
}

impl ApiRunRepository {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RunRepository for ApiRunRepository {
    async fn get(&self, key: &NamespacedName) -> Result<Option<PipelineRun>> {
        match self.client.get_pipeline_run(key).await {
            Ok(run) => Ok(Some(run)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch run {}", key)),
        }
    }

    async fn update_status(&self, run: &PipelineRun) -> Result<()> {
        self.client
            .update_pipeline_run_status(run)
            .await
            .with_context(|| format!("Failed to update status of run {}", run.namespaced_name()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::ObjectMeta;

    fn run(name: &str) -> PipelineRun {
        PipelineRun {
            metadata: ObjectMeta::named("ci", name),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let repo = InMemoryRunRepository::new();
        repo.insert(run("a"));

        let key = NamespacedName::new("ci", "a");
        let mut loaded = repo.get(&key).await.unwrap().unwrap();
        loaded.status.start_time = Some(chrono::Utc::now());
        loaded.metadata.labels.insert("ignored".into(), "yes".into());
        repo.update_status(&loaded).await.unwrap();

        let stored = repo.snapshot(&key).unwrap();
        assert_eq!(stored.status, loaded.status);
        assert!(stored.metadata.labels.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_missing_run() {
        let repo = InMemoryRunRepository::new();
        assert!(repo.get(&NamespacedName::new("ci", "nope")).await.unwrap().is_none());
        assert!(repo.update_status(&run("nope")).await.is_err());
    }
}
