//! Pipeline-run endpoints

use crate::error::Result;
use crate::{ApiResource, ControlPlaneClient};
use sluice_core::domain::{NamespacedName, PipelineRun};

impl ControlPlaneClient {
    // =============================================================================
    // Pipeline Runs
    // =============================================================================

    /// Get a pipeline run by identity
    pub async fn get_pipeline_run(&self, key: &NamespacedName) -> Result<PipelineRun> {
        self.get(&ApiResource::pipeline_runs(), &key.namespace, &key.name)
            .await
    }

    /// Write back the status of a pipeline run
    ///
    /// The whole object is sent; the server only applies its `status`.
    pub async fn update_pipeline_run_status(&self, run: &PipelineRun) -> Result<PipelineRun> {
        self.replace_status(
            &ApiResource::pipeline_runs(),
            &run.metadata.namespace,
            &run.metadata.name,
            run,
        )
        .await
    }
}
