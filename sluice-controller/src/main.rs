//! Sluice Controller
//!
//! Runs one reconcile pass for each run named on the command line, against
//! the control-plane API configured through the environment. Ctrl-C cancels
//! any in-flight pass.

use anyhow::{Context, Result};
use clap::Parser;
use sluice_controller::repository::{ApiPipelineResolver, ApiRunRepository};
use sluice_controller::validation::KindRegistry;
use sluice_controller::{Config, ReconcileOutcome, Reconciler, ReferenceValidator, telemetry};
use sluice_core::clock::SystemClock;
use sluice_core::domain::NamespacedName;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sluice-controller")]
#[command(about = "Reconcile pipeline runs once", long_about = None)]
struct Cli {
    /// Runs to reconcile, as namespace/name
    #[arg(required = true)]
    runs: Vec<NamespacedName>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;
    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.validate().context("Invalid configuration")?;
    info!(api_server_url = %config.api_server_url, "Loaded configuration");

    let client = config.client()?;
    let reconciler = Reconciler::new(
        Arc::new(ApiRunRepository::new(client.clone())),
        Arc::new(ApiPipelineResolver::new(client.clone())),
        ReferenceValidator::new(KindRegistry::with_default_routes(&client)),
        config.defaults.clone(),
        Arc::new(SystemClock),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let mut failures = 0usize;
    for key in &cli.runs {
        match reconciler.reconcile(&cancel, key).await {
            Ok(ReconcileOutcome::Running { requeue_after, .. }) => {
                info!(run = %key, ?requeue_after, "Run is executing")
            }
            Ok(outcome) => info!(run = %key, ?outcome, "Run reconciled"),
            Err(e) => {
                failures += 1;
                error!(run = %key, retryable = e.is_retryable(), "Reconcile failed: {:#}", e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} runs failed to reconcile", failures, cli.runs.len());
    }
    Ok(())
}
