//! Controller configuration
//!
//! Connection settings for the control-plane API plus the process-wide
//! defaults handed to every reconcile pass.

use anyhow::Context;
use sluice_client::ControlPlaneClient;
use sluice_core::config::Defaults;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server base URL (e.g., "https://cluster:6443")
    pub api_server_url: String,

    /// Bearer token for the API server
    pub api_token: Option<String>,

    /// Per-request timeout for API calls
    pub request_timeout: Duration,

    /// Defaults applied to runs that leave settings unset
    pub defaults: Defaults,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(api_server_url: String) -> Self {
        Self {
            api_server_url,
            api_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            defaults: Defaults::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - API_SERVER_URL (required)
    /// - API_TOKEN (optional)
    /// - API_REQUEST_TIMEOUT (optional, seconds, default: 30)
    /// - DEFAULT_TIMEOUT_MINUTES / DEFAULT_SERVICE_ACCOUNT (see [`Defaults::from_env`])
    pub fn from_env() -> anyhow::Result<Self> {
        let api_server_url = std::env::var("API_SERVER_URL")
            .map_err(|_| anyhow::anyhow!("API_SERVER_URL environment variable not set"))?;

        let api_token = std::env::var("API_TOKEN").ok().filter(|t| !t.is_empty());

        let request_timeout =
            parse_request_timeout(std::env::var("API_REQUEST_TIMEOUT").ok().as_deref())?;

        let defaults = Defaults::from_env().context("Failed to load run defaults")?;

        Ok(Self {
            api_server_url,
            api_token,
            request_timeout,
            defaults,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_server_url.is_empty() {
            anyhow::bail!("api_server_url cannot be empty");
        }

        if !self.api_server_url.starts_with("http://")
            && !self.api_server_url.starts_with("https://")
        {
            anyhow::bail!("api_server_url must start with http:// or https://");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        self.defaults.validate()?;

        Ok(())
    }

    /// Builds an API client honouring the request timeout and token
    pub fn client(&self) -> anyhow::Result<ControlPlaneClient> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let client = ControlPlaneClient::with_client(self.api_server_url.clone(), http);
        Ok(match &self.api_token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        })
    }
}

/// Parses API_REQUEST_TIMEOUT seconds; unset means 30s
fn parse_request_timeout(raw: Option<&str>) -> anyhow::Result<Duration> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_REQUEST_TIMEOUT);
    };
    let secs = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid API_REQUEST_TIMEOUT {:?}", raw))?;
    Ok(Duration::from_secs(secs))
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8001".to_string())
    }
}
