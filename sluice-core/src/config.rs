//! Process-wide defaults
//!
//! Values applied when a run leaves a setting unspecified. They are passed
//! explicitly to the calls that need them rather than looked up ambiently.

use std::time::Duration;
use thiserror::Error;

/// Default overall timeout, in minutes
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 60;

/// Default service account used by task executions
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Defaults applied to runs that leave a setting unspecified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    /// Overall run timeout in minutes when a run sets none; 0 disables the deadline
    pub default_timeout_minutes: u64,

    /// Service account used when neither the run nor a task override names one
    pub default_service_account: String,
}

impl Defaults {
    /// Effective overall timeout for runs that set none
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_minutes.saturating_mul(60))
    }

    /// Loads defaults from environment variables
    ///
    /// - DEFAULT_TIMEOUT_MINUTES (optional, default: 60)
    /// - DEFAULT_SERVICE_ACCOUNT (optional, default: "default")
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_timeout_minutes = match std::env::var("DEFAULT_TIMEOUT_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "DEFAULT_TIMEOUT_MINUTES",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?,
            Err(_) => DEFAULT_TIMEOUT_MINUTES,
        };

        let default_service_account = std::env::var("DEFAULT_SERVICE_ACCOUNT")
            .unwrap_or_else(|_| DEFAULT_SERVICE_ACCOUNT.to_string());

        Ok(Self {
            default_timeout_minutes,
            default_service_account,
        })
    }

    /// Validates the defaults
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_service_account.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_service_account cannot be empty".to_string(),
            ));
        }

        if self.default_timeout_minutes > u64::MAX / 60 {
            return Err(ConfigError::Invalid(format!(
                "default_timeout_minutes {} is too large",
                self.default_timeout_minutes
            )));
        }

        Ok(())
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            default_service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
        }
    }
}
