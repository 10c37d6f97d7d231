//! Reference validation
//!
//! Before a run is admitted, definitions fetched from outside the cluster are
//! checked by asking the API server to create them in dry-run mode. The
//! server runs its admission webhooks and defaulting, stores nothing, and
//! either returns the defaulted object or an error that is classified here
//! for the caller's retry policy.

mod registry;

pub use registry::{ApiDryRunCreate, DryRunCreate, KindRegistry};

use sluice_client::ClientError;
use sluice_core::domain::{DynamicObject, GroupVersionKind};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome classes of a failed dry-run validation
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The object itself was rejected as malformed
    #[error("referenced object validation failed: {0}")]
    ReferencedObjectValidationFailed(#[source] ClientError),

    /// Validation cannot succeed for structural reasons; do not retry
    #[error("couldn't validate referenced object: {0}")]
    CouldntValidateObjectPermanent(#[source] ClientError),

    /// Transient failure; retry with backoff
    #[error("couldn't validate referenced object, will retry: {0}")]
    CouldntValidateObjectRetryable(#[source] ClientError),

    #[error("dry-run validation of {0} was cancelled")]
    Cancelled(GroupVersionKind),

    #[error("no dry-run route registered for {0}")]
    UnsupportedKind(GroupVersionKind),

    /// Any failure outside the known classes, passed through unchanged
    #[error(transparent)]
    Other(ClientError),
}

impl ValidationError {
    /// Maps a client failure onto the validation outcome classes
    pub fn classify(err: ClientError) -> Self {
        if err.is_bad_request() {
            Self::ReferencedObjectValidationFailed(err)
        } else if err.is_invalid() || err.is_method_not_supported() {
            Self::CouldntValidateObjectPermanent(err)
        } else if err.is_timeout() || err.is_server_timeout() || err.is_too_many_requests() {
            Self::CouldntValidateObjectRetryable(err)
        } else {
            Self::Other(err)
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CouldntValidateObjectRetryable(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::CouldntValidateObjectPermanent(_))
    }

    pub fn is_validation_failed(&self) -> bool {
        matches!(self, Self::ReferencedObjectValidationFailed(_))
    }
}

/// Dry-run validator for referenced definitions
#[derive(Debug, Clone)]
pub struct ReferenceValidator {
    registry: KindRegistry,
}

impl ReferenceValidator {
    pub fn new(registry: KindRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Dry-run creates `object` in `namespace`
    ///
    /// The object is sent under a fresh unique name so it can never collide
    /// with a stored object. On success the server-defaulted object is
    /// returned with the caller's name and namespace restored.
    pub async fn dry_run_validate(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ValidationError> {
        let gvk = object.gvk();
        let route = self
            .registry
            .get(&gvk)
            .ok_or_else(|| ValidationError::UnsupportedKind(gvk.clone()))?;

        let mut candidate = object.clone();
        candidate.metadata.name = Uuid::new_v4().to_string();
        candidate.metadata.namespace = namespace.to_string();
        candidate.metadata.resource_version = None;
        candidate.metadata.uid = None;
        candidate.metadata.extra.clear();

        debug!(kind = %gvk, namespace, name = %object.metadata.name, "Dry-run validating referenced object");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ValidationError::Cancelled(gvk)),
            result = route.dry_run_create(namespace, &candidate) => result,
        };

        match result {
            Ok(mut admitted) => {
                admitted.metadata.name = object.metadata.name.clone();
                admitted.metadata.namespace = object.metadata.namespace.clone();
                Ok(admitted)
            }
            Err(err) => {
                let classified = ValidationError::classify(err);
                warn!(kind = %gvk, namespace, error = %classified, "Dry-run validation failed");
                Err(classified)
            }
        }
    }
}
