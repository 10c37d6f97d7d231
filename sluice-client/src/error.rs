//! Error types for the sluice client

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Machine-readable reason carried by an API failure
///
/// The API reports a reason string alongside the HTTP status code. When the
/// reason is missing or unrecognised it is derived from the code instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReason {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    AlreadyExists,
    Conflict,
    Gone,
    Invalid,
    MethodNotAllowed,
    NotAcceptable,
    UnsupportedMediaType,
    RequestEntityTooLarge,
    TooManyRequests,
    InternalError,
    ServiceUnavailable,
    Timeout,
    ServerTimeout,
    /// Neither the reason nor the code maps to a known category
    Unknown(String),
}

impl StatusReason {
    fn parse_known(reason: &str) -> Option<Self> {
        let known = match reason {
            "BadRequest" => Self::BadRequest,
            "Unauthorized" => Self::Unauthorized,
            "Forbidden" => Self::Forbidden,
            "NotFound" => Self::NotFound,
            "AlreadyExists" => Self::AlreadyExists,
            "Conflict" => Self::Conflict,
            "Gone" => Self::Gone,
            "Invalid" => Self::Invalid,
            "MethodNotAllowed" => Self::MethodNotAllowed,
            "NotAcceptable" => Self::NotAcceptable,
            "UnsupportedMediaType" => Self::UnsupportedMediaType,
            "RequestEntityTooLarge" => Self::RequestEntityTooLarge,
            "TooManyRequests" => Self::TooManyRequests,
            "InternalError" => Self::InternalError,
            "ServiceUnavailable" => Self::ServiceUnavailable,
            "Timeout" => Self::Timeout,
            "ServerTimeout" => Self::ServerTimeout,
            _ => return None,
        };
        Some(known)
    }

    fn from_code(code: u16) -> Option<Self> {
        let derived = match code {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            406 => Self::NotAcceptable,
            409 => Self::Conflict,
            410 => Self::Gone,
            413 => Self::RequestEntityTooLarge,
            415 => Self::UnsupportedMediaType,
            422 => Self::Invalid,
            429 => Self::TooManyRequests,
            500 => Self::InternalError,
            503 => Self::ServiceUnavailable,
            504 => Self::Timeout,
            _ => return None,
        };
        Some(derived)
    }

    /// Resolves the reason of a failed response
    ///
    /// A recognised reason string wins over the status code.
    pub fn from_status(code: u16, reason: Option<&str>) -> Self {
        reason
            .and_then(Self::parse_known)
            .or_else(|| Self::from_code(code))
            .unwrap_or_else(|| Self::Unknown(reason.unwrap_or_default().to_string()))
    }
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(raw) if raw.is_empty() => f.write_str("Unknown"),
            Self::Unknown(raw) => f.write_str(raw),
            known => write!(f, "{:?}", known),
        }
    }
}

/// Status body returned by the API on failure
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Errors that can occur when using the sluice client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}, reason {reason}): {message}")]
    Api {
        status: u16,
        reason: StatusReason,
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Builds an API error, resolving the reason from the code when needed
    pub fn api_error(status: u16, reason: Option<&str>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            reason: StatusReason::from_status(status, reason),
            message: message.into(),
        }
    }

    /// The API failure reason, if the server answered
    pub fn reason(&self) -> Option<&StatusReason> {
        match self {
            Self::Api { reason, .. } => Some(reason),
            _ => None,
        }
    }

    fn has_reason(&self, expected: &StatusReason) -> bool {
        self.reason() == Some(expected)
    }

    pub fn is_bad_request(&self) -> bool {
        self.has_reason(&StatusReason::BadRequest)
    }

    /// The object failed schema validation
    pub fn is_invalid(&self) -> bool {
        self.has_reason(&StatusReason::Invalid)
    }

    pub fn is_method_not_supported(&self) -> bool {
        self.has_reason(&StatusReason::MethodNotAllowed)
    }

    /// The request timed out, either at the API gateway or in transit
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::RequestFailed(e) => e.is_timeout(),
            _ => self.has_reason(&StatusReason::Timeout),
        }
    }

    /// The server could not finish the request in time and asks for a retry
    pub fn is_server_timeout(&self) -> bool {
        self.has_reason(&StatusReason::ServerTimeout)
    }

    pub fn is_too_many_requests(&self) -> bool {
        self.has_reason(&StatusReason::TooManyRequests)
    }

    pub fn is_not_found(&self) -> bool {
        self.has_reason(&StatusReason::NotFound)
    }

    /// The failure may clear up by itself: transport trouble, timeouts,
    /// throttling, or any 5xx from the server
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(e) => !e.is_decode() && !e.is_builder(),
            Self::Api { .. } => {
                self.is_timeout()
                    || self.is_server_timeout()
                    || self.is_too_many_requests()
                    || self.is_server_error()
            }
            Self::ParseError(_) => false,
        }
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if (400..500).contains(status))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}
