//! Failure taxonomy for generation tasks.
//!
//! [`UpstreamError`] is what the invocation layer puts on the queue.
//! [`TaskError`] is what the pipeline surfaces to the client after
//! classification (see [`crate::pipeline::classifier`]).

use serde::{Deserialize, Serialize};

/// User-facing message for rejected provider credentials.
pub const INVALID_API_KEY_MESSAGE: &str = "Incorrect API key provided";

/// User-facing message for an exhausted hosted-provider quota.
pub const QUOTA_EXCEEDED_MESSAGE: &str = "Your quota for Dify Hosted Model Provider has been exhausted. \
     Please go to Settings -> Model Provider to complete your own provider credentials.";

/// Fallback message when a failure carries no description.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error, please contact support.";

/// Sub-kind of a model invocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeErrorKind {
    /// Could not reach the provider.
    Connection,
    /// Provider is temporarily unavailable.
    ServerUnavailable,
    /// Provider rate limit hit.
    RateLimit,
    /// Provider rejected the request.
    BadRequest,
}

impl InvokeErrorKind {
    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::ServerUnavailable => "server_unavailable",
            Self::RateLimit => "rate_limit",
            Self::BadRequest => "bad_request",
        }
    }
}

/// A failure raised below the pipeline and carried by a queue error event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamError {
    /// Provider rejected the credentials.
    #[error("authorization failed: {message}")]
    Authorization {
        /// Provider-supplied text (never shown to users).
        message: String,
    },

    /// Model invocation failed.
    #[error("invoke error ({kind:?}): {description}")]
    Invocation {
        /// Failure sub-kind.
        kind: InvokeErrorKind,
        /// Human-readable description.
        description: String,
    },

    /// A parameter or value failed validation.
    #[error("{message}")]
    Validation {
        /// Validation message.
        message: String,
    },

    /// Hosted provider quota is exhausted.
    #[error("{message}")]
    QuotaExceeded {
        /// Original message (replaced by the fixed quota text for users).
        message: String,
    },

    /// Anything the invocation layer could not classify.
    #[error("{message}")]
    Other {
        /// Optional description attached to the failure.
        description: Option<String>,
        /// String form of the failure.
        message: String,
    },
}

/// A classified task failure, ready to surface in a stream response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Credentials rejected; always carries [`INVALID_API_KEY_MESSAGE`].
    #[error("{0}")]
    Authorization(String),

    /// Model invocation failed.
    #[error("{description}")]
    Invocation {
        /// Failure sub-kind.
        kind: InvokeErrorKind,
        /// Human-readable description.
        description: String,
    },

    /// Value validation failed.
    #[error("{0}")]
    Validation(String),

    /// Hosted provider quota is exhausted.
    #[error("{0}")]
    QuotaExceeded(String),

    /// Unclassified failure.
    #[error("{0}")]
    Generic(String),
}

impl TaskError {
    /// Machine-readable error code for the client.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_param",
            Self::QuotaExceeded(_) => "provider_quota_exceeded",
            Self::Authorization(_) | Self::Invocation { .. } => "completion_request_error",
            Self::Generic(_) => "internal_server_error",
        }
    }

    /// HTTP-style status for the client.
    pub fn status(&self) -> u16 {
        match self {
            Self::Generic(_) => 500,
            _ => 400,
        }
    }

    /// Message shown to the client in an error stream response.
    pub fn public_message(&self) -> String {
        match self {
            Self::QuotaExceeded(_) => QUOTA_EXCEEDED_MESSAGE.to_owned(),
            Self::Generic(_) => INTERNAL_ERROR_MESSAGE.to_owned(),
            other => {
                let text = other.to_string();
                if text.is_empty() {
                    INTERNAL_ERROR_MESSAGE.to_owned()
                } else {
                    text
                }
            }
        }
    }
}
