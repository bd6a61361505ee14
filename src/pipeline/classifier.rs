//! Error classification and description.

use crate::errors::{
    TaskError, UpstreamError, INTERNAL_ERROR_MESSAGE, INVALID_API_KEY_MESSAGE,
    QUOTA_EXCEEDED_MESSAGE,
};

/// Classify an upstream failure into the error surfaced to the client.
///
/// Authorization failures are rewritten to [`INVALID_API_KEY_MESSAGE`];
/// invocation, validation and quota failures pass through; anything else
/// becomes [`TaskError::Generic`] carrying its description, or its message
/// when it has none.
pub fn classify(error: &UpstreamError) -> TaskError {
    match error {
        UpstreamError::Authorization { .. } => {
            TaskError::Authorization(INVALID_API_KEY_MESSAGE.to_owned())
        }
        UpstreamError::Invocation { kind, description } => TaskError::Invocation {
            kind: *kind,
            description: description.clone(),
        },
        UpstreamError::Validation { message } => TaskError::Validation(message.clone()),
        UpstreamError::QuotaExceeded { message } => TaskError::QuotaExceeded(message.clone()),
        UpstreamError::Other {
            description,
            message,
        } => TaskError::Generic(description.clone().unwrap_or_else(|| message.clone())),
    }
}

/// Human-readable description stored on a failed message.
pub fn error_to_desc(error: &TaskError) -> String {
    let text = match error {
        TaskError::QuotaExceeded(_) => return QUOTA_EXCEEDED_MESSAGE.to_owned(),
        TaskError::Invocation { description, .. } => description.as_str(),
        TaskError::Authorization(message)
        | TaskError::Validation(message)
        | TaskError::Generic(message) => message.as_str(),
    };

    if text.is_empty() {
        INTERNAL_ERROR_MESSAGE.to_owned()
    } else {
        text.to_owned()
    }
}
