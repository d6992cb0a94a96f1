//! Error types for the endpoint resolution pipeline.

use std::time::Duration;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a single pipeline run.
///
/// HTTP failures from the commerce API are not errors: they are reported in a
/// [`ResultEnvelope`](crate::ResultEnvelope).
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing credentials, base URL or other required settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// The specification could not be fetched or parsed
    #[error("Failed to load OpenAPI spec from '{origin}': {reason}")]
    SpecLoad { origin: String, reason: String },

    /// The specification parsed but is unusable
    #[error("Invalid OpenAPI spec: {0}")]
    InvalidSpec(String),

    /// The intent classifier produced nothing usable
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// The retrieval capability failed or returned nothing
    #[error("Retrieval failed for corpus '{corpus}': {reason}")]
    Retrieval { corpus: String, reason: String },

    /// Token exchange failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A `{placeholder}` survived substitution
    #[error("Unresolved placeholder '{{{0}}}' in path '{1}'")]
    UnresolvedPlaceholder(String, String),

    /// The session's cancellation token fired
    #[error("Operation cancelled during {0}")]
    Cancelled(&'static str),

    /// A suspension point exceeded its deadline
    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    /// The HTTP client failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the intent classification step.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("No answer from classifier")]
    NoAnswer,

    #[error("Malformed classifier output, expected {expected}: {reason}")]
    Malformed {
        expected: &'static str,
        reason: String,
    },

    /// The classifier chose an operation the specification does not define
    #[error("Classifier selected unknown operation {method} {path}")]
    UnknownOperation { method: String, path: String },

    /// The underlying model call failed
    #[error("Classifier backend error: {0}")]
    Backend(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn spec_load(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::SpecLoad {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<cx_core::Error> for PipelineError {
    fn from(err: cx_core::Error) -> Self {
        match err {
            cx_core::Error::Config(msg) => Self::Config(msg),
            cx_core::Error::Auth(msg) => Self::Auth(msg),
            cx_core::Error::LLMError(msg) => Self::Classifier(ClassifierError::Backend(msg)),
            cx_core::Error::SerializationError(e) => Self::Json(e),
            cx_core::Error::IoError(e) => Self::Io(e),
            other => Self::Classifier(ClassifierError::Backend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::UnresolvedPlaceholder(
            "cartId".to_string(),
            "/v2/carts/{cartId}/items".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "Unresolved placeholder '{cartId}' in path '/v2/carts/{cartId}/items'"
        );

        let err: PipelineError = ClassifierError::NoAnswer.into();
        assert_eq!(err.to_string(), "No answer from classifier");

        let err = PipelineError::Timeout {
            stage: "token exchange",
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "token exchange timed out after 30s");
    }

    #[test]
    fn test_core_error_conversion() {
        let err: PipelineError = cx_core::Error::config_error("EP_BASE_URL is not set").into();
        assert!(err.is_config());

        let err: PipelineError = cx_core::Error::LLMError("429".to_string()).into();
        assert!(matches!(
            err,
            PipelineError::Classifier(ClassifierError::Backend(_))
        ));
    }
}
