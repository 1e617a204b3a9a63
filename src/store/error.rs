//! Error types for snapshot store operations

use thiserror::Error;

/// Result type alias for snapshot store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Provider error code returned when the copy target name is taken
pub const SNAPSHOT_ALREADY_EXISTS: &str = "DBSnapshotAlreadyExists";

/// Provider error code returned when the cross-region copy limit is reached
pub const SNAPSHOT_QUOTA_EXCEEDED: &str = "SnapshotQuotaExceeded";

/// Errors that can occur while talking to the snapshot store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Provider rejected the request with a specific error code
    #[error("Provider error ({code}): {message}")]
    Service { code: String, message: String },

    /// Snapshot or resource not found
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Provider answered but the response was missing required fields
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    /// SDK error that fits no other category
    #[error("SDK error: {0}")]
    Sdk(String),
}

impl StoreError {
    /// Create a service error from a provider error code
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Provider error code, when the provider sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Check if error is retryable
    ///
    /// The controller never retries within a pass; this only tells the
    /// caller whether the next invocation is likely to do better.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Timeout(_) => true,
            StoreError::Service { code, .. } => is_retryable_code(code),
            StoreError::Sdk(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("connection reset")
                    || lower.contains("connection refused")
                    || lower.contains("timed out")
            }
            _ => false,
        }
    }
}

/// Check if a provider error code is retryable
pub(crate) fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "Throttling"
            | "ThrottlingException"
            | "RequestLimitExceeded"
            | "ServiceUnavailable"
            | "InternalFailure"
    )
}

/// Convert AWS SDK errors to StoreError
///
/// RDS and EC2 share the same smithy error type, so one conversion covers
/// both clients.
#[cfg(feature = "rds")]
impl<E, R> From<aws_sdk_rds::error::SdkError<E, R>> for StoreError
where
    E: aws_sdk_rds::error::ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(error: aws_sdk_rds::error::SdkError<E, R>) -> Self {
        use aws_sdk_rds::error::SdkError;

        match error {
            SdkError::DispatchFailure(e) => {
                StoreError::Network(format!("Network dispatch failure: {:?}", e))
            }
            SdkError::TimeoutError(_) => StoreError::Timeout("request timed out".to_string()),
            SdkError::ResponseError(e) => {
                StoreError::InvalidResponse(format!("Response error: {:?}", e))
            }
            SdkError::ServiceError(e) => {
                let err = e.err();
                StoreError::Service {
                    code: err.code().unwrap_or("Unknown").to_string(),
                    message: err.message().unwrap_or_default().to_string(),
                }
            }
            other => StoreError::Sdk(format!("{:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_only_for_service_errors() {
        let err = StoreError::service(SNAPSHOT_ALREADY_EXISTS, "exists");
        assert_eq!(err.code(), Some(SNAPSHOT_ALREADY_EXISTS));
        assert_eq!(StoreError::Network("down".to_string()).code(), None);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Network("connection lost".to_string()).is_retryable());
        assert!(StoreError::Timeout("timed out".to_string()).is_retryable());
        assert!(StoreError::service("Throttling", "slow down").is_retryable());
        assert!(!StoreError::service(SNAPSHOT_QUOTA_EXCEEDED, "limit").is_retryable());
        assert!(!StoreError::NotFound("rds:db-1".to_string()).is_retryable());
    }

    #[test]
    fn test_sdk_network_errors_retryable() {
        assert!(StoreError::Sdk("connection reset by peer".to_string()).is_retryable());
        assert!(StoreError::Sdk("Connection refused".to_string()).is_retryable());
        assert!(!StoreError::Sdk("invalid argument".to_string()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = StoreError::service("InvalidParameterValue", "bad identifier");
        assert_eq!(
            err.to_string(),
            "Provider error (InvalidParameterValue): bad identifier"
        );
    }
}
