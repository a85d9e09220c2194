//! AWS error classification
//!
//! Typed errors for AWS SDK operations, keyed on the error code from
//! `ProvideErrorMetadata` rather than on message text.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// AWS error categories for cleanup and retry decisions
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AwsError {
    /// Resource is already gone (safe to treat a delete as done)
    #[error("resource not found ({code}): {message}")]
    NotFound {
        /// AWS error code
        code: String,
        /// Error message from AWS
        message: String,
    },

    /// Rate limit exceeded
    #[error("rate limit exceeded: {message}")]
    Throttled {
        /// Error message from AWS
        message: String,
    },

    /// Resource has dependent objects, e.g. a security group still attached to an ENI
    #[error("resource has dependent objects: {message}")]
    DependencyViolation {
        /// Error message from AWS
        message: String,
    },

    /// Resource is still referenced, e.g. a target group behind a listener
    #[error("resource in use: {message}")]
    ResourceInUse {
        /// Error message from AWS
        message: String,
    },

    /// Credentials lack permission for the call
    #[error("access denied: {message}")]
    AccessDenied {
        /// Error message from AWS
        message: String,
    },

    /// Any other SDK error
    #[error("AWS error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Sdk {
        /// AWS error code, when the SDK exposes one
        code: Option<String>,
        /// Error message, or the SDK error context
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Whether retrying the same call later can succeed
    ///
    /// Dependency and in-use errors clear once the blocking resource is
    /// deleted, typically by an earlier step of the next pass.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AwsError::AccessDenied { .. })
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "LoadBalancerNotFound",
    "TargetGroupNotFound",
    "InvalidGroup.NotFound",
    "InvalidGroupId.NotFound",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
];

/// Known AWS error codes for dependency violations
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation"];

/// Known AWS error codes for resources still in use
const IN_USE_CODES: &[&str] = &["ResourceInUse", "InvalidGroup.InUse"];

/// Known AWS error codes for authorization failures
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
];

/// Classify an AWS error from its code and message
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            code: c.to_string(),
            message,
        },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled { message },
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation { message },
        Some(c) if IN_USE_CODES.contains(&c) => AwsError::ResourceInUse { message },
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied { message },
        _ => AwsError::Sdk {
            code: code.map(str::to_string),
            message,
        },
    }
}

/// Classify an SDK error from any AWS service client
///
/// Errors without service metadata (timeouts, dispatch failures) keep the
/// full error chain as their message.
pub fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.code() {
        Some(code) => classify_aws_error(Some(code), err.message()),
        None => AwsError::Sdk {
            code: None,
            message: DisplayErrorContext(err).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes_are_classified() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("gone"));
            assert!(err.is_not_found(), "code {code}");
            assert!(err.to_string().contains(code));
        }
    }

    #[test]
    fn throttling_codes_are_retryable() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), None);
            assert!(matches!(err, AwsError::Throttled { .. }), "code {code}");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn dependency_and_in_use_codes_are_retryable() {
        let err = classify_aws_error(Some("DependencyViolation"), Some("sg attached"));
        assert_eq!(
            err,
            AwsError::DependencyViolation {
                message: "sg attached".to_string()
            }
        );
        assert!(err.is_retryable());

        for code in IN_USE_CODES {
            let err = classify_aws_error(Some(code), None);
            assert!(matches!(err, AwsError::ResourceInUse { .. }), "code {code}");
        }
    }

    #[test]
    fn access_denied_is_permanent() {
        for code in ACCESS_DENIED_CODES {
            assert!(!classify_aws_error(Some(code), None).is_retryable(), "code {code}");
        }
    }

    #[test]
    fn unknown_codes_keep_code_and_message() {
        let err = classify_aws_error(Some("InternalFailure"), Some("oops"));
        assert_eq!(
            err,
            AwsError::Sdk {
                code: Some("InternalFailure".to_string()),
                message: "oops".to_string()
            }
        );
        assert_eq!(err.to_string(), "AWS error [InternalFailure]: oops");

        let err = classify_aws_error(None, None);
        assert_eq!(err.to_string(), "AWS error: unknown error");
    }
}
