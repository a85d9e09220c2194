//! Error types for reclaim
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the cluster, cloud service or object it relates to.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for reclaim operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A referenced Kubernetes object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object (e.g., "Cluster", "AWSCluster")
        kind: String,
        /// Name of the missing object
        name: String,
        /// Namespace that was searched
        namespace: String,
    },

    /// Invalid object content, such as a non-boolean GC annotation
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster whose object is invalid
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "metadata.annotations")
        field: Option<String>,
    },

    /// Malformed ARN returned by a cloud API
    #[error("invalid ARN {input:?}: {message}")]
    Arn {
        /// The string that failed to parse
        input: String,
        /// Why it failed
        message: String,
    },

    /// Cloud API call failure
    #[error("cloud error [{service}] for {cluster}: {message}")]
    Cloud {
        /// Name of the cluster being cleaned up
        cluster: String,
        /// Cloud service namespace (e.g., "elasticloadbalancing", "ec2")
        service: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being (de)serialized, if known
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "create_client", "controller")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for a Kubernetes object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without cluster context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an ARN parse error
    pub fn arn(input: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Arn {
            input: input.into(),
            message: msg.into(),
        }
    }

    /// Create a retryable cloud error with full context
    pub fn cloud_for(
        cluster: impl Into<String>,
        service: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Cloud {
            cluster: cluster.into(),
            service: service.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable cloud error (e.g., access denied)
    pub fn cloud_permanent(
        cluster: impl Into<String>,
        service: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Cloud {
            cluster: cluster.into(),
            service: service.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, ARN and serialization errors need a fix to the object or
    /// the cloud data and are not retryable. Kubernetes 4xx errors are not
    /// retryable, except 409 conflicts from optimistic concurrency.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
            ),
            Error::NotFound { .. } => false,
            Error::Validation { .. } => false,
            Error::Arn { .. } => false,
            Error::Cloud { retryable, .. } => *retryable,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Check if this is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Validation { cluster, .. } => Some(cluster),
            Error::Cloud { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}
