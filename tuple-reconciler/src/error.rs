use std::fmt;
use thiserror::Error;

/// Which collaborator a failed read came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorSource {
    Legacy,
    Remote,
}

impl fmt::Display for CollectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorSource::Legacy => write!(f, "legacy"),
            CollectorSource::Remote => write!(f, "remote"),
        }
    }
}

/// Flush phase of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Delete,
    Write,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePhase::Delete => write!(f, "delete"),
            WritePhase::Write => write!(f, "write"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        resource: Option<String>,
        namespace: String,
        reason: String,
    },

    #[error("Failed to collect {collector} tuples for {resource}: {cause}")]
    CollectionFailed {
        collector: CollectorSource,
        resource: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Failed to {phase} tuples for {resource} (batch {batch}): {cause}")]
    WriteFailed {
        resource: String,
        phase: WritePhase,
        batch: usize,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Invalid batch size: {size}")]
    InvalidBatchSize { resource: Option<String>, size: usize },

    #[error("Reconciliation of {resource} cancelled before {phase} phase completed")]
    Cancelled { resource: String, phase: WritePhase },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    pub(crate) fn invalid_namespace(namespace: &str, reason: impl Into<String>) -> Self {
        Self::InvalidNamespace {
            resource: None,
            namespace: namespace.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_batch_size(size: usize) -> Self {
        Self::InvalidBatchSize { resource: None, size }
    }

    /// Attribute a validation error raised outside a reconciler to `resource`
    #[must_use]
    pub fn for_resource(self, name: &str) -> Self {
        match self {
            Self::InvalidNamespace {
                namespace, reason, ..
            } => Self::InvalidNamespace {
                resource: Some(name.to_string()),
                namespace,
                reason,
            },
            Self::InvalidBatchSize { size, .. } => Self::InvalidBatchSize {
                resource: Some(name.to_string()),
                size,
            },
            other => other,
        }
    }

    /// Resource type the error is attributed to, when it has one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::CollectionFailed { resource, .. }
            | Self::WriteFailed { resource, .. }
            | Self::Cancelled { resource, .. } => Some(resource),
            Self::InvalidNamespace { resource, .. } | Self::InvalidBatchSize { resource, .. } => {
                resource.as_deref()
            }
            Self::Config(_) => None,
        }
    }
}

impl From<config::ConfigError> for ReconcileError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
