//! VirtualServer client errors

use thiserror::Error;
use virtual_server_crds::{SpecError, StatusError};

/// Errors that can occur when reading or writing VirtualServer records
#[derive(Debug, Error)]
pub enum ClientError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The record changed since it was read
    #[error("VirtualServer {namespace}/{name} was modified concurrently")]
    Conflict {
        /// Record namespace
        namespace: String,
        /// Record name
        name: String,
    },

    /// The record does not exist
    #[error("VirtualServer {namespace}/{name} not found")]
    NotFound {
        /// Record namespace
        namespace: String,
        /// Record name
        name: String,
    },

    /// A record with the same name already exists
    #[error("VirtualServer {namespace}/{name} already exists")]
    AlreadyExists {
        /// Record namespace
        namespace: String,
        /// Record name
        name: String,
    },

    /// The record is missing its name or namespace
    #[error("VirtualServer is missing metadata.{0}")]
    MissingMetadata(&'static str),

    /// The requested spec change was rejected
    #[error("Invalid spec change: {0}")]
    Spec(#[from] SpecError),

    /// The requested status change was rejected
    #[error("Invalid status change: {0}")]
    Status(#[from] StatusError),

    /// Still conflicting after the configured number of attempts
    #[error("Gave up after {attempts} conflicting updates")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
    },
}

impl ClientError {
    /// Whether the write lost an optimistic-concurrency race and may be retried
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    /// Whether the record does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}
