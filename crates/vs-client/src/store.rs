//! VirtualServerStore trait for mocking
//!
//! Abstracts persistence of VirtualServer records so the retry loop can be
//! exercised against an in-memory store. Writes carry the
//! `metadata.resourceVersion` they were based on; a stale version is
//! reported as [`ClientError::Conflict`].

use crate::error::ClientError;
use virtual_server_crds::VirtualServer;

/// Persistence operations on VirtualServer records
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait VirtualServerStore: Send + Sync {
    /// Create a new record. Fails if the name is taken.
    async fn create(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError>;

    /// Fetch a record, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, ClientError>;

    /// Replace the spec and metadata of an existing record
    async fn replace(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError>;

    /// Replace the status of an existing record
    async fn replace_status(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError>;
}

/// Namespace and name of a record
pub(crate) fn identity(vs: &VirtualServer) -> Result<(&str, &str), ClientError> {
    let namespace = vs
        .metadata
        .namespace
        .as_deref()
        .ok_or(ClientError::MissingMetadata("namespace"))?;
    let name = vs
        .metadata
        .name
        .as_deref()
        .ok_or(ClientError::MissingMetadata("name"))?;
    Ok((namespace, name))
}
