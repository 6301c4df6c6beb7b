//! Mock VirtualServerStore for unit testing
//!
//! Keeps records in memory and enforces `resourceVersion` checks the same
//! way the API server does. Conflicts can also be injected to simulate a
//! concurrent writer.

use crate::error::ClientError;
use crate::store::{VirtualServerStore, identity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use virtual_server_crds::VirtualServer;

type Key = (String, String);

#[derive(Debug, Default)]
struct State {
    records: HashMap<Key, VirtualServer>,
    next_version: u64,
    pending_conflicts: u32,
    writes: u32,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory VirtualServerStore
#[derive(Debug, Clone, Default)]
pub struct MockVirtualServerStore {
    state: Arc<Mutex<State>>,
}

impl MockVirtualServerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` writes with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.state().pending_conflicts = count;
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> u32 {
        self.state().writes
    }

    /// Simulate another writer bumping the stored version of a record
    pub fn touch(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let version = state.bump();
        if let Some(vs) = state
            .records
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            vs.metadata.resource_version = Some(version);
        }
    }

    /// Check that `vs` is based on the stored version and return the stored copy
    fn checked_write<'a>(
        state: &'a mut State,
        vs: &VirtualServer,
    ) -> Result<&'a mut VirtualServer, ClientError> {
        let (namespace, name) = identity(vs)?;
        let conflict = || ClientError::Conflict {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(conflict());
        }

        let key = (namespace.to_string(), name.to_string());
        let stored = state.records.get_mut(&key).ok_or(ClientError::NotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;
        if vs.metadata.resource_version.is_some()
            && vs.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(conflict());
        }
        Ok(stored)
    }
}

#[async_trait::async_trait]
impl VirtualServerStore for MockVirtualServerStore {
    async fn create(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError> {
        let (namespace, name) = identity(vs)?;
        let key = (namespace.to_string(), name.to_string());

        let mut state = self.state();
        if state.records.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                namespace: key.0,
                name: key.1,
            });
        }

        let mut created = vs.clone();
        created.metadata.resource_version = Some(state.bump());
        state.records.insert(key, created.clone());
        state.writes += 1;
        Ok(created)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, ClientError> {
        Ok(self
            .state()
            .records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError> {
        let mut state = self.state();
        let version = state.next_version + 1;
        let stored = Self::checked_write(&mut state, vs)?;

        // status is only written through the status subresource
        stored.spec = vs.spec.clone();
        stored.metadata = vs.metadata.clone();
        stored.metadata.resource_version = Some(version.to_string());
        let updated = stored.clone();

        state.next_version = version;
        state.writes += 1;
        Ok(updated)
    }

    async fn replace_status(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError> {
        let mut state = self.state();
        let version = state.next_version + 1;
        let stored = Self::checked_write(&mut state, vs)?;

        stored.status = vs.status.clone();
        stored.metadata.resource_version = Some(version.to_string());
        let updated = stored.clone();

        state.next_version = version;
        state.writes += 1;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtual_server_crds::ConditionStatus;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MockVirtualServerStore::new();
        let vs = VirtualServer::namespaced("vs-a", "default");

        let created = store.create(&vs).await.unwrap();
        assert!(created.metadata.resource_version.is_some());
        assert!(matches!(
            store.create(&vs).await,
            Err(ClientError::AlreadyExists { .. })
        ));

        let fetched = store.get("default", "vs-a").await.unwrap();
        assert_eq!(fetched, Some(created));
        assert!(store.get("default", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let store = MockVirtualServerStore::new();
        let created = store
            .create(&VirtualServer::namespaced("vs-a", "default"))
            .await
            .unwrap();

        let mut first = created.clone();
        first.spec.set_region("ORD1");
        store.replace(&first).await.unwrap();

        let mut stale = created;
        stale.spec.set_region("LAS1");
        let err = store.replace(&stale).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get("default", "vs-a").await.unwrap().unwrap();
        assert_eq!(stored.spec.region.as_deref(), Some("ORD1"));
    }

    #[tokio::test]
    async fn test_replace_keeps_status() {
        let store = MockVirtualServerStore::new();
        let mut vs = store
            .create(&VirtualServer::namespaced("vs-a", "default"))
            .await
            .unwrap();

        vs.initialize_status(false);
        let vs = store.replace_status(&vs).await.unwrap();

        let mut without_status = vs.clone();
        without_status.status = None;
        let replaced = store.replace(&without_status).await.unwrap();
        assert_eq!(
            replaced.ready_status().map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );
    }

    #[tokio::test]
    async fn test_injected_conflicts() {
        let store = MockVirtualServerStore::new();
        let vs = store
            .create(&VirtualServer::namespaced("vs-a", "default"))
            .await
            .unwrap();

        store.inject_conflicts(1);
        assert!(store.replace(&vs).await.unwrap_err().is_conflict());
        store.replace(&vs).await.unwrap();
        assert_eq!(store.writes(), 2);
    }
}
