//! Kubernetes-backed VirtualServerStore

use crate::error::ClientError;
use crate::store::{VirtualServerStore, identity};
use kube::Client;
use kube::api::{Api, Patch, PatchParams, PostParams};
use tracing::debug;
use virtual_server_crds::VirtualServer;

/// Stores VirtualServer records as custom resources
#[derive(Clone)]
pub struct KubeVirtualServerStore {
    client: Client,
}

impl std::fmt::Debug for KubeVirtualServerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeVirtualServerStore").finish_non_exhaustive()
    }
}

impl KubeVirtualServerStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VirtualServer> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map API status codes onto the store's error cases
fn map_api_error(err: kube::Error, namespace: &str, name: &str) -> ClientError {
    let (namespace, name) = (namespace.to_string(), name.to_string());
    match err {
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            ClientError::AlreadyExists { namespace, name }
        }
        kube::Error::Api(ae) if ae.code == 409 => ClientError::Conflict { namespace, name },
        kube::Error::Api(ae) if ae.code == 404 => ClientError::NotFound { namespace, name },
        other => ClientError::Kube(other),
    }
}

/// Merge patch replacing the status of `vs`.
///
/// Carrying `resourceVersion` makes the API server reject stale writes.
fn status_patch(vs: &VirtualServer) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "resourceVersion": vs.metadata.resource_version },
        "status": vs.status,
    })
}

#[async_trait::async_trait]
impl VirtualServerStore for KubeVirtualServerStore {
    async fn create(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError> {
        let (namespace, name) = identity(vs)?;
        debug!(namespace, name, "Creating VirtualServer");
        self.api(namespace)
            .create(&PostParams::default(), vs)
            .await
            .map_err(|e| map_api_error(e, namespace, name))
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<VirtualServer>, ClientError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn replace(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError> {
        let (namespace, name) = identity(vs)?;
        self.api(namespace)
            .replace(name, &PostParams::default(), vs)
            .await
            .map_err(|e| map_api_error(e, namespace, name))
    }

    async fn replace_status(&self, vs: &VirtualServer) -> Result<VirtualServer, ClientError> {
        let (namespace, name) = identity(vs)?;
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch(vs)))
            .await
            .map_err(|e| map_api_error(e, namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_patch_carries_resource_version() {
        let mut vs = VirtualServer::namespaced("vs-a", "default");
        vs.metadata.resource_version = Some("42".to_string());
        vs.initialize_status(false);
        vs.spec.set_cpu_count(8).unwrap();

        let patch = status_patch(&vs);
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["conditions"][0]["type"], "Ready");
        assert!(patch.get("spec").is_none());
    }
}
