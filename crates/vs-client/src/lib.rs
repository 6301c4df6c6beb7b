//! VirtualServer Store Client
//!
//! Persists `VirtualServer` records and applies spec or status changes with
//! an optimistic-concurrency read-modify-write loop.
//!
//! # Example
//!
//! ```no_run
//! use virtual_server_client::{KubeVirtualServerStore, RetryConfig, update_with_retry};
//! use virtual_server_crds::SpecMutation;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KubeVirtualServerStore::new(kube::Client::try_default().await?);
//! let mutation = SpecMutation::SetCpuCount(4);
//!
//! update_with_retry(&store, "default", "my-vs", &RetryConfig::default(), |vs| {
//!     vs.spec = mutation.apply(&vs.spec)?;
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod retry;
pub mod store;

pub use client::KubeVirtualServerStore;
pub use error::ClientError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockVirtualServerStore;
pub use retry::{RetryConfig, update_status_with_retry, update_with_retry};
pub use store::VirtualServerStore;
