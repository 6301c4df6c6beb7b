//! Read-modify-write with optimistic concurrency
//!
//! Each attempt fetches a fresh copy, applies the caller's change and writes
//! it back carrying the fetched `resourceVersion`. A conflict means another
//! writer got there first: wait with exponential backoff and jitter, then
//! start over from a new read. Any other failure, including a rejected
//! change, is returned immediately.

use crate::error::ClientError;
use crate::store::VirtualServerStore;
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};
use virtual_server_crds::VirtualServer;

/// Backoff settings for conflicting updates
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, at least 1
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub initial_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Next delay, capped at `max_delay`
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Which part of the record a write replaces
#[derive(Debug, Clone, Copy)]
enum Target {
    Spec,
    Status,
}

/// Apply `mutate` to the latest copy of a record and replace its spec and
/// metadata, retrying on conflicts.
pub async fn update_with_retry<S, F>(
    store: &S,
    namespace: &str,
    name: &str,
    config: &RetryConfig,
    mutate: F,
) -> Result<VirtualServer, ClientError>
where
    S: VirtualServerStore + ?Sized,
    F: FnMut(&mut VirtualServer) -> Result<(), ClientError> + Send,
{
    retry_write(store, namespace, name, config, Target::Spec, mutate).await
}

/// Apply `mutate` to the latest copy of a record and replace its status,
/// retrying on conflicts.
pub async fn update_status_with_retry<S, F>(
    store: &S,
    namespace: &str,
    name: &str,
    config: &RetryConfig,
    mutate: F,
) -> Result<VirtualServer, ClientError>
where
    S: VirtualServerStore + ?Sized,
    F: FnMut(&mut VirtualServer) -> Result<(), ClientError> + Send,
{
    retry_write(store, namespace, name, config, Target::Status, mutate).await
}

async fn retry_write<S, F>(
    store: &S,
    namespace: &str,
    name: &str,
    config: &RetryConfig,
    target: Target,
    mut mutate: F,
) -> Result<VirtualServer, ClientError>
where
    S: VirtualServerStore + ?Sized,
    F: FnMut(&mut VirtualServer) -> Result<(), ClientError> + Send,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let mut vs = store
            .get(namespace, name)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        mutate(&mut vs)?;

        let written = match target {
            Target::Spec => store.replace(&vs).await,
            Target::Status => store.replace_status(&vs).await,
        };

        match written {
            Ok(updated) => {
                if attempt > 1 {
                    info!(namespace, name, attempt, "VirtualServer updated after conflicts");
                }
                return Ok(updated);
            }
            Err(e) if e.is_conflict() => {
                if attempt >= max_attempts {
                    warn!(
                        namespace,
                        name,
                        attempt,
                        "Giving up on conflicting VirtualServer update"
                    );
                    return Err(ClientError::RetriesExhausted { attempts: attempt });
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    namespace,
                    name,
                    attempt,
                    delay_ms = jittered_delay.as_millis(),
                    "VirtualServer update conflicted, retrying"
                );

                tokio::time::sleep(jittered_delay).await;
                delay = config.next_delay(delay);
            }
            Err(e) => return Err(e),
        }
    }
}
