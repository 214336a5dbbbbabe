use super::{USER_AGENT, client};
use crate::error::Result as KsResult;
use kube::Client;
use tokio::sync::RwLock;
use tracing::debug;

/// Owns the Kubernetes client for the exporter: created lazily on first use,
/// reused across poll cycles and watch reconnects, and dropped after
/// authentication failures so the next attempt rebuilds it with fresh credentials.
pub struct K8sClientManager {
    kube_addr: Option<String>,
    client: RwLock<Option<Client>>,
}

impl K8sClientManager {
    #[must_use]
    pub const fn new(kube_addr: Option<String>) -> Self {
        Self {
            kube_addr,
            client: RwLock::const_new(None),
        }
    }

    /// Use an already built client; it is still discarded by `invalidate`.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            kube_addr: None,
            client: RwLock::const_new(Some(client)),
        }
    }

    /// Get or create a Kubernetes client.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the configuration cannot be resolved or the
    /// client cannot be built. Nothing is cached in that case.
    pub async fn get_client(&self) -> KsResult<Client> {
        {
            let client_guard = self.client.read().await;
            if let Some(ref client) = *client_guard {
                return Ok(client.clone());
            }
        }

        let mut client_guard = self.client.write().await;
        // another task may have built it while we waited for the write lock
        if let Some(ref client) = *client_guard {
            return Ok(client.clone());
        }

        debug!("🔧 Creating new Kubernetes client");
        let client = client::new(self.kube_addr.as_deref(), Some(USER_AGENT)).await?;
        *client_guard = Some(client.clone());
        Ok(client)
    }

    /// Drop the cached client so the next call rebuilds it
    pub async fn invalidate(&self) {
        debug!("🔄 Discarding cached Kubernetes client");
        *self.client.write().await = None;
    }

    #[cfg(test)]
    async fn has_client(&self) -> bool {
        self.client.read().await.is_some()
    }
}

/// Whether a failed request looks like an authentication problem that a
/// fresh client (and fresh credentials) could fix.
#[must_use]
pub const fn should_refresh_client(error: &kube::Error) -> bool {
    match error {
        kube::Error::Api(api_error) => matches!(api_error.code, 401 | 403),
        kube::Error::Auth(_) => true,
        _ => false,
    }
}
