use crate::config::Config;
use crate::proxmox::Proxmox;
use crate::proxmox::client::ProxmoxClient;
use crate::services::task::TaskPolling;
use std::sync::Arc;

/// Everything a provider operation needs: the Proxmox client and the task
/// polling settings.
///
#[derive(Clone)]
pub struct AppState {
    pub proxmox: Arc<dyn Proxmox + Send + Sync>,
    pub polling: TaskPolling,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_client(Arc::new(ProxmoxClient::from_config(config)), config.polling())
    }

    pub fn with_client(proxmox: Arc<dyn Proxmox + Send + Sync>, polling: TaskPolling) -> Self {
        Self { proxmox, polling }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("Proxmox", &"Arc<dyn Proxmox>")
            .field("Polling", &self.polling)
            .finish()
    }
}
