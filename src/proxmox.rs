pub mod client;
pub mod types;

// -----------------------------------------------------------------------------

use crate::prelude::Result;
use crate::proxmox::types::*;
use async_trait::async_trait;

/// Operations the provider performs against the Proxmox VE REST API.
///
/// Every mutating VM operation returns the `UPID` of the asynchronous task
/// that Proxmox started, which the caller is expected to poll with
/// [`Proxmox::task_status`].
///
#[async_trait]
pub trait Proxmox {
    async fn list_nodes(&self) -> Result<Vec<NodeResponse>>;
    async fn node_network(&self, node: &str) -> Result<Vec<NodeNetworkInterface>>;
    async fn list_storage(&self, node: &str) -> Result<Vec<StorageResponse>>;
    async fn storage_content(&self, node: &str, storage: &str) -> Result<Vec<StorageContent>>;

    async fn vm_config(&self, vm: &VmRef) -> Result<QemuConfig>;
    async fn vm_status(&self, vm: &VmRef) -> Result<Status>;
    async fn create_vm(&self, node: &str, params: Params) -> Result<UniqueProcessId>;
    /// Some configuration changes are applied synchronously, in which case
    /// Proxmox answers with `null` instead of a task.
    async fn update_vm_config(&self, vm: &VmRef, params: Params) -> Result<Option<UniqueProcessId>>;
    async fn resize_disk(&self, vm: &VmRef, disk: &str, size: &str) -> Result<Option<UniqueProcessId>>;
    async fn move_disk(&self, vm: &VmRef, disk: &str, storage: &str) -> Result<UniqueProcessId>;
    async fn start(&self, vm: &VmRef) -> Result<UniqueProcessId>;
    async fn shutdown(&self, vm: &VmRef) -> Result<UniqueProcessId>;
    async fn migrate(&self, vm: &VmRef, target: &str, online: bool) -> Result<UniqueProcessId>;
    /// Destroys the VM together with its unreferenced disks and removes it
    /// from every configuration (replication, HA, backup jobs).
    async fn delete(&self, vm: &VmRef) -> Result<UniqueProcessId>;

    async fn task_status(&self, task: &TaskRef) -> Result<TaskStatus>;

    async fn create_sdn_zone(&self, params: Params) -> Result<()>;
    async fn sdn_zone(&self, zone: &str) -> Result<SdnZoneResponse>;
    async fn update_sdn_zone(&self, zone: &str, params: Params) -> Result<()>;
    async fn delete_sdn_zone(&self, zone: &str) -> Result<()>;
}
