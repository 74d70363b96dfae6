
// -------------------------------------------------------------------------

use async_trait::async_trait;
use proxmox_provider::prelude::{AppState, Error, Proxmox, ProxmoxError, Result};
use proxmox_provider::proxmox::types::*;
use proxmox_provider::services::task::TaskPolling;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Test helper that holds provider state backed by an in-memory cluster.
///
pub struct TestApp {
    pub state: AppState,
    pub proxmox: Arc<MockProxmoxClient>,
}

impl TestApp {
    /// Creates a new `TestApp`.
    ///
    /// # Arguments
    ///
    /// * `nodes`: Names of the cluster nodes.
    ///
    pub fn new(nodes: &[&str]) -> Self {
        let proxmox = Arc::new(MockProxmoxClient::new(nodes));
        let state = AppState::with_client(proxmox.clone(), TaskPolling::new(0, None));
        TestApp { state, proxmox }
    }
}

/// Position of the first recorded call starting with `prefix`.
///
pub fn position(calls: &[String], prefix: &str) -> usize {
    calls
        .iter()
        .position(|call| call.starts_with(prefix))
        .unwrap_or_else(|| panic!("no call starting with '{prefix}' in {calls:#?}"))
}

// -------------------------------------------------------------------------

#[derive(Default)]
struct Cluster {
    nodes: Vec<String>,
    vms: HashMap<u32, (String, Map<String, Value>)>,
    statuses: HashMap<u32, Status>,
    zones: HashMap<String, SdnZoneResponse>,
    calls: Vec<String>,
}

/// Mock Proxmox client for testing.
///
/// Keeps VM configs the way Proxmox stores them: new disks get a volume
/// allocated, detached disks turn into `unusedN` entries. Every mutating
/// request is recorded in order.
///
pub struct MockProxmoxClient {
    cluster: Mutex<Cluster>,
}

impl MockProxmoxClient {
    pub fn new(nodes: &[&str]) -> Self {
        let cluster = Cluster {
            nodes: nodes.iter().map(|node| node.to_string()).collect(),
            ..Cluster::default()
        };
        Self {
            cluster: Mutex::new(cluster),
        }
    }

    pub fn add_vm(&self, node: &str, vm_id: u32, status: Status, config: &[(&str, &str)]) {
        let config = config
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        let mut cluster = self.cluster.lock().unwrap();
        cluster.vms.insert(vm_id, (node.to_owned(), config));
        cluster.statuses.insert(vm_id, status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.cluster.lock().unwrap().calls.clone()
    }

    pub fn config(&self, vm_id: u32) -> Option<Map<String, Value>> {
        let cluster = self.cluster.lock().unwrap();
        cluster.vms.get(&vm_id).map(|(_, config)| config.clone())
    }

    pub fn node_of(&self, vm_id: u32) -> Option<String> {
        let cluster = self.cluster.lock().unwrap();
        cluster.vms.get(&vm_id).map(|(node, _)| node.clone())
    }

    pub fn status(&self, vm_id: u32) -> Option<Status> {
        self.cluster.lock().unwrap().statuses.get(&vm_id).copied()
    }

    fn record(&self, call: String) {
        self.cluster.lock().unwrap().calls.push(call);
    }

    fn with_config<T>(&self, vm: &VmRef, action: impl FnOnce(&mut Map<String, Value>) -> T) -> Result<T> {
        let mut cluster = self.cluster.lock().unwrap();
        match cluster.vms.get_mut(&vm.id) {
            Some((node, config)) if *node == vm.node => Ok(action(config)),
            _ => Err(missing_vm(vm)),
        }
    }

    fn set_status(&self, vm: &VmRef, status: Status) -> Result<UniqueProcessId> {
        self.with_config(vm, |_| ())?;
        self.cluster.lock().unwrap().statuses.insert(vm.id, status);
        Ok(upid())
    }
}

fn upid() -> UniqueProcessId {
    "UPID:pve:0000A1B2:00C3D4E5:6700AB12:mock:100:root@pam!token:".into()
}

fn missing_vm(vm: &VmRef) -> Error {
    Error::Proxmox(
        ProxmoxError::Config,
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Configuration file 'nodes/{}/qemu-server/{}.conf' does not exist", vm.node, vm.id),
    )
}

fn missing_zone(zone: &str) -> Error {
    Error::Proxmox(
        ProxmoxError::Sdn,
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("sdn 'zone' object ID '{zone}' does not exist"),
    )
}

fn param(params: &Params, key: &str) -> Option<String> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.clone())
}

fn is_drive(key: &str) -> bool {
    ["ide", "sata", "scsi", "virtio"].iter().any(|bus| {
        key.strip_prefix(bus)
            .is_some_and(|order| !order.is_empty() && order.chars().all(|c| c.is_ascii_digit()))
    })
}

fn next_disk_id(config: &Map<String, Value>, vm_id: u32) -> u32 {
    let prefix = format!("vm-{vm_id}-disk-");
    config
        .values()
        .filter_map(Value::as_str)
        .filter_map(|value| value.split(',').next()?.split_once(':')?.1.strip_prefix(prefix.as_str())?.parse::<u32>().ok())
        .map(|id| id + 1)
        .max()
        .unwrap_or(0)
}

/// Stores a drive value, allocating a volume for `{storage}:{size}` values.
///
fn store_drive(config: &mut Map<String, Value>, vm_id: u32, key: &str, value: &str) {
    let mut parts = value.split(',');
    let head = parts.next().unwrap_or_default();
    let stored = match head.split_once(':') {
        Some((storage, size)) if size.parse::<u64>().is_ok() => {
            let rest: Vec<&str> = parts.filter(|part| !part.starts_with("import-from=")).collect();
            let mut stored = format!("{storage}:vm-{vm_id}-disk-{}", next_disk_id(config, vm_id));
            if !rest.iter().any(|part| part.starts_with("size=")) {
                stored.push_str(",size=2G");
            }
            for part in rest {
                stored.push(',');
                stored.push_str(part);
            }
            stored
        }
        _ => value.to_owned(),
    };
    config.insert(key.to_owned(), Value::String(stored));
}

fn detach(config: &mut Map<String, Value>, key: &str) {
    let Some(value) = config.remove(key) else {
        return;
    };
    let volume = value.as_str().unwrap_or_default().split(',').next().unwrap_or_default().to_owned();
    if is_drive(key) && volume.contains("vm-") {
        let index = (0..).find(|index| !config.contains_key(&format!("unused{index}"))).unwrap_or_default();
        config.insert(format!("unused{index}"), Value::String(volume));
    }
}

fn rewrite_drive(config: &mut Map<String, Value>, disk: &str, rewrite: impl Fn(&str) -> String) {
    if let Some(value) = config.get(disk).and_then(Value::as_str).map(str::to_owned) {
        config.insert(disk.to_owned(), Value::String(rewrite(&value)));
    }
}

#[async_trait]
impl Proxmox for MockProxmoxClient {
    async fn list_nodes(&self) -> Result<Vec<NodeResponse>> {
        let cluster = self.cluster.lock().unwrap();
        Ok(cluster
            .nodes
            .iter()
            .map(|node| NodeResponse {
                node: node.clone(),
                status: "online".to_owned(),
                max_cpu: 8,
                max_memory: 34359738368,
                ..NodeResponse::default()
            })
            .collect())
    }

    async fn node_network(&self, node: &str) -> Result<Vec<NodeNetworkInterface>> {
        let cluster = self.cluster.lock().unwrap();
        let index = cluster
            .nodes
            .iter()
            .position(|candidate| candidate == node)
            .ok_or_else(|| Error::Proxmox(ProxmoxError::Nodes, StatusCode::NOT_FOUND, "no such node".to_owned()))?;
        Ok(vec![
            NodeNetworkInterface {
                iface: "eno1".to_owned(),
                kind: "eth".to_owned(),
                ..NodeNetworkInterface::default()
            },
            NodeNetworkInterface {
                iface: "vmbr0".to_owned(),
                kind: "bridge".to_owned(),
                address: Some(format!("10.0.0.{}", index + 1)),
                cidr: Some(format!("10.0.0.{}/24", index + 1)),
                gateway: Some("10.0.0.254".to_owned()),
            },
        ])
    }

    async fn list_storage(&self, _node: &str) -> Result<Vec<StorageResponse>> {
        Ok(["local", "local-zfs"]
            .into_iter()
            .map(|storage| StorageResponse {
                storage: storage.to_owned(),
                enabled: 1,
                active: 1,
                ..StorageResponse::default()
            })
            .collect())
    }

    async fn storage_content(&self, _node: &str, storage: &str) -> Result<Vec<StorageContent>> {
        if storage != "local" {
            return Ok(Vec::new());
        }
        Ok([
            ("local:import/debian-12.0.0.qcow2", "import"),
            ("local:import/debian-12.10.1.qcow2", "import"),
            ("local:import/debian-12.9.0.qcow2", "import"),
            ("local:import/ubuntu-24.4.0.qcow2", "import"),
            ("local:iso/debian-13.0.0.iso", "iso"),
        ]
        .into_iter()
        .map(|(volid, content)| StorageContent {
            volid: volid.to_owned(),
            content: content.to_owned(),
            ..StorageContent::default()
        })
        .collect())
    }

    async fn vm_config(&self, vm: &VmRef) -> Result<QemuConfig> {
        self.with_config(vm, |config| QemuConfig::from_map(config.clone()))
    }

    async fn vm_status(&self, vm: &VmRef) -> Result<Status> {
        self.with_config(vm, |_| ())?;
        Ok(self.status(vm.id).unwrap_or(Status::Stopped))
    }

    async fn create_vm(&self, node: &str, params: Params) -> Result<UniqueProcessId> {
        let vm_id = param(&params, "vmid")
            .and_then(|vm_id| vm_id.parse::<u32>().ok())
            .ok_or_else(|| Error::Validation("vmid".to_owned(), "missing".to_owned()))?;
        let mut config = Map::new();
        for (key, value) in params.iter().filter(|(key, _)| key != "vmid") {
            if is_drive(key) {
                store_drive(&mut config, vm_id, key, value);
            } else {
                config.insert(key.clone(), Value::String(value.clone()));
            }
        }

        let mut cluster = self.cluster.lock().unwrap();
        if cluster.vms.contains_key(&vm_id) {
            return Err(Error::Proxmox(
                ProxmoxError::Create,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("VM {vm_id} already exists"),
            ));
        }
        cluster.vms.insert(vm_id, (node.to_owned(), config));
        cluster.statuses.insert(vm_id, Status::Stopped);
        cluster.calls.push(format!("create {node}/{vm_id}"));
        Ok(upid())
    }

    async fn update_vm_config(&self, vm: &VmRef, params: Params) -> Result<Option<UniqueProcessId>> {
        self.with_config(vm, |config| {
            for (key, value) in &params {
                if key == "delete" {
                    value.split(',').for_each(|key| detach(config, key));
                } else if is_drive(key) {
                    store_drive(config, vm.id, key, value);
                } else {
                    config.insert(key.clone(), Value::String(value.clone()));
                }
            }
        })?;

        let call = match param(&params, "delete") {
            Some(deleted) => format!("delete {vm} {deleted}"),
            None => {
                let keys: Vec<&str> = params.iter().map(|(key, _)| key.as_str()).collect();
                format!("config {vm} {}", keys.join(","))
            }
        };
        self.record(call);
        Ok(Some(upid()))
    }

    async fn resize_disk(&self, vm: &VmRef, disk: &str, size: &str) -> Result<Option<UniqueProcessId>> {
        self.with_config(vm, |config| {
            rewrite_drive(config, disk, |value| {
                let mut parts: Vec<String> = value
                    .split(',')
                    .filter(|part| !part.starts_with("size="))
                    .map(str::to_owned)
                    .collect();
                parts.insert(1, format!("size={size}"));
                parts.join(",")
            })
        })?;
        self.record(format!("resize {vm} {disk} {size}"));
        Ok(Some(upid()))
    }

    async fn move_disk(&self, vm: &VmRef, disk: &str, storage: &str) -> Result<UniqueProcessId> {
        self.with_config(vm, |config| {
            rewrite_drive(config, disk, |value| match value.split_once(':') {
                Some((_, rest)) => format!("{storage}:{rest}"),
                None => value.to_owned(),
            })
        })?;
        self.record(format!("move {vm} {disk} {storage}"));
        Ok(upid())
    }

    async fn start(&self, vm: &VmRef) -> Result<UniqueProcessId> {
        let upid = self.set_status(vm, Status::Running)?;
        self.record(format!("start {vm}"));
        Ok(upid)
    }

    async fn shutdown(&self, vm: &VmRef) -> Result<UniqueProcessId> {
        let upid = self.set_status(vm, Status::Stopped)?;
        self.record(format!("shutdown {vm}"));
        Ok(upid)
    }

    async fn migrate(&self, vm: &VmRef, target: &str, online: bool) -> Result<UniqueProcessId> {
        self.with_config(vm, |_| ())?;
        let mut cluster = self.cluster.lock().unwrap();
        if let Some((node, _)) = cluster.vms.get_mut(&vm.id) {
            *node = target.to_owned();
        }
        cluster.calls.push(format!("migrate {vm} {target} online={online}"));
        Ok(upid())
    }

    async fn delete(&self, vm: &VmRef) -> Result<UniqueProcessId> {
        self.with_config(vm, |_| ())?;
        let mut cluster = self.cluster.lock().unwrap();
        cluster.vms.remove(&vm.id);
        cluster.statuses.remove(&vm.id);
        cluster.calls.push(format!("destroy {vm}"));
        Ok(upid())
    }

    async fn task_status(&self, _task: &TaskRef) -> Result<TaskStatus> {
        Ok(TaskStatus::Completed)
    }

    async fn create_sdn_zone(&self, params: Params) -> Result<()> {
        let zone = param(&params, "zone").unwrap_or_default();
        let mut cluster = self.cluster.lock().unwrap();
        if cluster.zones.contains_key(&zone) {
            return Err(Error::Proxmox(
                ProxmoxError::Sdn,
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("zone ID '{zone}' already defined"),
            ));
        }
        let response = SdnZoneResponse {
            zone: zone.clone(),
            kind: param(&params, "type").unwrap_or_default(),
            ipam: param(&params, "ipam"),
            // Proxmox hands lists back with stray whitespace.
            nodes: param(&params, "nodes"),
            peers: param(&params, "peers").map(|peers| format!(" {peers} ")),
            digest: Some("5a8c".to_owned()),
        };
        cluster.zones.insert(zone.clone(), response);
        cluster.calls.push(format!("zone create {zone}"));
        Ok(())
    }

    async fn sdn_zone(&self, zone: &str) -> Result<SdnZoneResponse> {
        let cluster = self.cluster.lock().unwrap();
        cluster.zones.get(zone).cloned().ok_or_else(|| missing_zone(zone))
    }

    async fn update_sdn_zone(&self, zone: &str, params: Params) -> Result<()> {
        let mut cluster = self.cluster.lock().unwrap();
        let stored = cluster.zones.get_mut(zone).ok_or_else(|| missing_zone(zone))?;
        for (key, value) in &params {
            match key.as_str() {
                "ipam" => stored.ipam = Some(value.clone()),
                "nodes" => stored.nodes = Some(value.clone()),
                "peers" => stored.peers = Some(value.clone()),
                "delete" => {
                    for deleted in value.split(',') {
                        match deleted {
                            "nodes" => stored.nodes = None,
                            "peers" => stored.peers = None,
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        let keys: Vec<&str> = params.iter().map(|(key, _)| key.as_str()).collect();
        cluster.calls.push(format!("zone update {zone} {}", keys.join(",")));
        Ok(())
    }

    async fn delete_sdn_zone(&self, zone: &str) -> Result<()> {
        let mut cluster = self.cluster.lock().unwrap();
        cluster.zones.remove(zone).ok_or_else(|| missing_zone(zone))?;
        cluster.calls.push(format!("zone delete {zone}"));
        Ok(())
    }
}
