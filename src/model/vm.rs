use crate::model::disk::{BusType, Drive, VmDisk};
use crate::model::format::{
    bool_flag, decode_ssh_keys, encode_ssh_keys, key_value_pairs, validate_ssh_keys,
};
use crate::prelude::{Error, Result};
use crate::proxmox::types::{Params, QemuConfig, Status};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Network device models QEMU can emulate.
///
pub const NETWORK_INTERFACE_TYPES: [&str; 14] = [
    "e1000",
    "e1000-82540em",
    "e1000-82544gc",
    "e1000-82545em",
    "e1000e",
    "i82551",
    "i82557b",
    "i82559er",
    "ne2k_isa",
    "ne2k_pci",
    "pcnet",
    "rtl8139",
    "virtio",
    "vmxnet3",
];

/// Desired or observed configuration of a QEMU virtual machine.
///
/// Field names follow the provider's document format, so a state printed by
/// the CLI can be fed back as the next plan.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmModel {
    pub vm_id: u32,
    pub node_name: Option<String>,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub cores: u32,
    pub sockets: u32,
    pub memory: u64,
    pub cpu_type: String,
    pub cpu_limit: u32,
    pub bios: String,
    pub acpi: bool,
    pub kvm: bool,
    pub numa_active: bool,
    pub qemu_agent_enabled: bool,
    pub start_on_boot: bool,
    pub protection: bool,
    pub os_type: String,
    pub scsi_hw: String,
    pub boot_order: Vec<String>,
    pub host_startup_order: u32,
    pub nameserver: String,
    pub ssh_keys: Vec<String>,
    pub default_user: Option<String>,
    pub perform_cloud_init_upgrade: bool,
    pub cloud_init_storage_name: Option<String>,
    pub vmgenid: Option<String>,
    pub power_state: Option<Status>,
    #[serde(rename = "disk")]
    pub disks: Vec<VmDisk>,
    #[serde(rename = "network_interface")]
    pub network_interfaces: Vec<VmNetworkInterface>,
    #[serde(rename = "ip_config")]
    pub ip_configs: Vec<VmIpConfig>,
}

impl Default for VmModel {
    fn default() -> Self {
        Self {
            vm_id: 0,
            node_name: None,
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            cores: 1,
            sockets: 1,
            memory: 512,
            cpu_type: "x86-64-v2-AES".to_owned(),
            cpu_limit: 0,
            bios: "seabios".to_owned(),
            acpi: true,
            kvm: true,
            numa_active: false,
            qemu_agent_enabled: false,
            start_on_boot: false,
            protection: false,
            os_type: "l26".to_owned(),
            scsi_hw: "virtio-scsi-single".to_owned(),
            boot_order: Vec::new(),
            host_startup_order: 0,
            nameserver: String::new(),
            ssh_keys: Vec::new(),
            default_user: None,
            perform_cloud_init_upgrade: true,
            cloud_init_storage_name: None,
            vmgenid: None,
            power_state: None,
            disks: Vec::new(),
            network_interfaces: Vec::new(),
            ip_configs: Vec::new(),
        }
    }
}

/// A network device of a VM, rendered as `virtio=BC:24:..,bridge=vmbr0,firewall=1`.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmNetworkInterface {
    #[serde(rename = "type")]
    pub model: String,
    pub mac_address: String,
    pub bridge: String,
    pub firewall: bool,
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

impl Default for VmNetworkInterface {
    fn default() -> Self {
        Self {
            model: "virtio".to_owned(),
            mac_address: String::new(),
            bridge: String::new(),
            firewall: true,
            order: 0,
            mtu: None,
        }
    }
}

/// Cloud-init IP configuration of a network device, rendered as
/// `gw=10.0.0.1,ip=10.0.0.10/24`.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmIpConfig {
    pub ip_address: String,
    pub gateway: String,
    pub order: u32,
}

impl VmNetworkInterface {
    pub fn to_config(&self) -> String {
        let mut config = format!(
            "{}={},bridge={},firewall={}",
            self.model,
            self.mac_address,
            self.bridge,
            bool_flag(self.firewall)
        );
        if let Some(mtu) = self.mtu {
            config.push_str(&format!(",mtu={mtu}"));
        }
        config
    }

    pub fn from_config(order: u32, value: &str) -> Self {
        let options = key_value_pairs(value);
        let (model, mac_address) = options
            .iter()
            .find(|(key, _)| NETWORK_INTERFACE_TYPES.contains(*key))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .unwrap_or_default();

        Self {
            model,
            mac_address,
            bridge: options.get("bridge").map(|bridge| bridge.to_string()).unwrap_or_default(),
            firewall: options.get("firewall") == Some(&"1"),
            order,
            mtu: options.get("mtu").and_then(|mtu| mtu.parse().ok()),
        }
    }
}

impl VmIpConfig {
    pub fn to_config(&self) -> String {
        format!("gw={},ip={}", self.gateway, self.ip_address)
    }

    pub fn from_config(order: u32, value: &str) -> Self {
        let options = key_value_pairs(value);
        Self {
            ip_address: options.get("ip").map(|ip| ip.to_string()).unwrap_or_default(),
            gateway: options.get("gw").map(|gw| gw.to_string()).unwrap_or_default(),
            order,
        }
    }
}

impl VmModel {
    /// Node name of a model that must already be placed on a node.
    ///
    pub fn node(&self) -> Result<&str> {
        self.node_name
            .as_deref()
            .filter(|node| !node.is_empty())
            .ok_or_else(|| Error::Validation("node_name".to_owned(), "a node name is required".to_owned()))
    }

    /// Checks the plan before any request is sent.
    ///
    pub fn validate(&self) -> Result<()> {
        let invalid = |attribute: &str, detail: &str| {
            Err(Error::Validation(attribute.to_owned(), detail.to_owned()))
        };

        if self.vm_id < 100 {
            return invalid("vm_id", "VM ids start at 100");
        }
        self.node()?;
        if self.name.is_empty() {
            return invalid("name", "a VM name is required");
        }
        if self.cores == 0 || self.sockets == 0 {
            return invalid("cores", "at least one core and one socket are required");
        }
        if self.memory == 0 {
            return invalid("memory", "memory must be greater than zero");
        }
        validate_ssh_keys(&self.ssh_keys)?;

        let mut identities = HashSet::new();
        for disk in &self.disks {
            if disk.storage_location.is_empty() {
                return invalid("disk.storage_location", &format!("{} has no storage location", disk.slot()));
            }
            disk.size_gib()?;
            if !identities.insert(disk.identity()) {
                return invalid("disk", &format!("{} is declared more than once", disk.slot()));
            }
        }
        if let Some(nic) = self
            .network_interfaces
            .iter()
            .find(|nic| !NETWORK_INTERFACE_TYPES.contains(&nic.model.as_str()))
        {
            return invalid(
                "network_interface.type",
                &format!("'{}' must be one of {}", nic.model, NETWORK_INTERFACE_TYPES.join(" | ")),
            );
        }
        Ok(())
    }

    /// Builds the form parameters of a create (`create_new`) or config update
    /// request.
    ///
    /// Disks and the cloud-init drive are only part of a create request,
    /// updates go through the disk reconciliation instead.
    ///
    pub fn to_params(&self, create_new: bool) -> Result<Params> {
        let mut params: Params = Vec::new();
        let mut add = |key: &str, value: String| params.push((key.to_owned(), value));

        if create_new {
            add("vmid", self.vm_id.to_string());
        }
        add("name", self.name.clone());
        add("acpi", bool_flag(self.acpi).to_owned());
        add("agent", bool_flag(self.qemu_agent_enabled).to_owned());
        add("bios", self.bios.clone());
        add("boot", format!("order={}", self.boot_order.join(";")));
        add("ciupgrade", bool_flag(self.perform_cloud_init_upgrade).to_owned());
        add("cpu", self.cpu_type.clone());
        add("hotplug", "network,usb".to_owned());
        add("cpulimit", self.cpu_limit.to_string());
        add("description", self.description.clone());
        for ip_config in &self.ip_configs {
            add(&format!("ipconfig{}", ip_config.order), ip_config.to_config());
        }
        add("kvm", bool_flag(self.kvm).to_owned());
        add("memory", self.memory.to_string());
        add("nameserver", self.nameserver.clone());
        add("numa", bool_flag(self.numa_active).to_owned());
        add("scsihw", self.scsi_hw.clone());
        add("sockets", self.sockets.to_string());
        if !self.ssh_keys.is_empty() {
            add("sshkeys", encode_ssh_keys(&self.ssh_keys));
        }
        add("cores", self.cores.to_string());
        add("tags", self.tags.join(","));
        add("startup", format!("order={}", self.host_startup_order));
        add("protection", bool_flag(self.protection).to_owned());
        add("ostype", self.os_type.clone());
        add("onboot", bool_flag(self.start_on_boot).to_owned());
        if let Some(user) = self.default_user.as_ref().filter(|user| !user.is_empty()) {
            add("ciuser", user.clone());
        }

        if create_new {
            for disk in &self.disks {
                add(&disk.slot(), disk.to_config(self.vm_id, true)?);
            }
            if let Some(storage) = &self.cloud_init_storage_name {
                add(
                    &format!("scsi{}", self.free_scsi_slot()),
                    format!("{storage}:cloudinit,media=cdrom"),
                );
            }
        }
        for nic in &self.network_interfaces {
            add(&format!("net{}", nic.order), nic.to_config());
        }

        Ok(params)
    }

    /// First `scsi` position not taken by a declared disk.
    ///
    fn free_scsi_slot(&self) -> u32 {
        let taken: HashSet<u32> = self
            .disks
            .iter()
            .filter(|disk| disk.bus_type == BusType::Scsi)
            .map(|disk| disk.order)
            .collect();
        (0..).find(|order| !taken.contains(order)).unwrap_or_default()
    }

    /// Maps a QEMU config back to a model.
    ///
    /// Proxmox omits values equal to its defaults and never reports import
    /// sources, so these are taken from `prior` (the plan or last state) when
    /// the disk slot matches.
    ///
    pub fn from_config(
        vm_id: u32,
        node: &str,
        config: &QemuConfig,
        prior: Option<&VmModel>,
    ) -> Result<Self> {
        let string = |key: &str| config.string(key).unwrap_or_default();
        let flag = |key: &str, default: bool| config.flag(key).unwrap_or(default);
        let number = |key: &str| config.int(key).unwrap_or_default();

        let mut model = VmModel {
            vm_id,
            node_name: Some(node.to_owned()),
            name: string("name"),
            description: string("description"),
            tags: string("tags")
                .split(';')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_owned)
                .collect(),
            cores: u32::try_from(number("cores")).unwrap_or(1).max(1),
            sockets: u32::try_from(number("sockets")).unwrap_or(1).max(1),
            memory: u64::try_from(number("memory")).unwrap_or_default(),
            cpu_type: string("cpu"),
            cpu_limit: u32::try_from(number("cpulimit")).unwrap_or_default(),
            bios: config
                .string("bios")
                .filter(|bios| !bios.is_empty())
                .unwrap_or_else(|| "seabios".to_owned()),
            acpi: flag("acpi", true),
            kvm: flag("kvm", true),
            numa_active: flag("numa", false),
            qemu_agent_enabled: config
                .string("agent")
                .map(|agent| agent.starts_with('1') || agent.contains("enabled=1"))
                .unwrap_or(false),
            start_on_boot: flag("onboot", false),
            protection: flag("protection", false),
            os_type: string("ostype"),
            scsi_hw: config
                .string("scsihw")
                .unwrap_or_else(|| "lsi".to_owned()),
            boot_order: string("boot")
                .trim_start_matches("order=")
                .split(';')
                .filter(|device| !device.is_empty())
                .map(str::to_owned)
                .collect(),
            host_startup_order: key_value_pairs(&string("startup"))
                .get("order")
                .and_then(|order| order.parse().ok())
                .unwrap_or_default(),
            nameserver: string("nameserver"),
            ssh_keys: decode_ssh_keys(&string("sshkeys")),
            default_user: config.string("ciuser"),
            perform_cloud_init_upgrade: flag("ciupgrade", true),
            cloud_init_storage_name: None,
            vmgenid: config.string("vmgenid"),
            power_state: None,
            disks: Vec::new(),
            network_interfaces: config
                .indexed("net")
                .into_iter()
                .map(|(order, value)| VmNetworkInterface::from_config(order, &value))
                .collect(),
            ip_configs: config
                .indexed("ipconfig")
                .into_iter()
                .map(|(order, value)| VmIpConfig::from_config(order, &value))
                .collect(),
        };

        for bus_type in BusType::ALL {
            for (order, value) in config.indexed(bus_type.as_str()) {
                match Drive::from_config(bus_type, order, &value)? {
                    Drive::Disk(disk) => model.disks.push(disk),
                    Drive::CloudInit(storage) => model.cloud_init_storage_name = Some(storage),
                    Drive::Unmanaged => {}
                }
            }
        }
        model.disks.sort_by_key(VmDisk::identity);

        if let Some(prior) = prior {
            for disk in model.disks.iter_mut() {
                if let Some(planned) = prior.disks.iter().find(|planned| planned.identity() == disk.identity()) {
                    disk.import_from = planned.import_from.clone();
                    disk.import_path = planned.import_path.clone();
                }
            }
        }

        Ok(model)
    }
}
