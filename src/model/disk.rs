use crate::model::format::{bool_flag, key_value_pairs, size_to_gib, size_to_kib};
use crate::prelude::Result;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Controller a drive is attached to.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    Ide,
    Sata,
    #[default]
    Scsi,
    Virtio,
}

impl BusType {
    pub const ALL: [BusType; 4] = [BusType::Ide, BusType::Sata, BusType::Scsi, BusType::Virtio];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusType::Ide => "ide",
            BusType::Sata => "sata",
            BusType::Scsi => "scsi",
            BusType::Virtio => "virtio",
        }
    }
}

impl Display for BusType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot identity of a disk. Two disks are the same disk when they sit on the
/// same bus at the same position, whatever their content.
///
pub type DiskIdentity = (BusType, u32);

/// A virtual disk attached to a VM.
///
/// # Fields
///
/// * `id`: Volume number on the storage (`vm-{vmid}-disk-{id}`), reported by
///   Proxmox.
/// * `volume`: Volume id exactly as Proxmox reports it, e.g.
///   `local:100/vm-100-disk-0.qcow2` on file based storage.
/// * `storage_location`: Storage the volume lives on, e.g. `local-zfs`.
/// * `size`: Size with unit suffix, e.g. `32G`.
/// * `import_from` / `import_path`: Storage and path of an image the disk is
///   imported from on creation. Proxmox does not report them back.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmDisk {
    pub id: u32,
    pub bus_type: BusType,
    pub order: u32,
    pub storage_location: String,
    pub size: String,
    pub cache: String,
    pub async_io: String,
    pub io_thread: bool,
    pub replicate: bool,
    pub read_only: bool,
    pub ssd_emulation: bool,
    pub backup_enabled: bool,
    pub discard_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

impl Default for VmDisk {
    fn default() -> Self {
        Self {
            id: 0,
            bus_type: BusType::Scsi,
            order: 0,
            storage_location: String::new(),
            size: String::new(),
            cache: "default".to_owned(),
            async_io: "default".to_owned(),
            io_thread: true,
            replicate: true,
            read_only: false,
            ssd_emulation: false,
            backup_enabled: true,
            discard_enabled: false,
            import_from: None,
            import_path: None,
            volume: None,
        }
    }
}

/// A drive entry of a QEMU config, classified.
///
#[derive(Debug, Clone, PartialEq)]
pub enum Drive {
    Disk(VmDisk),
    /// Cloud-init drive, with the storage it lives on.
    CloudInit(String),
    /// CD-ROM, pass-through device or any volume the provider does not manage.
    Unmanaged,
}

impl VmDisk {
    pub fn identity(&self) -> DiskIdentity {
        (self.bus_type, self.order)
    }

    /// Config key of the disk, e.g. `scsi1`.
    ///
    pub fn slot(&self) -> String {
        format!("{}{}", self.bus_type, self.order)
    }

    pub fn size_gib(&self) -> Result<u64> {
        size_to_gib(&self.size)
    }

    pub fn size_kib(&self) -> Result<u64> {
        size_to_kib(&self.size)
    }

    /// Volume id on the storage, e.g. `local-zfs:vm-140-disk-0`. The reported
    /// id is used when known, block storage naming otherwise.
    ///
    pub fn volume_id(&self, vm_id: u32) -> String {
        self.volume
            .clone()
            .unwrap_or_else(|| format!("{}:vm-{}-disk-{}", self.storage_location, vm_id, self.id))
    }

    /// Import source in the `{storage}:{path}` form Proxmox expects.
    ///
    pub fn import_source(&self) -> Option<String> {
        match (self.import_from.as_deref(), self.import_path.as_deref()) {
            (Some(from), path) if !from.is_empty() => {
                Some(format!("{}:{}", from, path.unwrap_or_default()))
            }
            _ => None,
        }
    }

    /// Whether import source and path are the same, treating empty as absent.
    ///
    pub fn same_import(&self, other: &VmDisk) -> bool {
        let normalize = |value: &Option<String>| value.clone().filter(|value| !value.is_empty());
        normalize(&self.import_from) == normalize(&other.import_from)
            && normalize(&self.import_path) == normalize(&other.import_path)
    }

    /// Whether the attributes that can be changed with a config update match.
    ///
    pub fn same_options(&self, other: &VmDisk) -> bool {
        self.cache == other.cache
            && self.async_io == other.async_io
            && self.io_thread == other.io_thread
            && self.replicate == other.replicate
            && self.read_only == other.read_only
            && self.ssd_emulation == other.ssd_emulation
            && self.backup_enabled == other.backup_enabled
            && self.discard_enabled == other.discard_enabled
    }

    /// Renders the disk as a drive config string.
    ///
    /// A new disk is either allocated with its size in GiB
    /// (`local-zfs:32,size=32G`) or imported from an image
    /// (`local-zfs:0,import-from=local:import/debian.qcow2`), in which case the
    /// size is ignored by Proxmox and the disk has to be resized afterwards.
    /// An existing disk references its volume.
    ///
    pub fn to_config(&self, vm_id: u32, create_new: bool) -> Result<String> {
        let mut config = match (create_new, self.import_source()) {
            (true, Some(source)) => format!("{}:0,import-from={}", self.storage_location, source),
            (true, None) => format!(
                "{}:{},size={}",
                self.storage_location,
                self.size_gib()?,
                self.size
            ),
            (false, _) => format!("{},size={}", self.volume_id(vm_id), self.size),
        };

        if self.async_io != "default" {
            config.push_str(&format!(",aio={}", self.async_io));
        }
        if !self.backup_enabled {
            config.push_str(",backup=0");
        }
        if self.cache != "default" {
            config.push_str(&format!(",cache={}", self.cache));
        }
        if self.discard_enabled {
            config.push_str(",discard=on");
        }
        config.push_str(&format!(",iothread={}", bool_flag(self.io_thread)));
        if !self.replicate {
            config.push_str(",replicate=0");
        }
        if self.read_only {
            config.push_str(",ro=1");
        }
        if self.ssd_emulation {
            config.push_str(",ssd=1");
        }
        Ok(config)
    }
}

impl Drive {
    /// Parses a drive config string, e.g.
    /// `local-zfs:vm-140-disk-0,aio=io_uring,backup=0,iothread=1,size=32G`.
    ///
    pub fn from_config(bus_type: BusType, order: u32, value: &str) -> Result<Drive> {
        let volume = value.split(',').next().unwrap_or_default();
        let options = key_value_pairs(value);

        let Some((storage, name)) = volume.split_once(':') else {
            tracing::debug!(target: "model", %bus_type, order, %volume, "Drive without storage skipped");
            return Ok(Drive::Unmanaged);
        };
        if name.contains("cloudinit") {
            return Ok(Drive::CloudInit(storage.to_owned()));
        }
        if options.get("media") == Some(&"cdrom") {
            return Ok(Drive::Unmanaged);
        }

        let id = volume_number(name).unwrap_or_else(|| {
            tracing::debug!(target: "model", %bus_type, order, %volume, "Volume without disk number");
            0
        });
        let text = |key: &str| {
            options
                .get(key)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
                .unwrap_or_else(|| "default".to_owned())
        };

        Ok(Drive::Disk(VmDisk {
            id,
            bus_type,
            order,
            storage_location: storage.to_owned(),
            size: options.get("size").map(|size| size.to_string()).unwrap_or_default(),
            cache: text("cache"),
            async_io: text("aio"),
            io_thread: options.get("iothread") == Some(&"1"),
            replicate: options.get("replicate").is_none_or(|value| *value != "0"),
            read_only: options.get("ro") == Some(&"1"),
            ssd_emulation: options.get("ssd") == Some(&"1"),
            backup_enabled: options.get("backup").is_none_or(|value| *value != "0"),
            discard_enabled: options.get("discard") == Some(&"on"),
            import_from: None,
            import_path: None,
            volume: Some(volume.to_owned()),
        }))
    }
}

/// Number `N` of a volume named `vm-100-disk-N`, with or without a directory
/// prefix (`100/`, `base-9000-disk-0/`) and file extension (`.qcow2`).
///
fn volume_number(name: &str) -> Option<u32> {
    let file = name.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    stem.rsplit_once("disk-")?.1.parse().ok()
}
