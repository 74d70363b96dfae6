use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Form-encoded request body, kept ordered so that requests are reproducible.
///
pub type Params = Vec<(String, String)>;

/// Generic wrapper for all successful Proxmox API responses.
///
/// Proxmox API consistently wraps its successful responses in a JSON object
/// with a single `data` field. This struct models that wrapper.
///
/// # Example JSON
///
/// ```json
/// "data": {
///     ...
/// }
/// ```
///
#[derive(Deserialize)]
pub struct Response<T> {
    pub data: T,
}

/// Type-safe representation of a Proxmox Unique Process ID (`UPID`).
///
/// This is a new-type wrapper around a `String` to prevent accidental misuse of
/// a plain string where a UPID is expected. It also provides helper methods for
/// formatting the UPID for use in API URLs.
///
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct UniqueProcessId(String);

impl UniqueProcessId {
    /// Percent-encode the UPID to make it safe for use in a URL path
    ///
    /// For example, characters like `:` and `@` will be encoded to
    /// `%3A` and `%40` respectively.
    ///
    pub fn encoded(&self) -> String {
        utf8_percent_encode(&self.0, NON_ALPHANUMERIC).to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string of the UPID.
    ///
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for UniqueProcessId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// -----------------------------------------------------------------------------

/// Specific response structure for endpoints that return a VM's power status.
///
#[derive(Deserialize)]
pub struct StatusPayload {
    pub status: Status,
}

/// Power status of a virtual machine, also reused for task run states.
///
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Stopped,
    Running,
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Stopped => f.write_str("stopped"),
            Status::Running => f.write_str("running"),
        }
    }
}

/// High-level status of a long-running asynchronous task in Proxmox.
///
#[derive(Debug, PartialEq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed {
        task_type: String,
        exit_status: String,
    },
}

/// Raw response from the Proxmox task status endpoint.
///
/// # Fields
///
/// * `status`: Whether the task is still running.
/// * `exit_status`: Exit status of the task, present once the task has
///   stopped. Typically, `"OK"` on success.
/// * `task_type`: Kind of work the task performs (e.g. `qmcreate`).
///
#[derive(Deserialize)]
pub struct TaskResponse {
    pub status: Status,
    #[serde(rename = "exitstatus")]
    pub exit_status: Option<String>,
    #[serde(rename = "type", default)]
    pub task_type: String,
}

// -----------------------------------------------------------------------------

/// Reference to a specific virtual machine on a Proxmox cluster.
///
/// # Fields
///
/// * `node`: Name of the Proxmox node where the VM is located (e.g., "pve").
/// * `id`: Unique integer ID of the virtual machine (VMID).
///
#[derive(Debug, Clone, PartialEq)]
pub struct VmRef {
    pub node: String,
    pub id: u32,
}

impl VmRef {
    /// Creates a new reference to a virtual machine.
    ///
    pub fn new(node: &str, id: u32) -> Self {
        Self {
            node: node.to_owned(),
            id,
        }
    }
}

impl Display for VmRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.node, self.id)
    }
}

/// Reference to a specific asynchronous task on a Proxmox cluster.
///
/// # Fields
///
/// * `node`: Name of the Proxmox node where the task is running.
/// * `upid`: Unique Process ID (UPID) of the task.
///
#[derive(Debug, Clone)]
pub struct TaskRef {
    pub node: String,
    pub upid: UniqueProcessId,
}

impl TaskRef {
    /// Creates a new reference to Proxmox task.
    ///
    pub fn new(node: &str, upid: &UniqueProcessId) -> Self {
        Self {
            node: node.to_owned(),
            upid: upid.clone(),
        }
    }
}

// -----------------------------------------------------------------------------

/// QEMU configuration of a VM as returned by `GET .../qemu/{id}/config`.
///
/// The endpoint mixes typed scalars with indexed keys (`scsi0`, `net1`,
/// `ipconfig0`, `unused0`, ...) and omits values that equal the defaults, so
/// the payload is kept as a raw map with typed accessors.
///
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct QemuConfig(Map<String, Value>);

impl QemuConfig {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// String value of a key. Numbers are rendered, so that `"1"` and `1`
    /// read the same.
    ///
    pub fn string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(if *value { "1" } else { "0" }.to_owned()),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(value) => value.as_i64(),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Proxmox encodes booleans as `1`/`0`, in either numeric or string form.
    ///
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.string(key).map(|value| value == "1")
    }

    /// Keys of the form `{prefix}{number}` with their values, ordered by the
    /// number.
    ///
    pub fn indexed(&self, prefix: &str) -> Vec<(u32, String)> {
        let mut entries: Vec<(u32, String)> = self
            .0
            .iter()
            .filter_map(|(key, value)| {
                let index = key.strip_prefix(prefix)?.parse::<u32>().ok()?;
                let value = value.as_str()?.to_owned();
                Some((index, value))
            })
            .collect();
        entries.sort_by_key(|(index, _)| *index);
        entries
    }
}

// -----------------------------------------------------------------------------

/// Entry of `GET /nodes`.
///
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeResponse {
    pub node: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub level: String,
    #[serde(rename = "maxcpu", default)]
    pub max_cpu: u32,
    #[serde(rename = "maxmem", default)]
    pub max_memory: u64,
    #[serde(rename = "mem", default)]
    pub memory: u64,
    #[serde(default)]
    pub ssl_fingerprint: String,
    #[serde(default)]
    pub uptime: u64,
}

/// Entry of `GET /nodes/{node}/network`.
///
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeNetworkInterface {
    pub iface: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

/// Entry of `GET /nodes/{node}/storage`.
///
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageResponse {
    pub storage: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub enabled: u8,
    #[serde(default)]
    pub active: u8,
}

/// Entry of `GET /nodes/{node}/storage/{storage}/content`.
///
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageContent {
    pub volid: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub size: u64,
}

/// Body of `GET /cluster/sdn/zones/{zone}`.
///
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SdnZoneResponse {
    pub zone: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub ipam: Option<String>,
    #[serde(default)]
    pub nodes: Option<String>,
    #[serde(default)]
    pub peers: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}
