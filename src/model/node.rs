use crate::proxmox::types::NodeResponse;
use serde::Serialize;

/// A cluster node as exposed by the node lookup.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeModel {
    pub name: String,
    pub status: String,
    pub cpu: f64,
    pub level: String,
    pub max_cpu: u32,
    pub max_memory: u64,
    pub memory: u64,
    pub ssl_fingerprint: String,
    pub uptime: u64,
    pub network_address: String,
}

impl NodeModel {
    pub fn new(node: NodeResponse, network_address: String) -> Self {
        Self {
            name: node.node,
            status: node.status,
            cpu: node.cpu,
            level: node.level,
            max_cpu: node.max_cpu,
            max_memory: node.max_memory,
            memory: node.memory,
            ssl_fingerprint: node.ssl_fingerprint,
            uptime: node.uptime,
            network_address,
        }
    }
}
