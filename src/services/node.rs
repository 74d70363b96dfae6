use crate::model::node::NodeModel;
use crate::prelude::{AppState, Error, Result};

/// Looks a cluster node up by name, together with the first address
/// configured on one of its network interfaces.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state))]
pub async fn read(app_state: &AppState, name: &str) -> Result<NodeModel> {
    let node = app_state
        .proxmox
        .list_nodes()
        .await?
        .into_iter()
        .find(|node| node.node == name)
        .ok_or_else(|| Error::NotFound(format!("node {name}")))?;

    let network_address = app_state
        .proxmox
        .node_network(name)
        .await?
        .into_iter()
        .find_map(|interface| interface.address.filter(|address| !address.is_empty()))
        .ok_or_else(|| Error::NotFound(format!("network address of node {name}")))?;

    Ok(NodeModel::new(node, network_address))
}
