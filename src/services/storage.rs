use crate::model::image::{self, QemuImage};
use crate::prelude::{AppState, Error, Result};

/// Finds the newest version of an uploaded QEMU image.
///
/// # Arguments
///
/// * `app_state`: Proxmox client.
/// * `storage`: Storage holding the image in its `import` content.
/// * `name`: Image name without version, e.g. `debian`.
///
/// # Returns
///
/// The image with the highest semantic version, `Error::NotFound` if the
/// storage holds none.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state))]
pub async fn latest_image(app_state: &AppState, storage: &str, name: &str) -> Result<QemuImage> {
    let node = node_with_storage(app_state, storage).await?;

    let images = app_state
        .proxmox
        .storage_content(&node, storage)
        .await?
        .into_iter()
        .filter(|content| content.content == "import")
        .filter_map(|content| QemuImage::from_volume(storage, name, &content.volid))
        .collect::<Vec<_>>();
    tracing::debug!(target: "service", %node, count = images.len(), "Images found");

    image::latest(images).ok_or_else(|| Error::NotFound(format!("image {name} on storage {storage}")))
}

/// First node that carries `storage`.
///
/// A node that fails to list its storage is skipped as long as others are
/// left to try.
///
async fn node_with_storage(app_state: &AppState, storage: &str) -> Result<String> {
    let nodes = app_state.proxmox.list_nodes().await?;
    let several = nodes.len() > 1;

    for node in nodes {
        let storages = match app_state.proxmox.list_storage(&node.node).await {
            Ok(storages) => storages,
            Err(error) if several => {
                tracing::warn!(target: "service", node = %node.node, %error, "Failed to list storage, skipping node");
                continue;
            }
            Err(error) => return Err(error),
        };
        if storages.iter().any(|candidate| candidate.storage == storage) {
            return Ok(node.node);
        }
    }

    Err(Error::NotFound(format!("storage {storage} on any node")))
}
