use crate::prelude::{Error, Result};
use crate::proxmox::types::{Params, SdnZoneResponse};
use serde::{Deserialize, Serialize};

/// A software-defined-network zone.
///
/// # Fields
///
/// * `zone`: Zone identifier, also the key of the resource.
/// * `kind`: Zone plugin, e.g. `simple`, `vlan`, `vxlan` or `evpn`.
/// * `ipam`: IP address management backend, `pve` unless told otherwise.
/// * `nodes`: Nodes the zone is deployed on.
/// * `peers`: Peer addresses, used by `vxlan` zones.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdnZone {
    pub zone: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_ipam")]
    pub ipam: String,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub peers: Vec<String>,
}

fn default_ipam() -> String {
    "pve".to_owned()
}

impl SdnZone {
    pub fn validate(&self) -> Result<()> {
        if self.zone.is_empty() || !self.zone.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Validation(
                "zone".to_owned(),
                format!("'{}' must be a non-empty alphanumeric identifier", self.zone),
            ));
        }
        if self.kind.is_empty() {
            return Err(Error::Validation("type".to_owned(), "a zone type is required".to_owned()));
        }
        Ok(())
    }

    /// Form parameters of `POST /cluster/sdn/zones`.
    ///
    pub fn to_create_params(&self) -> Params {
        let mut params = vec![
            ("type".to_owned(), self.kind.clone()),
            ("zone".to_owned(), self.zone.clone()),
            ("ipam".to_owned(), self.ipam.clone()),
        ];
        if !self.peers.is_empty() {
            params.push(("peers".to_owned(), self.peers.join(",")));
        }
        if !self.nodes.is_empty() {
            params.push(("nodes".to_owned(), self.nodes.join(",")));
        }
        params
    }

    /// Form parameters of `PUT /cluster/sdn/zones/{zone}`.
    ///
    /// The zone type cannot change, and emptied lists have to be deleted
    /// explicitly or Proxmox keeps the old values.
    ///
    pub fn to_update_params(&self) -> Params {
        let mut params = vec![("ipam".to_owned(), self.ipam.clone())];
        let mut deleted = Vec::new();
        for (key, values) in [("peers", &self.peers), ("nodes", &self.nodes)] {
            if values.is_empty() {
                deleted.push(key);
            } else {
                params.push((key.to_owned(), values.join(",")));
            }
        }
        if !deleted.is_empty() {
            params.push(("delete".to_owned(), deleted.join(",")));
        }
        params
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

impl From<SdnZoneResponse> for SdnZone {
    fn from(response: SdnZoneResponse) -> Self {
        Self {
            nodes: split_list(response.nodes.as_deref()),
            peers: split_list(response.peers.as_deref()),
            ipam: response
                .ipam
                .filter(|ipam| !ipam.is_empty())
                .unwrap_or_else(default_ipam),
            zone: response.zone,
            kind: response.kind,
        }
    }
}
