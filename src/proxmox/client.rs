use crate::config::Config;
use crate::prelude::{Error, ProxmoxError, Result};
use crate::proxmox::Proxmox;
use crate::proxmox::types::*;
use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Concrete implementation of the `Proxmox` trait using `reqwest` crate.
///
/// Translates the abstract operations defined in the `Proxmox` trait into
/// actual HTTP API calls and manages the state required to communicate with a
/// Proxmox VE server.
///
pub struct ProxmoxClient {
    client: OnceCell<Client>,
    url: String,
    auth_header: SecretString,
    verify_tls: bool,
}

impl ProxmoxClient {
    /// Creates a new instance of the Proxmox client.
    ///
    /// # Arguments
    ///
    /// * `url`: URL of the Proxmox API, including the `/api2/json` suffix.
    /// * `auth_header`: The full, pre-formatted authorization header string.
    /// * `verify_tls`: Whether the server certificate must be trusted. Proxmox
    ///   ships with a self-signed certificate, so this is often disabled.
    ///
    pub fn new(url: String, auth_header: SecretString, verify_tls: bool) -> Self {
        Self {
            client: OnceCell::new(),
            url,
            auth_header,
            verify_tls,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_url(), config.auth_header(), config.verify_tls)
    }

    /// Lazily initializes and returns a reference to the `reqwest::Client`.
    ///
    /// If the client has not been initialized yet, it will be built on the
    /// first call with default headers (including Authorization). Subsequent
    /// calls will return the existing client.
    ///
    async fn get_client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let mut auth_header = HeaderValue::from_str(self.auth_header.expose_secret())?;
                auth_header.set_sensitive(true);

                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, auth_header);

                let mut builder = Client::builder().default_headers(headers).use_rustls_tls();
                if !self.verify_tls {
                    builder = builder
                        .danger_accept_invalid_certs(true)
                        .danger_accept_invalid_hostnames(true);
                }
                builder.build().map_err(Error::from)
            })
            .await
    }

    /// Generic helper method to perform a request to the Proxmox API.
    ///
    /// Handles client initialization, request building, sending the request,
    /// and processing the response.
    ///
    /// # Types
    ///
    /// * `B`: Type of the request body, which must be serializable. It is sent
    ///   form-encoded, the only body format Proxmox accepts.
    /// * `D`: Type of the response data, which must be deserializable.
    ///
    /// # Arguments
    ///
    /// * `method`: HTTP method to use for the request.
    /// * `path`: API endpoint path.
    /// * `body`: Optional request body.
    /// * `error_var`: Specific error to use if the API call fails.
    ///
    /// # Returns
    ///
    /// Deserialized data from the Proxmox API response.
    ///
    async fn make_request<B, D>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
        error_var: ProxmoxError,
    ) -> Result<D>
    where
        B: Serialize,
        for<'de> D: Deserialize<'de>,
    {
        let client = self.get_client().await?;
        let url = format!("{}{}", self.url, path);
        tracing::debug!(target: "proxmox", %method, %path, "Sending request");

        let mut request = client.request(method, &url);
        if let Some(body) = body {
            request = request.form(&body);
        }
        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<Response<D>>().await?.data),
            status => {
                let text = response.text().await?;
                tracing::debug!(target: "proxmox", %status, body = %text, "Request failed");
                Err(Error::Proxmox(error_var, status, text))
            }
        }
    }
}

fn vm_path(vm: &VmRef) -> String {
    format!("/nodes/{}/qemu/{}", vm.node, vm.id)
}

fn zone_path(zone: &str) -> String {
    format!(
        "/cluster/sdn/zones/{}",
        utf8_percent_encode(zone, NON_ALPHANUMERIC)
    )
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[async_trait]
impl Proxmox for ProxmoxClient {
    async fn list_nodes(&self) -> Result<Vec<NodeResponse>> {
        self.make_request(Method::GET, "/nodes", None::<()>, ProxmoxError::Nodes)
            .await
    }

    async fn node_network(&self, node: &str) -> Result<Vec<NodeNetworkInterface>> {
        let path = format!("/nodes/{node}/network");
        self.make_request(Method::GET, &path, None::<()>, ProxmoxError::Nodes)
            .await
    }

    async fn list_storage(&self, node: &str) -> Result<Vec<StorageResponse>> {
        let path = format!("/nodes/{node}/storage");
        self.make_request(Method::GET, &path, None::<()>, ProxmoxError::Storage)
            .await
    }

    async fn storage_content(&self, node: &str, storage: &str) -> Result<Vec<StorageContent>> {
        let path = format!("/nodes/{node}/storage/{storage}/content");
        self.make_request(Method::GET, &path, None::<()>, ProxmoxError::Storage)
            .await
    }

    async fn vm_config(&self, vm: &VmRef) -> Result<QemuConfig> {
        let path = format!("{}/config", vm_path(vm));
        self.make_request(Method::GET, &path, None::<()>, ProxmoxError::Config)
            .await
    }

    async fn vm_status(&self, vm: &VmRef) -> Result<Status> {
        let path = format!("{}/status/current", vm_path(vm));
        let payload: StatusPayload = self
            .make_request(Method::GET, &path, None::<()>, ProxmoxError::Status)
            .await?;
        Ok(payload.status)
    }

    async fn create_vm(&self, node: &str, params: Params) -> Result<UniqueProcessId> {
        let path = format!("/nodes/{node}/qemu");
        self.make_request(Method::POST, &path, Some(params), ProxmoxError::Create)
            .await
    }

    async fn update_vm_config(&self, vm: &VmRef, params: Params) -> Result<Option<UniqueProcessId>> {
        let path = format!("{}/config", vm_path(vm));
        self.make_request(Method::POST, &path, Some(params), ProxmoxError::Config)
            .await
    }

    async fn resize_disk(&self, vm: &VmRef, disk: &str, size: &str) -> Result<Option<UniqueProcessId>> {
        let path = format!("{}/resize", vm_path(vm));
        let body = params(&[("disk", disk), ("size", size)]);
        self.make_request(Method::PUT, &path, Some(body), ProxmoxError::Resize)
            .await
    }

    async fn move_disk(&self, vm: &VmRef, disk: &str, storage: &str) -> Result<UniqueProcessId> {
        let path = format!("{}/move_disk", vm_path(vm));
        let body = params(&[("disk", disk), ("storage", storage), ("delete", "1")]);
        self.make_request(Method::POST, &path, Some(body), ProxmoxError::MoveDisk)
            .await
    }

    async fn start(&self, vm: &VmRef) -> Result<UniqueProcessId> {
        let path = format!("{}/status/start", vm_path(vm));
        self.make_request(Method::POST, &path, None::<()>, ProxmoxError::Start)
            .await
    }

    async fn shutdown(&self, vm: &VmRef) -> Result<UniqueProcessId> {
        let path = format!("{}/status/shutdown", vm_path(vm));
        self.make_request(Method::POST, &path, None::<()>, ProxmoxError::Shutdown)
            .await
    }

    async fn migrate(&self, vm: &VmRef, target: &str, online: bool) -> Result<UniqueProcessId> {
        let path = format!("{}/migrate", vm_path(vm));
        let online = if online { "1" } else { "0" };
        let body = params(&[("target", target), ("online", online)]);
        self.make_request(Method::POST, &path, Some(body), ProxmoxError::Migrate)
            .await
    }

    async fn delete(&self, vm: &VmRef) -> Result<UniqueProcessId> {
        let path = format!("{}?destroy-unreferenced-disks=1&purge=1", vm_path(vm));
        self.make_request(Method::DELETE, &path, None::<()>, ProxmoxError::Delete)
            .await
    }

    async fn task_status(&self, task: &TaskRef) -> Result<TaskStatus> {
        let path = format!("/nodes/{}/tasks/{}/status", task.node, task.upid.encoded());
        let data: TaskResponse = self
            .make_request(Method::GET, &path, None::<()>, ProxmoxError::Status)
            .await?;
        Ok(match (data.status, data.exit_status) {
            (Status::Running, _) => TaskStatus::Pending,
            (Status::Stopped, Some(exit_status)) if exit_status == "OK" => TaskStatus::Completed,
            (Status::Stopped, exit_status) => TaskStatus::Failed {
                task_type: data.task_type,
                exit_status: exit_status.unwrap_or_else(|| "unknown".to_owned()),
            },
        })
    }

    async fn create_sdn_zone(&self, params: Params) -> Result<()> {
        self.make_request(
            Method::POST,
            "/cluster/sdn/zones",
            Some(params),
            ProxmoxError::Sdn,
        )
        .await
    }

    async fn sdn_zone(&self, zone: &str) -> Result<SdnZoneResponse> {
        self.make_request(Method::GET, &zone_path(zone), None::<()>, ProxmoxError::Sdn)
            .await
    }

    async fn update_sdn_zone(&self, zone: &str, params: Params) -> Result<()> {
        self.make_request(Method::PUT, &zone_path(zone), Some(params), ProxmoxError::Sdn)
            .await
    }

    async fn delete_sdn_zone(&self, zone: &str) -> Result<()> {
        self.make_request(Method::DELETE, &zone_path(zone), None::<()>, ProxmoxError::Sdn)
            .await
    }
}
