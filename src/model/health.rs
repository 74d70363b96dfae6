use serde::{Deserialize, Serialize};

/// Health check of a systemd unit, evaluated from a Prometheus style metrics
/// endpoint (node exporter with the systemd collector).
///
/// # Fields
///
/// * `address`: Host or IP of the exporter.
/// * `path`: Path of the metrics page, e.g. `metrics`.
/// * `tls_enabled`: Use `https` instead of `http`.
/// * `service_name`: systemd unit to look for, e.g. `nginx.service`.
/// * `custom_port`: Exporter port, `80` when not set.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckSystemd {
    pub address: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub tls_enabled: bool,
    pub service_name: String,
    #[serde(default)]
    pub custom_port: Option<u16>,
}

impl HealthCheckSystemd {
    pub fn url(&self) -> String {
        let protocol = if self.tls_enabled { "https" } else { "http" };
        let path = self.path.as_deref().unwrap_or_default();
        format!(
            "{}://{}:{}/{}",
            protocol,
            self.address,
            self.custom_port.unwrap_or(80),
            path.strip_prefix('/').unwrap_or(path)
        )
    }
}
