use derive_more::Display;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Defines the provider's custom error types.
///
/// Every variant is surfaced to the user as a diagnostic: a short headline
/// from [`Error::summary`] and the detail from the `Display` implementation.
///
#[derive(Debug, Error)]
pub enum Error {
    #[error("Error: {0}")]
    Any(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid value for '{0}': {1}")]
    Validation(String, String),
    #[error("Cannot reduce the size of an existing volume {slot}: {planned} < {current}")]
    DiskShrink {
        slot: String,
        planned: String,
        current: String,
    },
    #[error(
        "proxmox failed to complete {task_type} task ({exit_status}), please check logs in the proxmox console for more details"
    )]
    Task {
        task_type: String,
        exit_status: String,
    },
    #[error("The service {0} failed to start, see system logs on the machine for more details")]
    ServiceFailed(String),
    #[error("Unexpected VM state: expected '{expected}', got '{actual}'")]
    PowerState { expected: String, actual: String },
    #[error("Timeout after: {0} seconds")]
    Timeout(f32),
    #[error("Proxmox API error: {0} failed: status {1}, body: {2}")]
    Proxmox(ProxmoxError, reqwest::StatusCode, String),

    #[error("Environment error: {0}")]
    Environment(#[from] dotenv::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Failed to set logger: {0}")]
    Logger(#[from] tracing_log::log::SetLoggerError),
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tracing::dispatcher::SetGlobalDefaultError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

impl Error {
    /// Short, user-facing headline of the diagnostic.
    ///
    pub fn summary(&self) -> String {
        match self {
            Error::NotFound(_) => "Resource could not be found".to_owned(),
            Error::Validation(attribute, _) => format!("Invalid '{attribute}' attribute"),
            Error::DiskShrink { .. } => "Cannot reduce the size of an existing volume".to_owned(),
            Error::Task { task_type, .. } => format!("Proxmox task '{task_type}' failed"),
            Error::ServiceFailed(service) => format!("Service '{service}' is not healthy"),
            Error::PowerState { .. } => "VM did not reach the requested power state".to_owned(),
            Error::Timeout(_) => "Timed out waiting for Proxmox task".to_owned(),
            Error::Proxmox(operation, _, _) => format!("Proxmox '{operation}' request failed"),
            Error::Config(_) | Error::Environment(_) => {
                "Provider configuration error".to_owned()
            }
            _ => "Provider error".to_owned(),
        }
    }

    /// Whether the error is the Proxmox answer for a VM that does not live on
    /// the requested node.
    ///
    pub fn is_missing_vm_config(&self) -> bool {
        matches!(
            self,
            Error::Proxmox(_, _, body) if body.contains("Configuration file") && body.contains("does not exist")
        )
    }

    /// Whether Proxmox reported the requested object as absent.
    ///
    pub fn is_missing(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Proxmox(_, status, body) => {
                *status == reqwest::StatusCode::NOT_FOUND || body.contains("does not exist")
            }
            _ => false,
        }
    }
}

/// Represents errors related to Proxmox API operations.
///
#[derive(Debug, Display, Clone, Copy, PartialEq)]
pub enum ProxmoxError {
    Start,
    Shutdown,
    Create,
    Config,
    Resize,
    MoveDisk,
    Migrate,
    Delete,
    Status,
    Nodes,
    Storage,
    Sdn,
}
