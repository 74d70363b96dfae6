use crate::config::Config;
use crate::model::health::HealthCheckSystemd;
use crate::model::sdn::SdnZone;
use crate::model::vm::VmModel;
use crate::prelude::{AppState, Result};
use crate::services::task::TaskPolling;
use crate::services::{health, node, sdn, storage, vm};
use crate::telemetry::LogFormat;
use clap::{ArgAction, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "provisioner",
    version,
    about = "Declarative provisioning of Proxmox VE virtual machines and SDN zones"
)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Provider configuration file (YAML or JSON)",
        env = "PROXMOX_CONFIG"
    )]
    pub config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormat::Text,
        help = "Log line format",
        env = "PROXMOX_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage a QEMU virtual machine.
    #[command(subcommand)]
    Vm(VmCommand),
    /// Manage an SDN zone.
    #[command(subcommand)]
    Zone(ZoneCommand),
    /// Look a cluster node up by name.
    Node {
        #[arg(help = "Node name")]
        name: String,
    },
    /// Find the newest version of an uploaded QEMU image.
    Image {
        #[arg(short, long, help = "Storage holding the image")]
        storage: String,
        #[arg(short, long, help = "Image name without version")]
        name: String,
    },
    /// Wait for a systemd unit to become active, based on node exporter metrics.
    Health {
        #[arg(long, help = "Host or IP of the exporter")]
        address: String,
        #[arg(long, help = "Path of the metrics page")]
        path: Option<String>,
        #[arg(long, help = "Use https")]
        tls: bool,
        #[arg(long, help = "Exporter port, 80 when not set")]
        port: Option<u16>,
        #[arg(long, help = "systemd unit, e.g. nginx.service")]
        service: String,
        #[arg(long, help = "Give up after this many seconds")]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum VmCommand {
    /// Create the VM or bring it to the plan.
    Apply {
        plan: PathBuf,
        #[arg(long, help = "Last known state of the VM")]
        state: Option<PathBuf>,
    },
    Read {
        state: PathBuf,
    },
    Delete {
        state: PathBuf,
    },
    Import {
        vm_id: String,
    },
    /// Print the disk changes an apply would make, without making them.
    Plan {
        plan: PathBuf,
        #[arg(long, help = "Last known state of the VM")]
        state: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ZoneCommand {
    /// Create the zone or bring it to the plan.
    Apply { plan: PathBuf },
    Read { zone: String },
    Delete { zone: String },
    Import { zone: String },
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Runs the command and returns the document to print.
    ///
    pub async fn run(self) -> Result<Value> {
        let config = self.config;
        let app_state = || -> Result<AppState> { Ok(AppState::new(&Config::load(config.as_deref())?)) };

        let output = match self.command {
            Command::Vm(VmCommand::Apply { plan, state }) => {
                let plan: VmModel = load_document(&plan)?;
                let prior = state.as_deref().map(load_document::<VmModel>).transpose()?;
                serde_json::to_value(vm::apply(&app_state()?, &plan, prior.as_ref()).await?)?
            }
            Command::Vm(VmCommand::Read { state }) => {
                let state: VmModel = load_document(&state)?;
                serde_json::to_value(vm::read(&app_state()?, &state).await?)?
            }
            Command::Vm(VmCommand::Delete { state }) => {
                let state: VmModel = load_document(&state)?;
                vm::delete(&app_state()?, &state).await?;
                json!({ "deleted": state.vm_id })
            }
            Command::Vm(VmCommand::Import { vm_id }) => {
                serde_json::to_value(vm::import(&app_state()?, &vm_id).await?)?
            }
            Command::Vm(VmCommand::Plan { plan, state }) => {
                let plan: VmModel = load_document(&plan)?;
                let prior = state.as_deref().map(load_document::<VmModel>).transpose()?;
                serde_json::to_value(vm::plan_changes(&app_state()?, &plan, prior.as_ref()).await?)?
            }
            Command::Zone(ZoneCommand::Apply { plan }) => {
                let plan: SdnZone = load_document(&plan)?;
                serde_json::to_value(sdn::apply(&app_state()?, &plan).await?)?
            }
            Command::Zone(ZoneCommand::Read { zone }) => {
                serde_json::to_value(sdn::read(&app_state()?, &zone).await?)?
            }
            Command::Zone(ZoneCommand::Delete { zone }) => {
                sdn::delete(&app_state()?, &zone).await?;
                json!({ "deleted": zone })
            }
            Command::Zone(ZoneCommand::Import { zone }) => {
                serde_json::to_value(sdn::import(&app_state()?, &zone).await?)?
            }
            Command::Node { name } => serde_json::to_value(node::read(&app_state()?, &name).await?)?,
            Command::Image { storage: storage_name, name } => {
                serde_json::to_value(storage::latest_image(&app_state()?, &storage_name, &name).await?)?
            }
            Command::Health {
                address,
                path,
                tls,
                port,
                service,
                timeout,
            } => {
                let check = HealthCheckSystemd {
                    address,
                    path,
                    tls_enabled: tls,
                    service_name: service,
                    custom_port: port,
                };
                let polling = TaskPolling {
                    timeout: timeout.map(std::time::Duration::from_secs),
                    ..TaskPolling::default()
                };
                health::check(&check, &polling).await?;
                serde_json::to_value(check)?
            }
        };

        Ok(output)
    }
}

/// Reads a YAML or JSON document, the format is picked from the extension.
///
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let document = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?
        .try_deserialize::<T>()?;
    tracing::debug!(target: "cli", path = %path.display(), "Document loaded.");
    Ok(document)
}
