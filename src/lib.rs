pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod proxmox;
pub mod services;
pub mod state;
pub mod telemetry;

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::state::AppState;

    pub use crate::error::ProxmoxError;
    pub use crate::proxmox::Proxmox;
}
