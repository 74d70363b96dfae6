use crate::prelude::{Error, Result};
use crate::services::task::TaskPolling;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Represents the provider block: where the Proxmox API lives and how to
/// authenticate against it.
///
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<SecretString>,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
}

fn default_verify_tls() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    3
}

impl Config {
    /// Loads the configuration from an optional YAML/JSON file and the
    /// `PROXMOX_*` environment variables. Environment values win.
    ///
    pub fn load(file: Option<&Path>) -> Result<Self> {
        load_env_file(dotenv::dotenv())?;

        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("PROXMOX").try_parsing(true))
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        tracing::info!(target: "config", ?config, "Configuration loaded.");

        Ok(config)
    }

    /// Builds a configuration directly from the provider attributes.
    ///
    pub fn new(host: &str, username: &str, password: &str, verify_tls: bool) -> Result<Self> {
        let config = Self {
            host: Some(host.to_owned()),
            username: Some(username.to_owned()),
            password: Some(password.into()),
            verify_tls,
            poll_interval_secs: default_poll_interval(),
            task_timeout_secs: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Overrides task polling, mostly useful for tests against a mock API.
    ///
    pub fn with_polling(mut self, poll_interval_secs: u64, task_timeout_secs: Option<u64>) -> Self {
        self.poll_interval_secs = poll_interval_secs;
        self.task_timeout_secs = task_timeout_secs;
        self
    }

    fn validate(&self) -> Result<()> {
        let missing = |attribute: &str, env: &str| {
            Error::Validation(
                attribute.to_owned(),
                format!(
                    "The provider cannot create the proxmox API client as there is a missing or empty value for the proxmox API {attribute}. \
                     Set the {attribute} value in the configuration or use the {env} environment variable."
                ),
            )
        };

        if self.host.as_deref().is_none_or(str::is_empty) {
            return Err(missing("host", "PROXMOX_HOST"));
        }
        if self.username.as_deref().is_none_or(str::is_empty) {
            return Err(missing("username", "PROXMOX_USERNAME"));
        }
        if self
            .password
            .as_ref()
            .is_none_or(|password| password.expose_secret().is_empty())
        {
            return Err(missing("password", "PROXMOX_PASSWORD"));
        }
        Ok(())
    }

    /// Base URL of the JSON API, e.g. `https://pve.local:8006/api2/json`.
    ///
    pub fn api_url(&self) -> String {
        let host = self.host.as_deref().unwrap_or_default().trim_end_matches('/');
        if host.contains("https") {
            format!("{host}/api2/json")
        } else {
            format!("https://{host}/api2/json")
        }
    }

    /// Pre-formatted `Authorization` header value for API tokens.
    ///
    pub fn auth_header(&self) -> SecretString {
        let username = self.username.as_deref().unwrap_or_default();
        let password = self
            .password
            .as_ref()
            .map(|password| password.expose_secret().to_owned())
            .unwrap_or_default();
        format!("PVEAPIToken={username}={password}").into()
    }

    pub fn polling(&self) -> TaskPolling {
        TaskPolling::new(self.poll_interval_secs, self.task_timeout_secs)
    }
}

/// A missing `.env` is fine, an unreadable or malformed one is not.
///
fn load_env_file(loaded: dotenv::Result<PathBuf>) -> Result<()> {
    match loaded {
        Ok(path) => tracing::info!(target: "config", path = %path.display(), ".env loaded."),
        Err(error) if error.not_found() => tracing::debug!(target: "config", "No .env file."),
        Err(error) => return Err(error.into()),
    }
    Ok(())
}
