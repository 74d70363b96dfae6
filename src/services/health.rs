use crate::model::health::HealthCheckSystemd;
use crate::prelude::{Error, Result};
use crate::services::task::TaskPolling;
use reqwest::Client;
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State of a systemd unit as reported by its metrics.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceHealth {
    Active,
    Failed,
    /// The unit is known but neither active nor failed yet.
    Pending,
}

/// Waits until the systemd unit of `health_check` is active.
///
/// The metrics page is fetched again after every `polling.interval` while the
/// unit is still starting.
///
/// # Returns
///
/// An empty `Result` once the unit is active, `Error::ServiceFailed` if it
/// failed, `Error::NotFound` if the metrics do not mention it.
///
#[tracing::instrument(level = "debug", target = "service", skip(polling), fields(url = %health_check.url()))]
pub async fn check(health_check: &HealthCheckSystemd, polling: &TaskPolling) -> Result<()> {
    let client = Client::builder()
        .use_rustls_tls()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let start = Instant::now();

    loop {
        let elapsed = start.elapsed();
        if polling.timeout.is_some_and(|timeout| elapsed > timeout) {
            return Err(Error::Timeout(elapsed.as_secs_f32()));
        }

        let metrics = client
            .get(health_check.url())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match evaluate(&metrics, &health_check.service_name)? {
            ServiceHealth::Active => {
                tracing::info!(target: "service", service = %health_check.service_name, "Service is active");
                return Ok(());
            }
            ServiceHealth::Failed => return Err(Error::ServiceFailed(health_check.service_name.clone())),
            ServiceHealth::Pending => {
                tracing::debug!(target: "service", service = %health_check.service_name, "Service not active yet");
                tokio::time::sleep(polling.interval).await;
            }
        }
    }
}

/// Reads the state of `service` from node exporter metrics.
///
/// Only samples of the systemd collector whose `name` label is the service
/// count, e.g. `node_systemd_unit_state{name="nginx.service",state="active"} 1`.
/// The `.service` suffix may be left out of `service`.
///
pub fn evaluate(metrics: &str, service: &str) -> Result<ServiceHealth> {
    let unit = format!("{service}.service");
    let samples: Vec<(&str, &str)> = metrics
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && line.contains("systemd"))
        .filter_map(|line| line.rsplit_once('}'))
        .filter(|(labels, _)| label(labels, "name").is_some_and(|name| name == service || name == unit))
        .collect();

    if samples.is_empty() {
        return Err(Error::NotFound(format!(
            "service {service} in the systemd metrics, check the server configuration"
        )));
    }

    for (labels, value) in samples {
        tracing::debug!(target: "service", %labels, %value, "systemd metric");
        if value.trim() != "1" {
            continue;
        }

        let state = label(labels, "state");
        let failed = state.map_or_else(|| labels.contains("failed"), |state| state == "failed");
        let active = state.map_or_else(|| labels.contains("active"), |state| state == "active");

        if failed {
            return Ok(ServiceHealth::Failed);
        }
        if active {
            return Ok(ServiceHealth::Active);
        }
    }

    Ok(ServiceHealth::Pending)
}

fn label<'a>(labels: &'a str, name: &str) -> Option<&'a str> {
    let (_, labels) = labels.split_once('{')?;
    labels
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}
