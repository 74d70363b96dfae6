use crate::prelude::{Error, Proxmox, Result};
use crate::proxmox::types::{TaskRef, TaskStatus, UniqueProcessId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How Proxmox tasks are polled.
///
/// # Fields
///
/// * `interval`: Pause between two status requests.
/// * `timeout`: Total time to wait before giving up. Without one, the task is
///   polled until Proxmox reports it stopped.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskPolling {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl TaskPolling {
    pub fn new(interval_secs: u64, timeout_secs: Option<u64>) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }
}

impl Default for TaskPolling {
    fn default() -> Self {
        Self::new(3, None)
    }
}

/// Polls a Proxmox task until it is complete.
///
/// # Arguments
///
/// * `proxmox_client`: Client for interacting with the Proxmox API.
/// * `task`: Proxmox task to monitor.
/// * `polling`: Interval between polling attempts and optional timeout.
///
/// # Returns
///
/// An empty `Result` on success, `Error::Task` when the task stopped with an
/// exit status other than `OK`.
///
#[tracing::instrument(level = "debug", target = "service", skip(proxmox_client), fields(node = %task.node, upid = %task.upid.as_str()))]
pub async fn wait_until_finish(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    task: TaskRef,
    polling: &TaskPolling,
) -> Result<()> {
    let start = Instant::now();

    loop {
        let elapsed = start.elapsed();
        if polling.timeout.is_some_and(|timeout| elapsed > timeout) {
            return Err(Error::Timeout(elapsed.as_secs_f32()));
        }

        match proxmox_client.task_status(&task).await? {
            TaskStatus::Pending => tokio::time::sleep(polling.interval).await,
            TaskStatus::Completed => break,
            TaskStatus::Failed {
                task_type,
                exit_status,
            } => {
                tracing::error!(target: "service", %task_type, %exit_status, "Proxmox task failed");
                return Err(Error::Task {
                    task_type,
                    exit_status,
                });
            }
        }
    }

    Ok(())
}

/// Waits for the task a request started, if it started one.
///
/// Some endpoints apply their change synchronously and answer with `null`.
///
pub async fn wait_for(
    proxmox_client: &Arc<dyn Proxmox + Send + Sync>,
    node: &str,
    upid: Option<UniqueProcessId>,
    polling: &TaskPolling,
) -> Result<()> {
    match upid {
        Some(upid) => wait_until_finish(proxmox_client, TaskRef::new(node, &upid), polling).await,
        None => Ok(()),
    }
}
