use crate::model::vm::VmModel;
use crate::prelude::{AppState, Error, Result};
use crate::proxmox::types::{QemuConfig, Status, TaskRef, VmRef};
use crate::services::disk::{DiskChanges, apply_disk_changes, plan_disk_changes, resize_disk};
use crate::services::task::{wait_for, wait_until_finish};

/// Creates a new VM from the plan and returns its state as read back from
/// Proxmox.
///
/// Disks are created in the same request. Imported disks come out with the
/// size of their image, so they are resized to the declared size afterwards.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, plan), fields(vm_id = plan.vm_id))]
pub async fn create(app_state: &AppState, plan: &VmModel) -> Result<VmModel> {
    plan.validate()?;
    let node = plan.node()?;

    let upid = app_state.proxmox.create_vm(node, plan.to_params(true)?).await?;
    wait_until_finish(&app_state.proxmox, TaskRef::new(node, &upid), &app_state.polling).await?;
    tracing::info!(target: "service", vm_id = plan.vm_id, %node, "VM created");

    let vm = VmRef::new(node, plan.vm_id);
    for disk in plan.disks.iter().filter(|disk| disk.import_source().is_some()) {
        resize_disk(app_state, &vm, disk).await?;
    }

    if let Some(target) = plan.power_state {
        match_power_state(app_state, &vm, target).await?;
    }

    read(app_state, plan).await
}

/// Creates the VM when no node of the cluster holds it, updates it otherwise.
///
pub async fn apply(app_state: &AppState, plan: &VmModel, prior: Option<&VmModel>) -> Result<VmModel> {
    let node = prior
        .and_then(|prior| prior.node_name.as_deref())
        .or(plan.node_name.as_deref());

    match locate(app_state, plan.vm_id, node).await {
        Ok(_) => update(app_state, plan, prior).await,
        Err(Error::NotFound(_)) => create(app_state, plan).await,
        Err(error) => Err(error),
    }
}

/// Reads the current state of a VM.
///
/// When the node of `state` does not hold the VM, every node of the cluster
/// is searched. Values Proxmox does not report are carried from `state`.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, state), fields(vm_id = state.vm_id))]
pub async fn read(app_state: &AppState, state: &VmModel) -> Result<VmModel> {
    let (vm, config) = locate(app_state, state.vm_id, state.node_name.as_deref()).await?;
    read_model(app_state, &vm, &config, Some(state)).await
}

/// Brings an existing VM to the plan.
///
/// # Arguments
///
/// * `app_state`: Proxmox client and polling settings.
/// * `plan`: Desired VM.
/// * `prior`: Last known state, if any. Supplies the node to look on first
///   and the import sources of the current disks.
///
/// # Returns
///
/// The state read back after every change is applied.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, plan, prior), fields(vm_id = plan.vm_id))]
pub async fn update(app_state: &AppState, plan: &VmModel, prior: Option<&VmModel>) -> Result<VmModel> {
    plan.validate()?;
    let planned_node = plan.node()?;
    let known_node = prior
        .and_then(|prior| prior.node_name.as_deref())
        .unwrap_or(planned_node);

    let (mut vm, config) = locate(app_state, plan.vm_id, Some(known_node)).await?;
    let current = VmModel::from_config(vm.id, &vm.node, &config, Some(prior.unwrap_or(plan)))?;

    // Rejects shrinking before anything is touched.
    let changes = plan_disk_changes(&current.disks, &plan.disks)?;

    let initial_status = app_state.proxmox.vm_status(&vm).await?;

    if vm.node != planned_node {
        let online = initial_status == Status::Running;
        let upid = app_state.proxmox.migrate(&vm, planned_node, online).await?;
        wait_until_finish(&app_state.proxmox, TaskRef::new(&vm.node, &upid), &app_state.polling).await?;
        tracing::info!(target: "service", from = %vm.node, to = %planned_node, online, "VM migrated");
        vm = VmRef::new(planned_node, vm.id);
    }

    if changes.requires_shutdown() && initial_status == Status::Running {
        shutdown(app_state, &vm).await?;
    }

    let upid = app_state.proxmox.update_vm_config(&vm, plan.to_params(false)?).await?;
    wait_for(&app_state.proxmox, &vm.node, upid, &app_state.polling).await?;
    tracing::info!(target: "service", %vm, "VM configuration updated");

    apply_disk_changes(app_state, &vm, &changes).await?;

    let target = plan.power_state.unwrap_or(initial_status);
    match_power_state(app_state, &vm, target).await?;

    read(app_state, plan).await
}

/// Stops the VM if needed and destroys it together with its disks.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, state), fields(vm_id = state.vm_id))]
pub async fn delete(app_state: &AppState, state: &VmModel) -> Result<()> {
    let (vm, _) = locate(app_state, state.vm_id, state.node_name.as_deref()).await?;

    if app_state.proxmox.vm_status(&vm).await? != Status::Stopped {
        shutdown(app_state, &vm).await?;
    }

    let upid = app_state.proxmox.delete(&vm).await?;
    wait_until_finish(&app_state.proxmox, TaskRef::new(&vm.node, &upid), &app_state.polling).await?;
    tracing::info!(target: "service", %vm, "VM deleted");

    Ok(())
}

/// Reads an existing VM that is not managed yet, searching the whole cluster.
///
pub async fn import(app_state: &AppState, vm_id: &str) -> Result<VmModel> {
    let vm_id = vm_id.trim().parse::<u32>().map_err(|_| {
        Error::Validation("vm_id".to_owned(), format!("'{vm_id}' is not a numeric VM id"))
    })?;

    let (vm, config) = locate(app_state, vm_id, None).await?;
    read_model(app_state, &vm, &config, None).await
}

/// Computes the disk changes an update would apply, without changing
/// anything.
///
pub async fn plan_changes(app_state: &AppState, plan: &VmModel, prior: Option<&VmModel>) -> Result<DiskChanges> {
    plan.validate()?;
    let node = prior
        .and_then(|prior| prior.node_name.as_deref())
        .or(plan.node_name.as_deref());

    let (vm, config) = locate(app_state, plan.vm_id, node).await?;
    let current = VmModel::from_config(vm.id, &vm.node, &config, Some(prior.unwrap_or(plan)))?;

    plan_disk_changes(&current.disks, &plan.disks)
}

/// Finds the node a VM lives on and returns it with the VM config.
///
/// `node` is tried first. A "configuration file does not exist" answer means
/// the VM is not on that node, in which case the remaining nodes are tried.
///
pub async fn locate(app_state: &AppState, vm_id: u32, node: Option<&str>) -> Result<(VmRef, QemuConfig)> {
    if let Some(node) = node.filter(|node| !node.is_empty()) {
        let vm = VmRef::new(node, vm_id);
        match app_state.proxmox.vm_config(&vm).await {
            Ok(config) => return Ok((vm, config)),
            Err(error) if error.is_missing_vm_config() => {
                tracing::debug!(target: "service", %node, vm_id, "VM not on expected node, searching cluster");
            }
            Err(error) => return Err(error),
        }
    }

    for candidate in app_state.proxmox.list_nodes().await? {
        if Some(candidate.node.as_str()) == node {
            continue;
        }
        let vm = VmRef::new(&candidate.node, vm_id);
        match app_state.proxmox.vm_config(&vm).await {
            Ok(config) => return Ok((vm, config)),
            Err(error) if error.is_missing_vm_config() => continue,
            Err(error) => return Err(error),
        }
    }

    Err(Error::NotFound(format!("VM {vm_id} on any node of the cluster")))
}

/// Starts the VM and checks that it reports `running`.
///
pub async fn start(app_state: &AppState, vm: &VmRef) -> Result<()> {
    let upid = app_state.proxmox.start(vm).await?;
    wait_until_finish(&app_state.proxmox, TaskRef::new(&vm.node, &upid), &app_state.polling).await?;
    expect_status(app_state, vm, Status::Running).await?;
    tracing::info!(target: "service", %vm, "VM started");
    Ok(())
}

/// Shuts the VM down through ACPI and checks that it reports `stopped`.
///
pub async fn shutdown(app_state: &AppState, vm: &VmRef) -> Result<()> {
    let upid = app_state.proxmox.shutdown(vm).await?;
    wait_until_finish(&app_state.proxmox, TaskRef::new(&vm.node, &upid), &app_state.polling).await?;
    expect_status(app_state, vm, Status::Stopped).await?;
    tracing::info!(target: "service", %vm, "VM shut down");
    Ok(())
}

/// Starts or shuts down the VM unless it already is in `target` state.
///
pub async fn match_power_state(app_state: &AppState, vm: &VmRef, target: Status) -> Result<()> {
    let status = app_state.proxmox.vm_status(vm).await?;
    match (target, status) {
        (Status::Running, Status::Stopped) => start(app_state, vm).await,
        (Status::Stopped, Status::Running) => shutdown(app_state, vm).await,
        _ => Ok(()),
    }
}

async fn expect_status(app_state: &AppState, vm: &VmRef, expected: Status) -> Result<()> {
    let actual = app_state.proxmox.vm_status(vm).await?;
    if actual != expected {
        return Err(Error::PowerState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

async fn read_model(
    app_state: &AppState,
    vm: &VmRef,
    config: &QemuConfig,
    prior: Option<&VmModel>,
) -> Result<VmModel> {
    let mut model = VmModel::from_config(vm.id, &vm.node, config, prior)?;
    model.power_state = Some(app_state.proxmox.vm_status(vm).await?);
    Ok(model)
}
