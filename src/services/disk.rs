use crate::model::disk::VmDisk;
use crate::prelude::{AppState, Error, Result};
use crate::proxmox::types::{Params, VmRef};
use crate::services::task::wait_for;
use serde::Serialize;

/// A disk moving to another storage.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskMigration {
    pub disk: VmDisk,
    pub from_storage: String,
}

/// Work needed to bring the attached disks of a VM to the planned set.
///
/// Disks that need to be recreated, because their import source changed,
/// appear in both `to_remove` and `to_add`.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskChanges {
    pub to_remove: Vec<VmDisk>,
    pub to_add: Vec<VmDisk>,
    pub to_update: Vec<VmDisk>,
    pub to_migrate: Vec<DiskMigration>,
    pub to_resize: Vec<VmDisk>,
}

impl DiskChanges {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty()
            && self.to_add.is_empty()
            && self.to_update.is_empty()
            && self.to_migrate.is_empty()
            && self.to_resize.is_empty()
    }

    /// Attaching, detaching and reconfiguring drives needs a stopped VM.
    /// Resizes and storage moves work online.
    ///
    pub fn requires_shutdown(&self) -> bool {
        !self.to_remove.is_empty() || !self.to_add.is_empty() || !self.to_update.is_empty()
    }
}

/// Diffs the disks attached to a VM against the planned ones.
///
/// Disks are matched by slot (bus type and order). The diff is pure, so a
/// shrink is rejected before any request is sent.
///
/// # Arguments
///
/// * `current`: Disks reported by Proxmox.
/// * `planned`: Disks of the plan.
///
/// # Returns
///
/// The `DiskChanges`, or `Error::DiskShrink` if a planned size is smaller
/// than the current one.
///
pub fn plan_disk_changes(current: &[VmDisk], planned: &[VmDisk]) -> Result<DiskChanges> {
    let mut changes = DiskChanges::default();

    for existing in current {
        if !planned.iter().any(|disk| disk.identity() == existing.identity()) {
            changes.to_remove.push(existing.clone());
        }
    }

    for disk in planned {
        let Some(existing) = current.iter().find(|current| current.identity() == disk.identity()) else {
            changes.to_add.push(disk.clone());
            continue;
        };

        if !existing.same_import(disk) {
            changes.to_remove.push(existing.clone());
            changes.to_add.push(disk.clone());
            continue;
        }

        // Proxmox reports sizes in whatever unit fits, e.g. `2252M` after an
        // import, so sizes are compared in KiB.
        let planned_size = disk.size_kib()?;
        let current_size = existing.size_kib()?;
        if planned_size < current_size {
            return Err(Error::DiskShrink {
                slot: disk.slot(),
                planned: disk.size.clone(),
                current: existing.size.clone(),
            });
        }

        let attached = VmDisk {
            id: existing.id,
            volume: existing.volume.clone(),
            ..disk.clone()
        };

        // The volume keeps its location and size until the later migration
        // and resize steps.
        if !existing.same_options(disk) {
            changes.to_update.push(VmDisk {
                storage_location: existing.storage_location.clone(),
                size: existing.size.clone(),
                ..attached.clone()
            });
        }
        if existing.storage_location != disk.storage_location {
            changes.to_migrate.push(DiskMigration {
                disk: attached.clone(),
                from_storage: existing.storage_location.clone(),
            });
        }
        if planned_size > current_size {
            changes.to_resize.push(attached);
        }
    }

    Ok(changes)
}

/// Applies planned disk changes to a VM, in order: removals, additions,
/// updates, migrations and resizes. Every step waits for its Proxmox task.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, changes), fields(vm = %vm))]
pub async fn apply_disk_changes(app_state: &AppState, vm: &VmRef, changes: &DiskChanges) -> Result<()> {
    for disk in &changes.to_remove {
        remove_disk(app_state, vm, disk).await?;
    }

    if !changes.to_add.is_empty() {
        let params = changes
            .to_add
            .iter()
            .map(|disk| Ok((disk.slot(), disk.to_config(vm.id, true)?)))
            .collect::<Result<Params>>()?;
        update_config(app_state, vm, params).await?;
        tracing::info!(target: "service", count = changes.to_add.len(), "Disks attached");

        // Imported disks take the size of their image.
        for disk in changes.to_add.iter().filter(|disk| disk.import_source().is_some()) {
            resize_disk(app_state, vm, disk).await?;
        }
    }

    if !changes.to_update.is_empty() {
        let params = changes
            .to_update
            .iter()
            .map(|disk| Ok((disk.slot(), disk.to_config(vm.id, false)?)))
            .collect::<Result<Params>>()?;
        update_config(app_state, vm, params).await?;
        tracing::info!(target: "service", count = changes.to_update.len(), "Disks updated");
    }

    for migration in &changes.to_migrate {
        let slot = migration.disk.slot();
        let upid = app_state
            .proxmox
            .move_disk(vm, &slot, &migration.disk.storage_location)
            .await?;
        wait_for(&app_state.proxmox, &vm.node, Some(upid), &app_state.polling).await?;
        tracing::info!(target: "service", %slot, from = %migration.from_storage, to = %migration.disk.storage_location, "Disk moved");
    }

    for disk in &changes.to_resize {
        resize_disk(app_state, vm, disk).await?;
    }

    Ok(())
}

/// Resizes a disk to its declared size.
///
pub async fn resize_disk(app_state: &AppState, vm: &VmRef, disk: &VmDisk) -> Result<()> {
    let slot = disk.slot();
    let upid = app_state.proxmox.resize_disk(vm, &slot, &disk.size).await?;
    wait_for(&app_state.proxmox, &vm.node, upid, &app_state.polling).await?;
    tracing::info!(target: "service", %slot, size = %disk.size, "Disk resized");
    Ok(())
}

/// Detaches a disk and destroys the volume left behind.
///
/// A detached volume stays in the config as `unusedN`, the entry pointing at
/// the disk's volume is deleted afterwards.
///
async fn remove_disk(app_state: &AppState, vm: &VmRef, disk: &VmDisk) -> Result<()> {
    let slot = disk.slot();
    update_config(app_state, vm, vec![("delete".to_owned(), slot.clone())]).await?;

    let volume = disk.volume_id(vm.id);
    let config = app_state.proxmox.vm_config(vm).await?;
    let unused = config
        .indexed("unused")
        .into_iter()
        .find(|(_, value)| value.split(',').next() == Some(volume.as_str()));

    match unused {
        Some((index, _)) => {
            update_config(app_state, vm, vec![("delete".to_owned(), format!("unused{index}"))]).await?;
            tracing::info!(target: "service", %slot, %volume, "Disk removed");
        }
        None => {
            tracing::warn!(target: "service", %slot, %volume, "Detached volume not found among unused disks, left in place");
        }
    }
    Ok(())
}

async fn update_config(app_state: &AppState, vm: &VmRef, params: Params) -> Result<()> {
    let upid = app_state.proxmox.update_vm_config(vm, params).await?;
    wait_for(&app_state.proxmox, &vm.node, upid, &app_state.polling).await
}
