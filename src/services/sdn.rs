use crate::model::sdn::SdnZone;
use crate::prelude::{AppState, Result};

/// Creates the zone and returns it as stored by Proxmox.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, plan), fields(zone = %plan.zone))]
pub async fn create(app_state: &AppState, plan: &SdnZone) -> Result<SdnZone> {
    plan.validate()?;
    app_state.proxmox.create_sdn_zone(plan.to_create_params()).await?;
    tracing::info!(target: "service", zone = %plan.zone, kind = %plan.kind, "SDN zone created");
    read(app_state, &plan.zone).await
}

pub async fn read(app_state: &AppState, zone: &str) -> Result<SdnZone> {
    Ok(app_state.proxmox.sdn_zone(zone).await?.into())
}

/// Updates the zone in place. The zone type is fixed at creation.
///
#[tracing::instrument(level = "debug", target = "service", skip(app_state, plan), fields(zone = %plan.zone))]
pub async fn update(app_state: &AppState, plan: &SdnZone) -> Result<SdnZone> {
    plan.validate()?;
    app_state
        .proxmox
        .update_sdn_zone(&plan.zone, plan.to_update_params())
        .await?;
    tracing::info!(target: "service", zone = %plan.zone, "SDN zone updated");
    read(app_state, &plan.zone).await
}

/// Creates the zone when Proxmox does not know it yet, updates it otherwise.
///
pub async fn apply(app_state: &AppState, plan: &SdnZone) -> Result<SdnZone> {
    match app_state.proxmox.sdn_zone(&plan.zone).await {
        Ok(_) => update(app_state, plan).await,
        Err(error) if error.is_missing() => create(app_state, plan).await,
        Err(error) => Err(error),
    }
}

pub async fn delete(app_state: &AppState, zone: &str) -> Result<()> {
    app_state.proxmox.delete_sdn_zone(zone).await?;
    tracing::info!(target: "service", %zone, "SDN zone deleted");
    Ok(())
}

/// Reads an existing zone by name so it can be managed.
///
pub async fn import(app_state: &AppState, zone: &str) -> Result<SdnZone> {
    read(app_state, zone.trim()).await
}
