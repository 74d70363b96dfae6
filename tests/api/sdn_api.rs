use crate::helpers::{TestApp, payload};
use proxmox_provider::services::sdn;

#[tokio::test]
async fn apply_creates_missing_zone() {
    // Arrange
    let app = TestApp::new(&["pve1", "pve2"]);

    // Act
    let zone = sdn::apply(&app.state, &payload::zone()).await.unwrap();

    // Assert
    assert_eq!(app.proxmox.calls(), vec!["zone create lab"]);
    assert_eq!(zone, payload::zone());
}

#[tokio::test]
async fn apply_updates_existing_zone_without_type() {
    // Arrange
    let app = TestApp::new(&["pve1", "pve2"]);
    sdn::create(&app.state, &payload::zone()).await.unwrap();
    let mut plan = payload::zone();
    plan.peers.clear();
    plan.nodes = vec!["pve1".to_owned()];

    // Act
    let zone = sdn::apply(&app.state, &plan).await.unwrap();

    // Assert
    assert_eq!(
        app.proxmox.calls(),
        vec!["zone create lab", "zone update lab ipam,nodes,delete"]
    );
    assert!(zone.peers.is_empty());
    assert_eq!(zone.nodes, vec!["pve1"]);
    assert_eq!(zone.kind, "vxlan");
}

#[tokio::test]
async fn deleted_zone_reads_as_missing() {
    // Arrange
    let app = TestApp::new(&["pve1"]);
    sdn::create(&app.state, &payload::zone()).await.unwrap();

    // Act
    sdn::delete(&app.state, "lab").await.unwrap();
    let result = sdn::read(&app.state, "lab").await;

    // Assert
    assert!(result.unwrap_err().is_missing());
    assert!(sdn::delete(&app.state, "lab").await.is_err());
}

#[tokio::test]
async fn import_reads_zone_by_name() {
    let app = TestApp::new(&["pve1"]);
    sdn::create(&app.state, &payload::zone()).await.unwrap();

    let zone = sdn::import(&app.state, " lab ").await.unwrap();

    assert_eq!(zone.peers, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(zone.ipam, "pve");
}

#[tokio::test]
async fn invalid_zone_name_is_rejected() {
    let app = TestApp::new(&["pve1"]);
    let mut plan = payload::zone();
    plan.zone = "lab-1".to_owned();

    let result = sdn::apply(&app.state, &plan).await;

    assert!(result.is_err());
    assert!(app.proxmox.calls().is_empty());
}
