use crate::helpers::{TestApp, payload, position};
use proxmox_provider::model::disk::BusType;
use proxmox_provider::prelude::Error;
use proxmox_provider::proxmox::types::Status;
use proxmox_provider::services::vm;

#[tokio::test]
async fn update_applies_changes_in_order() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    app.proxmox.add_vm("pve", 100, Status::Running, &payload::vm_config());
    let mut plan = payload::vm_plan(100, "pve");
    plan.disks = vec![
        payload::disk(BusType::Scsi, 0, "64G"),
        payload::disk(BusType::Virtio, 0, "10G"),
    ];

    // Act
    let state = vm::update(&app.state, &plan, None).await.unwrap();

    // Assert
    let calls = app.proxmox.calls();
    assert_eq!(calls[0], "shutdown pve/100");
    assert!(calls[1].starts_with("config pve/100 name,"));
    assert_eq!(
        calls[2..],
        [
            "delete pve/100 scsi1",
            "delete pve/100 unused0",
            "config pve/100 virtio0",
            "resize pve/100 scsi0 64G",
            "start pve/100",
        ]
    );

    let slots: Vec<_> = state.disks.iter().map(|disk| (disk.slot(), disk.size.clone())).collect();
    assert_eq!(
        slots,
        vec![("scsi0".to_owned(), "64G".to_owned()), ("virtio0".to_owned(), "10G".to_owned())]
    );
    assert_eq!(state.power_state, Some(Status::Running));

    let config = app.proxmox.config(100).unwrap();
    assert!(config.keys().all(|key| !key.starts_with("unused")));
    assert!(config.contains_key("ide2"));
}

#[tokio::test]
async fn shrink_is_rejected_before_any_change() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    app.proxmox.add_vm("pve", 100, Status::Running, &payload::vm_config());
    let mut plan = payload::vm_plan(100, "pve");
    plan.disks = vec![
        payload::disk(BusType::Scsi, 0, "16G"),
        payload::disk(BusType::Scsi, 1, "8G"),
    ];

    // Act
    let result = vm::update(&app.state, &plan, None).await;

    // Assert
    match result {
        Err(error @ Error::DiskShrink { .. }) => {
            assert_eq!(error.summary(), "Cannot reduce the size of an existing volume");
            assert!(error.to_string().contains("scsi0"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(app.proxmox.calls().is_empty());
    assert_eq!(app.proxmox.status(100), Some(Status::Running));
}

#[tokio::test]
async fn unchanged_disks_keep_vm_running() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    app.proxmox.add_vm("pve", 100, Status::Running, &payload::vm_config());
    let mut plan = payload::vm_plan(100, "pve");
    plan.disks.push(payload::disk(BusType::Scsi, 1, "8G"));

    // Act
    let changes = vm::plan_changes(&app.state, &plan, None).await.unwrap();
    let state = vm::update(&app.state, &plan, None).await.unwrap();

    // Assert
    assert!(changes.is_empty());
    let calls = app.proxmox.calls();
    assert_eq!(calls.len(), 1, "{calls:#?}");
    assert!(calls[0].starts_with("config pve/100"));
    assert_eq!(state.disks.len(), 2);
    assert_eq!(state.power_state, Some(Status::Running));
}

#[tokio::test]
async fn option_change_and_storage_move() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    app.proxmox.add_vm("pve", 100, Status::Running, &payload::vm_config());
    let mut plan = payload::vm_plan(100, "pve");
    plan.disks[0].cache = "writeback".to_owned();
    plan.disks[0].storage_location = "ceph".to_owned();
    plan.disks.push(payload::disk(BusType::Scsi, 1, "8G"));

    // Act
    let state = vm::update(&app.state, &plan, None).await.unwrap();

    // Assert
    let calls = app.proxmox.calls();
    let shutdown = position(&calls, "shutdown pve/100");
    let updated = position(&calls, "config pve/100 scsi0");
    let moved = position(&calls, "move pve/100 scsi0 ceph");
    let started = position(&calls, "start pve/100");
    assert!(shutdown < updated && updated < moved && moved < started);

    let scsi0 = state.disks.iter().find(|disk| disk.order == 0).unwrap();
    assert_eq!(scsi0.storage_location, "ceph");
    assert_eq!(scsi0.cache, "writeback");
    assert_eq!(scsi0.id, 0);
}

#[tokio::test]
async fn file_based_volumes_are_updated_and_removed_by_their_id() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    let mut config = payload::vm_config();
    config[4] = ("scsi0", "local:100/vm-100-disk-0.qcow2,iothread=1,size=32G");
    config[5] = ("scsi1", "local:100/vm-100-disk-1.qcow2,iothread=1,size=8G");
    app.proxmox.add_vm("pve", 100, Status::Stopped, &config);
    let mut plan = payload::vm_plan(100, "pve");
    plan.disks[0].storage_location = "local".to_owned();
    plan.disks[0].cache = "writeback".to_owned();

    // Act
    let state = vm::update(&app.state, &plan, None).await.unwrap();

    // Assert
    let calls = app.proxmox.calls();
    let removed = position(&calls, "delete pve/100 scsi1");
    let cleaned = position(&calls, "delete pve/100 unused0");
    let updated = position(&calls, "config pve/100 scsi0");
    assert!(removed < cleaned && cleaned < updated);

    let config = app.proxmox.config(100).unwrap();
    assert!(config.keys().all(|key| !key.starts_with("unused")));
    assert_eq!(
        config["scsi0"].as_str(),
        Some("local:100/vm-100-disk-0.qcow2,size=32G,cache=writeback,iothread=1")
    );
    assert_eq!(state.disks.len(), 1);
    assert_eq!(state.disks[0].volume.as_deref(), Some("local:100/vm-100-disk-0.qcow2"));
    assert_eq!(state.disks[0].cache, "writeback");
}

#[tokio::test]
async fn planned_node_change_migrates_vm() {
    // Arrange
    let app = TestApp::new(&["pve1", "pve2"]);
    app.proxmox.add_vm("pve1", 100, Status::Running, &payload::vm_config());
    let prior = vm::import(&app.state, "100").await.unwrap();
    let mut plan = payload::vm_plan(100, "pve2");
    plan.disks.push(payload::disk(BusType::Scsi, 1, "8G"));

    // Act
    let state = vm::update(&app.state, &plan, Some(&prior)).await.unwrap();

    // Assert
    let calls = app.proxmox.calls();
    assert_eq!(calls[0], "migrate pve1/100 pve2 online=true");
    assert!(calls[1].starts_with("config pve2/100"));
    assert_eq!(app.proxmox.node_of(100).as_deref(), Some("pve2"));
    assert_eq!(state.node_name.as_deref(), Some("pve2"));
}

#[tokio::test]
async fn read_searches_other_nodes() {
    // Arrange
    let app = TestApp::new(&["pve1", "pve2", "pve3"]);
    app.proxmox.add_vm("pve3", 100, Status::Stopped, &payload::vm_config());
    let state = payload::vm_plan(100, "pve1");

    // Act
    let state = vm::read(&app.state, &state).await.unwrap();

    // Assert
    assert_eq!(state.node_name.as_deref(), Some("pve3"));
    assert_eq!(state.power_state, Some(Status::Stopped));
    assert_eq!(state.boot_order, vec!["scsi0"]);
    assert_eq!(state.network_interfaces[0].bridge, "vmbr0");
}

#[tokio::test]
async fn read_fails_when_no_node_holds_vm() {
    let app = TestApp::new(&["pve1", "pve2"]);
    let result = vm::read(&app.state, &payload::vm_plan(100, "pve1")).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn create_resizes_imported_disk_and_starts_vm() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    let mut plan = payload::vm_plan(140, "pve");
    plan.disks[0].import_from = Some("local".to_owned());
    plan.disks[0].import_path = Some("import/debian-12.10.1.qcow2".to_owned());
    plan.disks[0].size = "20G".to_owned();
    plan.cloud_init_storage_name = Some("local".to_owned());
    plan.power_state = Some(Status::Running);

    // Act
    let state = vm::create(&app.state, &plan).await.unwrap();

    // Assert
    assert_eq!(
        app.proxmox.calls(),
        vec!["create pve/140", "resize pve/140 scsi0 20G", "start pve/140"]
    );
    assert_eq!(state.disks.len(), 1);
    assert_eq!(state.disks[0].size, "20G");
    assert_eq!(state.disks[0].import_path.as_deref(), Some("import/debian-12.10.1.qcow2"));
    assert_eq!(state.cloud_init_storage_name.as_deref(), Some("local"));
    assert_eq!(state.power_state, Some(Status::Running));
    assert_eq!(state.ip_configs, plan.ip_configs);
}

#[tokio::test]
async fn invalid_plan_sends_nothing() {
    let app = TestApp::new(&["pve"]);
    let mut plan = payload::vm_plan(42, "pve");
    plan.disks.push(payload::disk(BusType::Scsi, 0, "8G"));

    let result = vm::create(&app.state, &plan).await;

    assert!(matches!(result, Err(Error::Validation(..))));
    assert!(app.proxmox.calls().is_empty());
}

#[tokio::test]
async fn apply_creates_then_updates() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    let plan = payload::vm_plan(140, "pve");

    // Act
    let created = vm::apply(&app.state, &plan, None).await.unwrap();
    let updated = vm::apply(&app.state, &plan, Some(&created)).await.unwrap();

    // Assert
    let calls = app.proxmox.calls();
    assert_eq!(calls.iter().filter(|call| call.starts_with("create")).count(), 1);
    assert!(calls.last().unwrap().starts_with("config pve/140"));
    assert_eq!(created.disks, updated.disks);
}

#[tokio::test]
async fn delete_shuts_down_running_vm() {
    // Arrange
    let app = TestApp::new(&["pve"]);
    app.proxmox.add_vm("pve", 100, Status::Running, &payload::vm_config());
    let state = payload::vm_plan(100, "pve");

    // Act
    vm::delete(&app.state, &state).await.unwrap();

    // Assert
    assert_eq!(app.proxmox.calls(), vec!["shutdown pve/100", "destroy pve/100"]);
    assert!(app.proxmox.config(100).is_none());
    assert!(matches!(vm::read(&app.state, &state).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn import_requires_numeric_id() {
    // Arrange
    let app = TestApp::new(&["pve1", "pve2"]);
    app.proxmox.add_vm("pve2", 100, Status::Stopped, &payload::vm_config());

    // Act
    let invalid = vm::import(&app.state, "web-1").await;
    let imported = vm::import(&app.state, " 100 ").await.unwrap();

    // Assert
    assert!(matches!(invalid, Err(Error::Validation(attribute, _)) if attribute == "vm_id"));
    assert_eq!(imported.node_name.as_deref(), Some("pve2"));
    assert_eq!(imported.disks.len(), 2);
    assert!(imported.disks.iter().all(|disk| disk.import_from.is_none()));
}
