// SPDX-License-Identifier: Apache-2.0

use fleetmon_model::{
    Calculation, Condition, Device, DeviceGroup, DeviceId, GroupId, Rule, RuleId, RuleOperator,
    Severity, TenantId,
};
use fleetmon_store::{DocumentStoreBackend, LocalFsBackend, LocalFsSink, ReferenceDataSink};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn tenant() -> TenantId {
    TenantId::parse("contoso").expect("tenant")
}

fn sample_rule(id: &str) -> Rule {
    Rule {
        id: RuleId::parse(id).expect("rule id"),
        name: format!("rule {id}"),
        description: String::new(),
        enabled: true,
        group_id: GroupId::parse("chillers").expect("group id"),
        severity: Severity::Warning,
        calculation: Calculation::Instant,
        time_period_ms: 0,
        conditions: vec![Condition {
            field: "pressure".to_string(),
            operator: RuleOperator::GreaterThan,
            value: json!(250),
        }],
        actions: vec![],
        deleted: false,
    }
}

#[tokio::test]
async fn rules_round_trip_and_soft_delete() {
    let dir = tempdir().expect("tmp");
    let store = LocalFsBackend::new(dir.path().to_path_buf());
    let t = tenant();

    store.upsert_rule(&t, sample_rule("b-rule")).await.expect("upsert");
    store.upsert_rule(&t, sample_rule("a-rule")).await.expect("upsert");

    let listed = store.list_rules(&t).await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id.as_str(), "a-rule");

    let deleted = store
        .delete_rule(&t, &RuleId::parse("a-rule").expect("id"))
        .await
        .expect("delete");
    assert!(deleted);

    // Soft delete keeps the document but disables it.
    let after = store
        .get_rule(&t, &RuleId::parse("a-rule").expect("id"))
        .await
        .expect("get")
        .expect("still present");
    assert!(after.deleted);
    assert!(!after.enabled);

    let missing = store
        .delete_rule(&t, &RuleId::parse("never-existed").expect("id"))
        .await
        .expect("delete missing");
    assert!(!missing);
}

#[tokio::test]
async fn device_groups_hard_delete() {
    let dir = tempdir().expect("tmp");
    let store = LocalFsBackend::new(dir.path().to_path_buf());
    let t = tenant();
    let group = DeviceGroup {
        id: GroupId::parse("chillers").expect("group id"),
        display_name: "Chillers".to_string(),
        conditions: vec![],
    };
    store.upsert_device_group(&t, group).await.expect("upsert");
    assert_eq!(store.list_device_groups(&t).await.expect("list").len(), 1);

    let removed = store
        .delete_device_group(&t, &GroupId::parse("chillers").expect("id"))
        .await
        .expect("delete");
    assert!(removed);
    assert!(store.list_device_groups(&t).await.expect("list").is_empty());
}

#[tokio::test]
async fn devices_upsert_replaces_by_id() {
    let dir = tempdir().expect("tmp");
    let store = LocalFsBackend::new(dir.path().to_path_buf());
    let t = tenant();
    let mut device = Device {
        id: DeviceId::parse("chiller-01").expect("device id"),
        properties: json!({"Type": "chiller"}).as_object().cloned().unwrap(),
    };
    store.upsert_device(&t, device.clone()).await.expect("upsert");
    device.properties = json!({"Type": "elevator"}).as_object().cloned().unwrap();
    store.upsert_device(&t, device).await.expect("upsert again");

    let devices = store.list_devices(&t).await.expect("list");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].properties["Type"], "elevator");
}

#[tokio::test]
async fn tenants_are_discovered_from_directories() {
    let dir = tempdir().expect("tmp");
    let store = LocalFsBackend::new(dir.path().to_path_buf());
    store
        .upsert_rule(&TenantId::parse("beta").expect("t"), sample_rule("r"))
        .await
        .expect("upsert");
    store
        .upsert_rule(&TenantId::parse("alpha").expect("t"), sample_rule("r"))
        .await
        .expect("upsert");

    let tenants = store.list_tenants().await.expect("tenants");
    let names: Vec<&str> = tenants.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, ["alpha", "beta"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_do_not_lose_writes() {
    let dir = tempdir().expect("tmp");
    let store = Arc::new(LocalFsBackend::new(dir.path().to_path_buf()));
    let t = tenant();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let t = t.clone();
        tasks.push(tokio::spawn(async move {
            store.upsert_rule(&t, sample_rule(&format!("rule-{i}"))).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("upsert");
    }

    assert_eq!(store.list_rules(&t).await.expect("list").len(), 8);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_tenant_dir_escaping_the_root_is_blocked() {
    let root = tempdir().expect("root");
    let outside = tempdir().expect("outside");
    std::os::unix::fs::symlink(outside.path(), root.path().join("evil")).expect("symlink");

    let store = LocalFsBackend::new(root.path().to_path_buf());
    let err = store
        .upsert_rule(&TenantId::parse("evil").expect("t"), sample_rule("r"))
        .await
        .expect_err("blocked");
    assert!(err.0.contains("path traversal blocked"));
}

#[tokio::test]
async fn sink_publishes_bytes_with_checksum_sibling() {
    let dir = tempdir().expect("tmp");
    let sink = LocalFsSink::new(dir.path().to_path_buf());
    let t = tenant();
    sink.publish(&t, "rules.json", b"[]").await.expect("publish");

    let written = std::fs::read(dir.path().join("contoso/rules.json")).expect("read");
    assert_eq!(written, b"[]");
    let checksum =
        std::fs::read_to_string(dir.path().join("contoso/rules.json.sha256")).expect("checksum");
    assert!(checksum.starts_with(&fleetmon_store::sha256_hex(b"[]")));

    let err = sink.publish(&t, "../escape.json", b"x").await.expect_err("blocked");
    assert!(err.0.contains("invalid reference file name"));
}
