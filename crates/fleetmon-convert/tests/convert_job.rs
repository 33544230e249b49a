// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use fleetmon_convert::{convert_tenant, ConvertOptions, ConvertStage};
use fleetmon_model::{
    Calculation, Condition, Device, DeviceGroup, DeviceId, GroupCondition, GroupId, GroupOperator,
    Rule, RuleId, RuleOperator, Severity, TenantId,
};
use fleetmon_store::{DocumentStoreBackend, ReferenceDataSink, StoreError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

struct FakeStore {
    rules: Vec<Rule>,
    groups: Vec<DeviceGroup>,
    devices: Vec<Device>,
    fail_devices: bool,
}

impl FakeStore {
    fn new(rules: Vec<Rule>, groups: Vec<DeviceGroup>, devices: Vec<Device>) -> Self {
        Self {
            rules,
            groups,
            devices,
            fail_devices: false,
        }
    }
}

#[async_trait]
impl DocumentStoreBackend for FakeStore {
    fn backend_tag(&self) -> &'static str {
        "fake"
    }

    async fn list_rules(&self, _tenant: &TenantId) -> Result<Vec<Rule>, StoreError> {
        Ok(self.rules.clone())
    }
    async fn get_rule(&self, _tenant: &TenantId, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        Ok(self.rules.iter().find(|r| &r.id == id).cloned())
    }
    async fn upsert_rule(&self, _tenant: &TenantId, _rule: Rule) -> Result<(), StoreError> {
        Err(StoreError("read-only fake".to_string()))
    }
    async fn delete_rule(&self, _tenant: &TenantId, _id: &RuleId) -> Result<bool, StoreError> {
        Err(StoreError("read-only fake".to_string()))
    }

    async fn list_device_groups(&self, _tenant: &TenantId) -> Result<Vec<DeviceGroup>, StoreError> {
        Ok(self.groups.clone())
    }
    async fn get_device_group(
        &self,
        _tenant: &TenantId,
        id: &GroupId,
    ) -> Result<Option<DeviceGroup>, StoreError> {
        Ok(self.groups.iter().find(|g| &g.id == id).cloned())
    }
    async fn upsert_device_group(
        &self,
        _tenant: &TenantId,
        _group: DeviceGroup,
    ) -> Result<(), StoreError> {
        Err(StoreError("read-only fake".to_string()))
    }
    async fn delete_device_group(
        &self,
        _tenant: &TenantId,
        _id: &GroupId,
    ) -> Result<bool, StoreError> {
        Err(StoreError("read-only fake".to_string()))
    }

    async fn list_devices(&self, _tenant: &TenantId) -> Result<Vec<Device>, StoreError> {
        if self.fail_devices {
            return Err(StoreError("device query timed out".to_string()));
        }
        Ok(self.devices.clone())
    }
    async fn get_device(
        &self,
        _tenant: &TenantId,
        id: &DeviceId,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self.devices.iter().find(|d| &d.id == id).cloned())
    }
    async fn upsert_device(&self, _tenant: &TenantId, _device: Device) -> Result<(), StoreError> {
        Err(StoreError("read-only fake".to_string()))
    }
    async fn delete_device(&self, _tenant: &TenantId, _id: &DeviceId) -> Result<bool, StoreError> {
        Err(StoreError("read-only fake".to_string()))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        Ok(vec![tenant()])
    }
}

#[derive(Default)]
struct CapturingSink {
    published: Mutex<HashMap<String, Vec<u8>>>,
}

impl CapturingSink {
    fn get(&self, name: &str) -> Vec<u8> {
        self.published
            .lock()
            .expect("lock")
            .get(name)
            .cloned()
            .expect("published file")
    }
}

#[async_trait]
impl ReferenceDataSink for CapturingSink {
    fn sink_tag(&self) -> &'static str {
        "capture"
    }

    async fn publish(
        &self,
        _tenant: &TenantId,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.published
            .lock()
            .expect("lock")
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

fn tenant() -> TenantId {
    TenantId::parse("contoso").expect("tenant")
}

fn rule(id: &str, enabled: bool) -> Rule {
    Rule {
        id: RuleId::parse(id).expect("rule id"),
        name: format!("Rule {id}"),
        description: String::new(),
        enabled,
        group_id: GroupId::parse("chillers").expect("group id"),
        severity: Severity::Critical,
        calculation: Calculation::Average,
        time_period_ms: 300_000,
        conditions: vec![Condition {
            field: "temperature".to_string(),
            operator: RuleOperator::GreaterThan,
            value: json!(75),
        }],
        actions: vec![],
        deleted: false,
    }
}

fn group(id: &str, key: &str, value: serde_json::Value) -> DeviceGroup {
    DeviceGroup {
        id: GroupId::parse(id).expect("group id"),
        display_name: format!("Group {id}"),
        conditions: vec![GroupCondition {
            key: key.to_string(),
            operator: GroupOperator::Eq,
            value,
        }],
    }
}

fn device(id: &str, device_type: &str) -> Device {
    Device {
        id: DeviceId::parse(id).expect("device id"),
        properties: json!({"Type": device_type})
            .as_object()
            .cloned()
            .expect("object"),
    }
}

#[tokio::test]
async fn full_run_publishes_rules_csv_and_manifest() {
    let mut disabled = rule("z-disabled", false);
    disabled.conditions.clear();
    let mut deleted = rule("x-deleted", true);
    deleted.deleted = true;
    let store = FakeStore::new(
        vec![rule("b-temp", true), rule("a-temp", true), disabled, deleted],
        vec![
            group("elevators", "Type", json!("elevator")),
            group("chillers", "Type", json!("chiller")),
        ],
        vec![
            device("elevator-1", "elevator"),
            device("chiller-2", "chiller"),
            device("chiller-1", "chiller"),
        ],
    );
    let sink = CapturingSink::default();

    let result = convert_tenant(&store, &sink, &ConvertOptions::new(tenant()))
        .await
        .expect("convert");

    assert_eq!(result.manifest.rule_count, 2);
    assert_eq!(result.manifest.mapping_row_count, 3);
    assert!(result.manifest.skipped_groups.is_empty());

    // Rules sorted by id, disabled and deleted rules excluded.
    let rules: serde_json::Value =
        serde_json::from_slice(&sink.get("rules.json")).expect("rules json");
    let ids: Vec<&str> = rules
        .as_array()
        .expect("array")
        .iter()
        .map(|r| r["Id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, ["a-temp", "b-temp"]);
    assert_eq!(
        rules[0]["__rulefilterjs"],
        "return (record.__aggregates.temperature.avg > 75) ? true : false;"
    );
    assert_eq!(rules[0]["AggregationWindow"], "tumblingwindow5minutes");

    // CSV sorted by group then device, bit-exact.
    assert_eq!(
        sink.get("devicegroups.csv"),
        b"DeviceId,GroupId\nchiller-1,chillers\nchiller-2,chillers\nelevator-1,elevators\n"
    );

    let manifest: serde_json::Value =
        serde_json::from_slice(&sink.get("build_manifest.json")).expect("manifest json");
    assert_eq!(manifest["tenant"], "contoso");
    assert_eq!(
        manifest["rules_sha256"],
        fleetmon_store::sha256_hex(&sink.get("rules.json"))
    );

    let stages: Vec<ConvertStage> = result.events.iter().map(|e| e.stage).collect();
    assert!(stages.contains(&ConvertStage::Fetch));
    assert!(stages.contains(&ConvertStage::Finalize));
}

#[tokio::test]
async fn repeat_runs_over_same_input_produce_identical_bytes() {
    let store = FakeStore::new(
        vec![rule("a-temp", true)],
        vec![group("chillers", "Type", json!("chiller"))],
        vec![device("chiller-1", "chiller")],
    );
    let first = CapturingSink::default();
    let second = CapturingSink::default();
    convert_tenant(&store, &first, &ConvertOptions::new(tenant()))
        .await
        .expect("first run");
    convert_tenant(&store, &second, &ConvertOptions::new(tenant()))
        .await
        .expect("second run");
    assert_eq!(first.get("rules.json"), second.get("rules.json"));
    assert_eq!(first.get("devicegroups.csv"), second.get("devicegroups.csv"));
}

#[tokio::test]
async fn failing_device_query_skips_groups_but_publishes_rules() {
    let mut store = FakeStore::new(
        vec![rule("a-temp", true)],
        vec![group("chillers", "Type", json!("chiller"))],
        vec![device("chiller-1", "chiller")],
    );
    store.fail_devices = true;
    let sink = CapturingSink::default();

    let result = convert_tenant(&store, &sink, &ConvertOptions::new(tenant()))
        .await
        .expect("convert");

    assert_eq!(result.manifest.skipped_groups, ["chillers"]);
    assert_eq!(result.manifest.mapping_row_count, 0);
    assert_eq!(result.manifest.rule_count, 1);
    assert_eq!(sink.get("devicegroups.csv"), b"DeviceId,GroupId\n");
    let skipped = result
        .events
        .iter()
        .any(|e| e.message.contains("device query failed"));
    assert!(skipped);
}

#[tokio::test]
async fn group_with_unsupported_condition_value_is_skipped() {
    let store = FakeStore::new(
        vec![],
        vec![
            group("bad", "Tags", json!(["a", "b"])),
            group("chillers", "Type", json!("chiller")),
        ],
        vec![device("chiller-1", "chiller")],
    );
    let sink = CapturingSink::default();

    let result = convert_tenant(&store, &sink, &ConvertOptions::new(tenant()))
        .await
        .expect("convert");

    assert_eq!(result.manifest.skipped_groups, ["bad"]);
    assert_eq!(
        sink.get("devicegroups.csv"),
        b"DeviceId,GroupId\nchiller-1,chillers\n"
    );
}

#[tokio::test]
async fn unsupported_aggregation_period_fails_the_run() {
    let mut bad = rule("bad-period", true);
    bad.time_period_ms = 90_000;
    let store = FakeStore::new(vec![bad], vec![], vec![]);
    let sink = CapturingSink::default();

    let err = convert_tenant(&store, &sink, &ConvertOptions::new(tenant()))
        .await
        .expect_err("configuration error");
    assert!(err.0.contains("configuration error"), "got: {err}");
    assert!(err.0.contains("bad-period"));
    assert!(sink.published.lock().expect("lock").is_empty());
}
