//! In-memory store and sink doubles for handler tests and local smoke runs.

use async_trait::async_trait;
use fleetmon_model::{Device, DeviceGroup, DeviceId, GroupId, Rule, RuleId, TenantId};
use fleetmon_store::{DocumentStoreBackend, ReferenceDataSink, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct TenantDocs {
    rules: BTreeMap<String, Rule>,
    groups: BTreeMap<String, DeviceGroup>,
    devices: BTreeMap<String, Device>,
}

#[derive(Default)]
pub struct FakeStore {
    tenants: Mutex<BTreeMap<String, TenantDocs>>,
    pub fail_all: AtomicBool,
    pub fail_devices: AtomicBool,
}

impl FakeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::Relaxed) {
            return Err(StoreError("injected store failure".to_string()));
        }
        Ok(())
    }

    fn with_tenant<T>(&self, tenant: &TenantId, f: impl FnOnce(&mut TenantDocs) -> T) -> T {
        let mut tenants = self.tenants.lock().unwrap_or_else(|e| e.into_inner());
        f(tenants.entry(tenant.as_str().to_string()).or_default())
    }
}

#[async_trait]
impl DocumentStoreBackend for FakeStore {
    fn backend_tag(&self) -> &'static str {
        "fake"
    }

    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<Rule>, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.rules.values().cloned().collect()))
    }

    async fn get_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.rules.get(id.as_str()).cloned()))
    }

    async fn upsert_rule(&self, tenant: &TenantId, rule: Rule) -> Result<(), StoreError> {
        self.check_failure()?;
        self.with_tenant(tenant, |d| {
            d.rules.insert(rule.id.as_str().to_string(), rule);
        });
        Ok(())
    }

    async fn delete_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<bool, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| match d.rules.get_mut(id.as_str()) {
            Some(rule) => {
                rule.deleted = true;
                rule.enabled = false;
                true
            }
            None => false,
        }))
    }

    async fn list_device_groups(&self, tenant: &TenantId) -> Result<Vec<DeviceGroup>, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.groups.values().cloned().collect()))
    }

    async fn get_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<Option<DeviceGroup>, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.groups.get(id.as_str()).cloned()))
    }

    async fn upsert_device_group(
        &self,
        tenant: &TenantId,
        group: DeviceGroup,
    ) -> Result<(), StoreError> {
        self.check_failure()?;
        self.with_tenant(tenant, |d| {
            d.groups.insert(group.id.as_str().to_string(), group);
        });
        Ok(())
    }

    async fn delete_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<bool, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.groups.remove(id.as_str()).is_some()))
    }

    async fn list_devices(&self, tenant: &TenantId) -> Result<Vec<Device>, StoreError> {
        self.check_failure()?;
        if self.fail_devices.load(Ordering::Relaxed) {
            return Err(StoreError("injected device query failure".to_string()));
        }
        Ok(self.with_tenant(tenant, |d| d.devices.values().cloned().collect()))
    }

    async fn get_device(
        &self,
        tenant: &TenantId,
        id: &DeviceId,
    ) -> Result<Option<Device>, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.devices.get(id.as_str()).cloned()))
    }

    async fn upsert_device(&self, tenant: &TenantId, device: Device) -> Result<(), StoreError> {
        self.check_failure()?;
        self.with_tenant(tenant, |d| {
            d.devices.insert(device.id.as_str().to_string(), device);
        });
        Ok(())
    }

    async fn delete_device(&self, tenant: &TenantId, id: &DeviceId) -> Result<bool, StoreError> {
        self.check_failure()?;
        Ok(self.with_tenant(tenant, |d| d.devices.remove(id.as_str()).is_some()))
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        self.check_failure()?;
        let tenants = self.tenants.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::with_capacity(tenants.len());
        for name in tenants.keys() {
            out.push(TenantId::parse(name).map_err(|e| StoreError(e.0))?);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct FakeSink {
    published: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl FakeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn published(&self, tenant: &str, name: &str) -> Option<Vec<u8>> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(tenant.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ReferenceDataSink for FakeSink {
    fn sink_tag(&self) -> &'static str {
        "fake"
    }

    async fn publish(
        &self,
        tenant: &TenantId,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((tenant.as_str().to_string(), name.to_string()), bytes.to_vec());
        Ok(())
    }
}
