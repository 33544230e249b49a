// SPDX-License-Identifier: Apache-2.0

use crate::{DocumentStoreBackend, StoreError};
use async_trait::async_trait;
use fleetmon_model::{Device, DeviceGroup, DeviceId, GroupId, Rule, RuleId, TenantId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const RULES_FILE: &str = "rules.json";
const GROUPS_FILE: &str = "devicegroups.json";
const DEVICES_FILE: &str = "devices.json";

/// Local-filesystem document store: one directory per tenant, one JSON
/// array file per collection. Writes go through a `.tmp` sibling and a
/// rename so readers never observe a partial file.
pub struct LocalFsBackend {
    root: PathBuf,
    // Serializes collection read-modify-write cycles; handlers run
    // concurrently and the files have no other write coordination.
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalFsBackend {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(tenant.as_str())
    }

    fn collection_path(&self, tenant: &TenantId, file: &str) -> Result<PathBuf, StoreError> {
        let path = self.tenant_dir(tenant).join(file);
        // Tenant ids are charset-validated, but keep the traversal guard for
        // paths that already exist on disk.
        if let Some(parent) = path.parent() {
            if parent.exists() {
                let root = self
                    .root
                    .canonicalize()
                    .unwrap_or_else(|_| self.root.clone());
                let canonical_parent = parent
                    .canonicalize()
                    .map_err(|e| StoreError(format!("path traversal check failed: {e}")))?;
                if !canonical_parent.starts_with(&root) {
                    return Err(StoreError("path traversal blocked".to_string()));
                }
            }
        }
        Ok(path)
    }

    fn read_collection<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path).map_err(|e| StoreError(format!("collection read failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError(format!("collection parse failed at {}: {e}", path.display())))
    }

    fn write_collection<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<(), StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError("collection path has no parent".to_string()))?;
        fs::create_dir_all(parent).map_err(|e| StoreError(format!("mkdir failed: {e}")))?;
        let bytes = serde_json::to_vec_pretty(items)
            .map_err(|e| StoreError(format!("collection serialize failed: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).map_err(|e| StoreError(format!("collection write failed: {e}")))?;
        fs::rename(&tmp, path).map_err(|e| StoreError(format!("collection rename failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStoreBackend for LocalFsBackend {
    fn backend_tag(&self) -> &'static str {
        "localfs"
    }

    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<Rule>, StoreError> {
        let path = self.collection_path(tenant, RULES_FILE)?;
        self.read_collection(&path)
    }

    async fn get_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<Option<Rule>, StoreError> {
        Ok(self.list_rules(tenant).await?.into_iter().find(|r| r.id == *id))
    }

    async fn upsert_rule(&self, tenant: &TenantId, rule: Rule) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(tenant, RULES_FILE)?;
        let mut rules: Vec<Rule> = self.read_collection(&path)?;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        self.write_collection(&path, &rules)
    }

    async fn delete_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(tenant, RULES_FILE)?;
        let mut rules: Vec<Rule> = self.read_collection(&path)?;
        let Some(rule) = rules.iter_mut().find(|r| r.id == *id) else {
            return Ok(false);
        };
        rule.deleted = true;
        rule.enabled = false;
        self.write_collection(&path, &rules)?;
        Ok(true)
    }

    async fn list_device_groups(&self, tenant: &TenantId) -> Result<Vec<DeviceGroup>, StoreError> {
        let path = self.collection_path(tenant, GROUPS_FILE)?;
        self.read_collection(&path)
    }

    async fn get_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<Option<DeviceGroup>, StoreError> {
        Ok(self
            .list_device_groups(tenant)
            .await?
            .into_iter()
            .find(|g| g.id == *id))
    }

    async fn upsert_device_group(
        &self,
        tenant: &TenantId,
        group: DeviceGroup,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(tenant, GROUPS_FILE)?;
        let mut groups: Vec<DeviceGroup> = self.read_collection(&path)?;
        match groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => groups.push(group),
        }
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        self.write_collection(&path, &groups)
    }

    async fn delete_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(tenant, GROUPS_FILE)?;
        let mut groups: Vec<DeviceGroup> = self.read_collection(&path)?;
        let before = groups.len();
        groups.retain(|g| g.id != *id);
        if groups.len() == before {
            return Ok(false);
        }
        self.write_collection(&path, &groups)?;
        Ok(true)
    }

    async fn list_devices(&self, tenant: &TenantId) -> Result<Vec<Device>, StoreError> {
        let path = self.collection_path(tenant, DEVICES_FILE)?;
        self.read_collection(&path)
    }

    async fn get_device(
        &self,
        tenant: &TenantId,
        id: &DeviceId,
    ) -> Result<Option<Device>, StoreError> {
        Ok(self
            .list_devices(tenant)
            .await?
            .into_iter()
            .find(|d| d.id == *id))
    }

    async fn upsert_device(&self, tenant: &TenantId, device: Device) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(tenant, DEVICES_FILE)?;
        let mut devices: Vec<Device> = self.read_collection(&path)?;
        match devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        self.write_collection(&path, &devices)
    }

    async fn delete_device(&self, tenant: &TenantId, id: &DeviceId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(tenant, DEVICES_FILE)?;
        let mut devices: Vec<Device> = self.read_collection(&path)?;
        let before = devices.len();
        devices.retain(|d| d.id != *id);
        if devices.len() == before {
            return Ok(false);
        }
        self.write_collection(&path, &devices)?;
        Ok(true)
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.root).map_err(|e| StoreError(format!("read_dir failed: {e}")))?;
        let mut tenants = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError(format!("read_dir entry failed: {e}")))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Ok(tenant) = TenantId::parse(name) {
                tenants.push(tenant);
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}
