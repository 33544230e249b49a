#![forbid(unsafe_code)]

//! Storage backends for the fleetmon platform.
//!
//! Two seams: [`DocumentStoreBackend`] holds the tenant-scoped rule /
//! device-group / device collections the web service edits, and
//! [`ReferenceDataSink`] is where the converter publishes its flat files.

mod http_backend;
mod localfs;
mod retry;
mod sink;

use async_trait::async_trait;
use fleetmon_model::{Device, DeviceGroup, DeviceId, GroupId, Rule, RuleId, TenantId};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

pub use http_backend::HttpBackend;
pub use localfs::LocalFsBackend;
pub use retry::RetryPolicy;
pub use sink::{LocalFsSink, ReferenceDataSink, S3LikeSink};

pub const CRATE_NAME: &str = "fleetmon-store";

#[derive(Debug)]
pub struct StoreError(pub String);

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Tenant-scoped document collections.
///
/// Deletion semantics differ per collection: rules soft-delete (the document
/// stays with `deleted: true` so the converter and audits can see it),
/// device groups and devices hard-delete.
#[async_trait]
pub trait DocumentStoreBackend: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str;

    async fn list_rules(&self, tenant: &TenantId) -> Result<Vec<Rule>, StoreError>;
    async fn get_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<Option<Rule>, StoreError>;
    async fn upsert_rule(&self, tenant: &TenantId, rule: Rule) -> Result<(), StoreError>;
    async fn delete_rule(&self, tenant: &TenantId, id: &RuleId) -> Result<bool, StoreError>;

    async fn list_device_groups(&self, tenant: &TenantId) -> Result<Vec<DeviceGroup>, StoreError>;
    async fn get_device_group(
        &self,
        tenant: &TenantId,
        id: &GroupId,
    ) -> Result<Option<DeviceGroup>, StoreError>;
    async fn upsert_device_group(
        &self,
        tenant: &TenantId,
        group: DeviceGroup,
    ) -> Result<(), StoreError>;
    async fn delete_device_group(&self, tenant: &TenantId, id: &GroupId)
        -> Result<bool, StoreError>;

    async fn list_devices(&self, tenant: &TenantId) -> Result<Vec<Device>, StoreError>;
    async fn get_device(
        &self,
        tenant: &TenantId,
        id: &DeviceId,
    ) -> Result<Option<Device>, StoreError>;
    async fn upsert_device(&self, tenant: &TenantId, device: Device) -> Result<(), StoreError>;
    async fn delete_device(&self, tenant: &TenantId, id: &DeviceId) -> Result<bool, StoreError>;

    /// Tenants the backend currently holds documents for.
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}
