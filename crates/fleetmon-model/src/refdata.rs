// SPDX-License-Identifier: Apache-2.0

use crate::ids::TenantId;
use crate::rule::RuleAction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CSV header of the device-group mapping file. Fixed contract with the
/// downstream stream-analytics job; do not change.
pub const DEVICE_GROUP_CSV_HEADER: &str = "DeviceId,GroupId";

/// One rule as published to the streaming job. Field names are part of the
/// external reference-data contract and are serialized exactly as written
/// by the legacy platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleReferenceData {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "AggregationWindow")]
    pub aggregation_window: String,
    #[serde(rename = "Fields")]
    pub fields: Vec<String>,
    #[serde(rename = "Actions")]
    pub actions: Vec<RuleAction>,
    #[serde(rename = "__rulefilterjs")]
    pub rule_filter_js: String,
}

/// One `(device, group)` pair in the CSV mapping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceGroupRow {
    pub device_id: String,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ReferencePaths {
    pub tenant_dir: PathBuf,
    pub rules_json: PathBuf,
    pub device_groups_csv: PathBuf,
    pub build_manifest: PathBuf,
}

/// Canonical on-disk layout of a tenant's published reference data.
#[must_use]
pub fn reference_paths(root: &Path, tenant: &TenantId) -> ReferencePaths {
    let tenant_dir = root.join(tenant.as_str());
    ReferencePaths {
        rules_json: tenant_dir.join("rules.json"),
        device_groups_csv: tenant_dir.join("devicegroups.csv"),
        build_manifest: tenant_dir.join("build_manifest.json"),
        tenant_dir,
    }
}

/// Summary of one conversion run, published next to the reference files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildManifest {
    pub tenant: TenantId,
    pub rule_count: usize,
    pub mapping_row_count: usize,
    pub skipped_groups: Vec<String>,
    pub rules_sha256: String,
    pub groups_sha256: String,
    pub built_at_unix_ms: u64,
}
