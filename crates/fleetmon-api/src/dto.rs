// SPDX-License-Identifier: Apache-2.0

//! Request and response bodies for the v1 HTTP surface. Identifiers arrive
//! from the path, so upsert bodies carry everything except the id and are
//! validated into model documents before they touch the store.

use crate::errors::ApiError;
use fleetmon_model::{
    BuildManifest, Calculation, Condition, Device, DeviceGroup, DeviceId, GroupCondition, GroupId,
    Rule, RuleAction, RuleId, Severity,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleUpsertRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub group_id: String,
    pub severity: Severity,
    pub calculation: Calculation,
    #[serde(default)]
    pub time_period_ms: u64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

impl RuleUpsertRequest {
    pub fn into_rule(self, id: RuleId) -> Result<Rule, ApiError> {
        let group_id = GroupId::parse(&self.group_id).map_err(|e| {
            ApiError::validation_failed(json!([{"field": "group_id", "reason": e.0}]))
        })?;
        let rule = Rule {
            id,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            group_id,
            severity: self.severity,
            calculation: self.calculation,
            time_period_ms: self.time_period_ms,
            conditions: self.conditions,
            actions: self.actions,
            deleted: false,
        };
        rule.validate()
            .map_err(|e| ApiError::validation_failed(json!([{"reason": e.0}])))?;
        Ok(rule)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceGroupUpsertRequest {
    pub display_name: String,
    #[serde(default)]
    pub conditions: Vec<GroupCondition>,
}

impl DeviceGroupUpsertRequest {
    pub fn into_group(self, id: GroupId) -> Result<DeviceGroup, ApiError> {
        let group = DeviceGroup {
            id,
            display_name: self.display_name,
            conditions: self.conditions,
        };
        group
            .validate()
            .map_err(|e| ApiError::validation_failed(json!([{"reason": e.0}])))?;
        Ok(group)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceUpsertRequest {
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl DeviceUpsertRequest {
    #[must_use]
    pub fn into_device(self, id: DeviceId) -> Device {
        Device {
            id,
            properties: self.properties,
        }
    }
}

/// State of the most recent reference-data build for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BuildState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildStatusResponse {
    pub tenant: String,
    pub state: BuildState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<BuildManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionResponse {
    pub service: String,
    pub version: String,
}
