#![forbid(unsafe_code)]
//! Fleetmon model SSOT.
//!
//! Every document the platform stores or publishes is defined here, with
//! parse-time validation on identifiers so the rest of the workspace only
//! ever sees well-formed values.

mod device;
mod group;
mod ids;
mod refdata;
mod rule;

pub use device::Device;
pub use group::{DeviceGroup, GroupCondition, GroupOperator};
pub use ids::{
    parse_device_id, parse_group_id, parse_rule_id, parse_tenant_id, DeviceId, GroupId, RuleId,
    TenantId, ValidationError, DEVICE_ID_MAX_LEN, GROUP_ID_MAX_LEN, RULE_ID_MAX_LEN,
    TENANT_ID_MAX_LEN,
};
pub use refdata::{
    reference_paths, BuildManifest, DeviceGroupRow, ReferencePaths, RuleReferenceData,
    DEVICE_GROUP_CSV_HEADER,
};
pub use rule::{Calculation, Condition, Rule, RuleAction, RuleOperator, Severity};

pub const CRATE_NAME: &str = "fleetmon-model";
