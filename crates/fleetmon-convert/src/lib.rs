#![forbid(unsafe_code)]

//! Converter: turns a tenant's stored rule and device-group documents into
//! the flat reference-data files the stream-analytics job loads.
//!
//! Outputs per tenant: `rules.json` (array of rule records with generated
//! `__rulefilterjs`), `devicegroups.csv` (`DeviceId,GroupId` mapping), and
//! `build_manifest.json` (counts, checksums, skipped groups).

mod filterjs;
mod groups;
mod logging;

use fleetmon_model::{BuildManifest, DeviceGroupRow, RuleReferenceData, TenantId};
use fleetmon_store::{sha256_hex, DocumentStoreBackend, ReferenceDataSink, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub use filterjs::{
    aggregation_window, rule_filter_js, rule_reference_data, WINDOW_10_MIN, WINDOW_1_MIN,
    WINDOW_5_MIN, WINDOW_INSTANT,
};
pub use groups::{csv_bytes, device_matches, group_rows};
pub use logging::{ConvertEvent, ConvertLog, ConvertStage};

pub const CRATE_NAME: &str = "fleetmon-convert";

const CONFIGURATION_PREFIX: &str = "configuration error: ";

#[derive(Debug)]
pub struct ConvertError(pub String);

impl ConvertError {
    /// Error caused by rule or group content the operator must fix, as
    /// opposed to a failing dependency. Surfaced differently by callers.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self(format!("{CONFIGURATION_PREFIX}{}", message.into()))
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.0.starts_with(CONFIGURATION_PREFIX)
    }

    /// Prepends context without losing the configuration classification.
    #[must_use]
    fn with_context(self, context: &str) -> Self {
        match self.0.strip_prefix(CONFIGURATION_PREFIX) {
            Some(rest) => Self::configuration(format!("{context}: {rest}")),
            None => Self(format!("{context}: {}", self.0)),
        }
    }
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConvertError {}

impl From<StoreError> for ConvertError {
    fn from(err: StoreError) -> Self {
        Self(format!("store: {err}"))
    }
}

/// Knobs for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub tenant: TenantId,
    /// Publish the manifest alongside the two reference files.
    pub write_manifest: bool,
}

impl ConvertOptions {
    #[must_use]
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            write_manifest: true,
        }
    }
}

/// Outcome of one conversion run.
#[derive(Debug)]
pub struct ConvertResult {
    pub manifest: BuildManifest,
    pub events: Vec<ConvertEvent>,
}

/// In-memory translation of a tenant's documents, before any publishing.
/// Exposed separately so the CLI can validate without a sink.
#[derive(Debug)]
pub struct TranslatedTenant {
    pub rules: Vec<RuleReferenceData>,
    pub rows: Vec<DeviceGroupRow>,
    pub skipped_groups: Vec<String>,
}

fn group_conditions_supported(group: &fleetmon_model::DeviceGroup) -> bool {
    group
        .conditions
        .iter()
        .all(|c| matches!(c.value, Value::Number(_) | Value::String(_) | Value::Bool(_)))
}

fn detail(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Fetches and translates one tenant's documents.
///
/// Rule translation is strict: an enabled rule with an unsupported window,
/// operator value, or field name fails the whole run with a configuration
/// error. Group evaluation is lenient: a group whose device query fails or
/// whose conditions use unsupported value types is skipped, logged, and
/// recorded in `skipped_groups` so the rest of the tenant still publishes.
pub async fn translate_tenant(
    store: &dyn DocumentStoreBackend,
    tenant: &TenantId,
    log: &mut ConvertLog,
) -> Result<TranslatedTenant, ConvertError> {
    log.emit(
        ConvertStage::Fetch,
        "fetching tenant documents",
        detail(&[("tenant", tenant.as_str().to_string())]),
    );
    let all_rules = store.list_rules(tenant).await?;
    let mut device_groups = store.list_device_groups(tenant).await?;
    device_groups.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    let mut rules: Vec<RuleReferenceData> = Vec::new();
    for rule in all_rules.iter().filter(|r| r.enabled && !r.deleted) {
        rules.push(
            rule_reference_data(rule)
                .map_err(|e| e.with_context(&format!("rule {}", rule.id)))?,
        );
    }
    rules.sort_by(|a, b| a.id.cmp(&b.id));
    log.emit(
        ConvertStage::Translate,
        "rules translated",
        detail(&[
            ("total", all_rules.len().to_string()),
            ("enabled", rules.len().to_string()),
        ]),
    );

    let mut rows: Vec<DeviceGroupRow> = Vec::new();
    let mut skipped_groups: Vec<String> = Vec::new();
    for group in &device_groups {
        if !group_conditions_supported(group) {
            warn!(
                tenant = tenant.as_str(),
                group = group.id.as_str(),
                "skipping group with unsupported condition value type"
            );
            log.emit(
                ConvertStage::Translate,
                "group skipped: unsupported condition value type",
                detail(&[("group", group.id.as_str().to_string())]),
            );
            skipped_groups.push(group.id.as_str().to_string());
            continue;
        }
        // Devices are queried per group so one failing query costs only
        // that group's rows, not the whole run.
        let devices = match store.list_devices(tenant).await {
            Ok(devices) => devices,
            Err(err) => {
                warn!(
                    tenant = tenant.as_str(),
                    group = group.id.as_str(),
                    error = %err,
                    "skipping group: device query failed"
                );
                log.emit(
                    ConvertStage::Translate,
                    "group skipped: device query failed",
                    detail(&[
                        ("group", group.id.as_str().to_string()),
                        ("error", err.to_string()),
                    ]),
                );
                skipped_groups.push(group.id.as_str().to_string());
                continue;
            }
        };
        rows.extend(group_rows(group, &devices));
    }
    rows.sort_by(|a, b| {
        a.group_id
            .cmp(&b.group_id)
            .then_with(|| a.device_id.cmp(&b.device_id))
    });
    log.emit(
        ConvertStage::Translate,
        "device group mapping assembled",
        detail(&[
            ("groups", device_groups.len().to_string()),
            ("rows", rows.len().to_string()),
            ("skipped", skipped_groups.len().to_string()),
        ]),
    );

    Ok(TranslatedTenant {
        rules,
        rows,
        skipped_groups,
    })
}

/// Runs the full conversion for one tenant and publishes through the sink.
pub async fn convert_tenant(
    store: &dyn DocumentStoreBackend,
    sink: &dyn ReferenceDataSink,
    opts: &ConvertOptions,
) -> Result<ConvertResult, ConvertError> {
    let tenant = &opts.tenant;
    let mut log = ConvertLog::default();
    let translated = translate_tenant(store, tenant, &mut log).await?;

    let rules_json = serde_json::to_vec_pretty(&translated.rules)
        .map_err(|e| ConvertError(format!("rules serialization failed: {e}")))?;
    let groups_csv = csv_bytes(&translated.rows)?;
    let rules_sha256 = sha256_hex(&rules_json);
    let groups_sha256 = sha256_hex(&groups_csv);

    log.emit(
        ConvertStage::Persist,
        "publishing reference files",
        detail(&[
            ("sink", sink.sink_tag().to_string()),
            ("rules_sha256", rules_sha256.clone()),
            ("groups_sha256", groups_sha256.clone()),
        ]),
    );
    sink.publish(tenant, "rules.json", &rules_json).await?;
    sink.publish(tenant, "devicegroups.csv", &groups_csv).await?;

    let manifest = BuildManifest {
        tenant: tenant.clone(),
        rule_count: translated.rules.len(),
        mapping_row_count: translated.rows.len(),
        skipped_groups: translated.skipped_groups,
        rules_sha256,
        groups_sha256,
        built_at_unix_ms: now_unix_ms(),
    };
    if opts.write_manifest {
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ConvertError(format!("manifest serialization failed: {e}")))?;
        sink.publish(tenant, "build_manifest.json", &manifest_json)
            .await?;
    }

    info!(
        tenant = tenant.as_str(),
        rules = manifest.rule_count,
        rows = manifest.mapping_row_count,
        skipped = manifest.skipped_groups.len(),
        "conversion complete"
    );
    log.emit(
        ConvertStage::Finalize,
        "conversion complete",
        detail(&[
            ("rules", manifest.rule_count.to_string()),
            ("rows", manifest.mapping_row_count.to_string()),
        ]),
    );

    Ok(ConvertResult {
        manifest,
        events: log.events().to_vec(),
    })
}
