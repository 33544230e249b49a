//! Device-group membership and CSV mapping assembly.

use crate::ConvertError;
use fleetmon_model::{
    Device, DeviceGroup, DeviceGroupRow, GroupCondition, GroupOperator, DEVICE_GROUP_CSV_HEADER,
};
use serde_json::Value;
use std::cmp::Ordering;

fn compare_values(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().and_then(|a| b.as_f64().map(|b| (a, b)))
                .and_then(|(a, b)| a.partial_cmp(&b))
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn condition_holds(device: &Device, condition: &GroupCondition) -> bool {
    let Some(actual) = device.property_at(&condition.key) else {
        return false;
    };
    let Some(ordering) = compare_values(actual, &condition.value) else {
        return false;
    };
    // Booleans only support equality; ordered comparison on them is a
    // mistake in the group definition, not a match.
    let ordered_ok = !matches!(actual, Value::Bool(_));
    match condition.operator {
        GroupOperator::Eq => ordering == Ordering::Equal,
        GroupOperator::Ne => ordering != Ordering::Equal,
        GroupOperator::Gt => ordered_ok && ordering == Ordering::Greater,
        GroupOperator::Gte => ordered_ok && ordering != Ordering::Less,
        GroupOperator::Lt => ordered_ok && ordering == Ordering::Less,
        GroupOperator::Lte => ordered_ok && ordering != Ordering::Greater,
    }
}

/// A device belongs to a group when every condition holds. A group with no
/// conditions matches every device.
#[must_use]
pub fn device_matches(device: &Device, group: &DeviceGroup) -> bool {
    group.conditions.iter().all(|c| condition_holds(device, c))
}

/// Mapping rows for one group against a device list, sorted by device id.
#[must_use]
pub fn group_rows(group: &DeviceGroup, devices: &[Device]) -> Vec<DeviceGroupRow> {
    let mut rows: Vec<DeviceGroupRow> = devices
        .iter()
        .filter(|d| device_matches(d, group))
        .map(|d| DeviceGroupRow {
            device_id: d.id.as_str().to_string(),
            group_id: group.id.as_str().to_string(),
        })
        .collect();
    rows.sort();
    rows
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') || raw.contains('\r') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Renders the mapping file: fixed header, one row per pair, `\n` endings.
/// Rows are sorted by group then device so repeat runs over the same input
/// produce identical bytes.
pub fn csv_bytes(rows: &[DeviceGroupRow]) -> Result<Vec<u8>, ConvertError> {
    let mut sorted: Vec<&DeviceGroupRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.group_id
            .cmp(&b.group_id)
            .then_with(|| a.device_id.cmp(&b.device_id))
    });
    let mut out = String::with_capacity(32 + rows.len() * 24);
    out.push_str(DEVICE_GROUP_CSV_HEADER);
    out.push('\n');
    for row in sorted {
        out.push_str(&csv_field(&row.device_id));
        out.push(',');
        out.push_str(&csv_field(&row.group_id));
        out.push('\n');
    }
    Ok(out.into_bytes())
}
