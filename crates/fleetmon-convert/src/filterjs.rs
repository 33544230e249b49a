// SPDX-License-Identifier: Apache-2.0

//! Rule-to-JavaScript translation.
//!
//! The downstream stream-analytics job evaluates `__rulefilterjs` against
//! each telemetry record, so the generated text is a fixed contract:
//! conditions ANDed, wrapped in `return (...) ? true : false;`.

use crate::ConvertError;
use fleetmon_model::{Calculation, Condition, Rule, RuleReferenceData};
use serde_json::Value;

pub const WINDOW_INSTANT: &str = "instant";
pub const WINDOW_1_MIN: &str = "tumblingwindow1minutes";
pub const WINDOW_5_MIN: &str = "tumblingwindow5minutes";
pub const WINDOW_10_MIN: &str = "tumblingwindow10minutes";

/// Maps a rule's calculation and period onto the aggregation-window token
/// the streaming job understands. Periods outside the supported table are
/// configuration errors, not silent fallbacks.
pub fn aggregation_window(calculation: Calculation, period_ms: u64) -> Result<&'static str, ConvertError> {
    match calculation {
        Calculation::Instant => Ok(WINDOW_INSTANT),
        Calculation::Average => match period_ms {
            60_000 => Ok(WINDOW_1_MIN),
            300_000 => Ok(WINDOW_5_MIN),
            600_000 => Ok(WINDOW_10_MIN),
            other => Err(ConvertError::configuration(format!(
                "unsupported aggregation period {other}ms for Average calculation"
            ))),
        },
    }
}

fn js_field(field: &str) -> Result<&str, ConvertError> {
    let mut chars = field.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = field
        .chars()
        .skip(1)
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_head && valid_tail {
        Ok(field)
    } else {
        Err(ConvertError::configuration(format!(
            "condition field is not a valid identifier: {field}"
        )))
    }
}

fn js_literal(value: &Value) -> Result<String, ConvertError> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::String(s) => {
            let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
            Ok(format!("'{escaped}'"))
        }
        other => Err(ConvertError::configuration(format!(
            "condition value must be a number, boolean, or string, got: {other}"
        ))),
    }
}

fn js_comparison(condition: &Condition, calculation: Calculation) -> Result<String, ConvertError> {
    let field = js_field(&condition.field)?;
    let operator = condition.operator.js_token();
    let literal = js_literal(&condition.value)?;
    let accessor = match calculation {
        Calculation::Instant => format!("record.{field}"),
        Calculation::Average => format!("record.__aggregates.{field}.avg"),
    };
    Ok(format!("{accessor} {operator} {literal}"))
}

/// Builds the full `__rulefilterjs` body for one rule.
pub fn rule_filter_js(rule: &Rule) -> Result<String, ConvertError> {
    if rule.conditions.is_empty() {
        return Err(ConvertError::configuration(format!(
            "rule {} has no conditions",
            rule.id
        )));
    }
    let mut comparisons = Vec::with_capacity(rule.conditions.len());
    for condition in &rule.conditions {
        comparisons.push(js_comparison(condition, rule.calculation)?);
    }
    Ok(format!("return ({}) ? true : false;", comparisons.join(" && ")))
}

/// Full reference-data record for one enabled rule.
pub fn rule_reference_data(rule: &Rule) -> Result<RuleReferenceData, ConvertError> {
    let window = aggregation_window(rule.calculation, rule.time_period_ms)?;
    let filter = rule_filter_js(rule)?;
    let mut fields: Vec<String> = Vec::new();
    for condition in &rule.conditions {
        if !fields.contains(&condition.field) {
            fields.push(condition.field.clone());
        }
    }
    Ok(RuleReferenceData {
        id: rule.id.as_str().to_string(),
        name: rule.name.clone(),
        aggregation_window: window.to_string(),
        fields,
        actions: rule.actions.clone(),
        rule_filter_js: filter,
    })
}
