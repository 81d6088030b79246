// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Field projections for result output.
//!
//! Each profile is an ordered field list; objects are emitted in exactly
//! that order so identical requests produce byte-identical output.

use crate::report::Finding;
use serde_json::{Map, Value};
use sw_core::SchemaProfile;

/// Every projectable field, in canonical order.
pub const ALL_FIELDS: [&str; 17] = [
    "host",
    "plugin_id",
    "plugin_name",
    "plugin_family",
    "severity",
    "port",
    "protocol",
    "service",
    "risk_factor",
    "cve",
    "cvss_score",
    "exploit_available",
    "synopsis",
    "description",
    "solution",
    "plugin_output",
    "see_also",
];

const MINIMAL_FIELDS: [&str; 6] = [
    "host",
    "plugin_id",
    "severity",
    "cve",
    "cvss_score",
    "exploit_available",
];

const SUMMARY_FIELDS: [&str; 9] = [
    "host",
    "plugin_id",
    "plugin_name",
    "severity",
    "port",
    "risk_factor",
    "cve",
    "cvss_score",
    "exploit_available",
];

const BRIEF_FIELDS: [&str; 11] = [
    "host",
    "plugin_id",
    "plugin_name",
    "severity",
    "port",
    "risk_factor",
    "cve",
    "cvss_score",
    "exploit_available",
    "description",
    "solution",
];

/// The ordered field list a profile emits.
///
/// Custom fields must name known fields; they are emitted alphabetically
/// regardless of the order the caller listed them in.
pub fn profile_fields(profile: &SchemaProfile) -> Result<Vec<&'static str>, String> {
    match profile {
        SchemaProfile::Minimal => Ok(MINIMAL_FIELDS.to_vec()),
        SchemaProfile::Summary => Ok(SUMMARY_FIELDS.to_vec()),
        SchemaProfile::Brief => Ok(BRIEF_FIELDS.to_vec()),
        SchemaProfile::Full => Ok(ALL_FIELDS.to_vec()),
        SchemaProfile::Custom(requested) => {
            for name in requested {
                if !ALL_FIELDS.contains(&name.as_str()) {
                    return Err(name.clone());
                }
            }
            let mut fields: Vec<&'static str> = ALL_FIELDS
                .into_iter()
                .filter(|known| requested.iter().any(|r| r == known))
                .collect();
            fields.sort_unstable();
            Ok(fields)
        }
    }
}

/// Project one finding onto the field list, preserving field order.
pub fn project(finding: &Finding, fields: &[&'static str]) -> Map<String, Value> {
    let mut object = Map::new();
    for field in fields {
        object.insert((*field).to_string(), field_value(finding, field));
    }
    object
}

/// Typed accessor used by both projection and filtering.
pub fn field_value(finding: &Finding, field: &str) -> Value {
    match field {
        "host" => Value::String(finding.host.clone()),
        "plugin_id" => Value::from(finding.plugin_id),
        "plugin_name" => Value::String(finding.plugin_name.clone()),
        "plugin_family" => Value::String(finding.plugin_family.clone()),
        "severity" => Value::from(finding.severity),
        "port" => Value::from(finding.port),
        "protocol" => Value::String(finding.protocol.clone()),
        "service" => Value::String(finding.service.clone()),
        "risk_factor" => Value::String(finding.risk_factor.clone()),
        "cve" => Value::from(finding.cve.clone()),
        "cvss_score" => finding.cvss_score.map(Value::from).unwrap_or(Value::Null),
        "exploit_available" => Value::from(finding.exploit_available),
        "synopsis" => Value::String(finding.synopsis.clone()),
        "description" => Value::String(finding.description.clone()),
        "solution" => Value::String(finding.solution.clone()),
        "plugin_output" => Value::String(finding.plugin_output.clone()),
        "see_also" => Value::from(finding.see_also.clone()),
        _ => Value::Null,
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
