// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conjunctive filter engine over projected findings.
//!
//! Filter shape by field type: case-insensitive substring for strings,
//! prefix comparison operators (`>`, `>=`, `<`, `<=`, `=`) for numerics,
//! equality for booleans, contains for lists.

use crate::report::Finding;
use crate::schema::{field_value, ALL_FIELDS};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown filter field: {0}")]
    UnknownField(String),
    #[error("invalid filter value for {field}: {value}")]
    BadOperand { field: String, value: String },
}

const NUMERIC_FIELDS: [&str; 4] = ["plugin_id", "severity", "port", "cvss_score"];
const BOOLEAN_FIELDS: [&str; 1] = ["exploit_available"];
const LIST_FIELDS: [&str; 2] = ["cve", "see_also"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

#[derive(Debug, Clone)]
enum Predicate {
    Substring(String),
    Numeric(Comparison, f64),
    Boolean(bool),
    Contains(String),
}

/// A validated filter set, compiled once per request.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    predicates: Vec<(String, Predicate)>,
}

impl FilterSet {
    /// Compile a raw filter map, rejecting unknown fields and operands
    /// before any finding is inspected.
    pub fn compile(filters: &BTreeMap<String, String>) -> Result<Self, FilterError> {
        let mut predicates = Vec::new();
        for (field, raw) in filters {
            if !ALL_FIELDS.contains(&field.as_str()) {
                return Err(FilterError::UnknownField(field.clone()));
            }
            predicates.push((field.clone(), compile_predicate(field, raw)?));
        }
        Ok(Self { predicates })
    }

    /// All predicates must pass (conjunction).
    pub fn matches(&self, finding: &Finding) -> bool {
        self.predicates
            .iter()
            .all(|(field, predicate)| eval(predicate, field_value(finding, field)))
    }
}

fn compile_predicate(field: &str, raw: &str) -> Result<Predicate, FilterError> {
    let bad = || FilterError::BadOperand {
        field: field.to_string(),
        value: raw.to_string(),
    };
    if NUMERIC_FIELDS.contains(&field) {
        let trimmed = raw.trim();
        let (comparison, rest) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (Comparison::Ge, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (Comparison::Le, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (Comparison::Gt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (Comparison::Lt, rest)
        } else if let Some(rest) = trimmed.strip_prefix('=') {
            (Comparison::Eq, rest)
        } else {
            (Comparison::Eq, trimmed)
        };
        let operand: f64 = rest.trim().parse().map_err(|_| bad())?;
        return Ok(Predicate::Numeric(comparison, operand));
    }
    if BOOLEAN_FIELDS.contains(&field) {
        return match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Predicate::Boolean(true)),
            "false" => Ok(Predicate::Boolean(false)),
            _ => Err(bad()),
        };
    }
    if LIST_FIELDS.contains(&field) {
        return Ok(Predicate::Contains(raw.trim().to_ascii_lowercase()));
    }
    Ok(Predicate::Substring(raw.trim().to_ascii_lowercase()))
}

fn eval(predicate: &Predicate, value: Value) -> bool {
    match predicate {
        Predicate::Substring(needle) => value
            .as_str()
            .map(|s| s.to_ascii_lowercase().contains(needle))
            .unwrap_or(false),
        Predicate::Numeric(comparison, operand) => {
            let Some(number) = value.as_f64() else {
                // A null score never satisfies a numeric filter.
                return false;
            };
            match comparison {
                Comparison::Gt => number > *operand,
                Comparison::Ge => number >= *operand,
                Comparison::Lt => number < *operand,
                Comparison::Le => number <= *operand,
                Comparison::Eq => (number - *operand).abs() < f64::EPSILON,
            }
        }
        Predicate::Boolean(expected) => value.as_bool() == Some(*expected),
        Predicate::Contains(needle) => value
            .as_array()
            .map(|items| {
                items.iter().any(|item| {
                    item.as_str()
                        .map(|s| s.to_ascii_lowercase().contains(needle))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false),
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
