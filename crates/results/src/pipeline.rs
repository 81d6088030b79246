// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The results pipeline: parse → project → filter → paginate → NDJSON.
//!
//! Output is deterministic: identical artifact and query bytes yield
//! byte-identical NDJSON, with object fields in profile order.

use crate::filter::{FilterError, FilterSet};
use crate::report::{self, ReportError};
use crate::schema;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write;
use sw_core::SchemaProfile;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 40;
pub const MIN_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("unknown field in custom profile: {0}")]
    UnknownField(String),
    #[error("page_size {0} outside the allowed range [{MIN_PAGE_SIZE}, {MAX_PAGE_SIZE}]")]
    PageSizeOutOfRange(u32),
}

/// One results read.
#[derive(Debug, Clone)]
pub struct ResultsQuery {
    /// 1-based page, or 0 for everything.
    pub page: u32,
    pub page_size: u32,
    pub profile: SchemaProfile,
    pub filters: BTreeMap<String, String>,
}

impl Default for ResultsQuery {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            profile: SchemaProfile::Brief,
            filters: BTreeMap::new(),
        }
    }
}

/// Render a completed scan's artifact as NDJSON.
///
/// Line 1 is the schema line (echoing the applied filters), line 2 the
/// scan metadata, then one vulnerability per line, and, when paginating,
/// a trailing pagination line.
pub fn render(artifact: &[u8], query: &ResultsQuery) -> Result<String, PipelineError> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&query.page_size) {
        return Err(PipelineError::PageSizeOutOfRange(query.page_size));
    }
    let fields = schema::profile_fields(&query.profile).map_err(PipelineError::UnknownField)?;
    let filters = FilterSet::compile(&query.filters)?;
    let report = report::parse(artifact)?;

    let matched: Vec<&report::Finding> = report
        .findings
        .iter()
        .filter(|finding| filters.matches(finding))
        .collect();
    let total = matched.len();

    let page_size = query.page_size as usize;
    let total_pages = if query.page == 0 {
        1
    } else {
        total.div_ceil(page_size).max(1)
    };

    let rows: &[&report::Finding] = if query.page == 0 {
        &matched
    } else {
        let start = (query.page as usize - 1) * page_size;
        let end = (start + page_size).min(total);
        if start >= total {
            &[]
        } else {
            &matched[start..end]
        }
    };

    let mut out = String::new();
    let schema_line = json!({
        "type": "schema",
        "profile": query.profile.name(),
        "fields": &fields,
        "filters_applied": &query.filters,
        "total_vulnerabilities": total,
        "total_pages": total_pages,
    });
    writeln!(out, "{schema_line}").ok();

    let metadata_line = json!({
        "type": "scan_metadata",
        "name": &report.name,
        "hosts": report.hosts.len(),
        "total_findings": report.findings.len(),
        "severity_counts": severity_counts(&report.findings),
    });
    writeln!(out, "{metadata_line}").ok();

    for finding in rows {
        let object = schema::project(finding, &fields);
        writeln!(out, "{}", Value::Object(object)).ok();
    }

    if query.page > 0 {
        let has_next = (query.page as usize) < total_pages;
        let pagination_line = json!({
            "type": "pagination",
            "page": query.page,
            "page_size": query.page_size,
            "total_pages": total_pages,
            "has_next": has_next,
            "next_page": if has_next { Value::from(query.page + 1) } else { Value::Null },
        });
        writeln!(out, "{pagination_line}").ok();
    }

    Ok(out)
}

fn severity_counts(findings: &[report::Finding]) -> Value {
    let mut critical = 0u64;
    let mut high = 0u64;
    let mut medium = 0u64;
    let mut low = 0u64;
    let mut info = 0u64;
    for finding in findings {
        match finding.severity {
            4 => critical += 1,
            3 => high += 1,
            2 => medium += 1,
            1 => low += 1,
            _ => info += 1,
        }
    }
    json!({
        "critical": critical,
        "high": high,
        "medium": medium,
        "low": low,
        "info": info,
    })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
