// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming parser for the public `.nessus` (v2) XML report form.
//!
//! Only the elements the pipeline and validator consume are lifted out;
//! everything else (policy blocks, host properties) is skipped without
//! buffering the document.

use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("malformed report: {0}")]
    Malformed(String),
    #[error("xml error: {0}")]
    Xml(String),
}

/// One vulnerability instance on one host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Finding {
    pub host: String,
    pub plugin_id: u64,
    pub plugin_name: String,
    pub plugin_family: String,
    /// 0 = info .. 4 = critical.
    pub severity: u8,
    pub port: u16,
    pub protocol: String,
    pub service: String,
    pub risk_factor: String,
    pub cve: Vec<String>,
    pub cvss_score: Option<f64>,
    pub exploit_available: bool,
    pub synopsis: String,
    pub description: String,
    pub solution: String,
    pub plugin_output: String,
    pub see_also: Vec<String>,
}

/// Parsed report: host names plus a flat finding list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub name: String,
    pub hosts: Vec<String>,
    pub findings: Vec<Finding>,
}

/// Parse an exported artifact.
pub fn parse(bytes: &[u8]) -> Result<Report, ReportError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut report = Report::default();
    let mut current_host: Option<String> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Err(e) => return Err(ReportError::Xml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"NessusClientData_v2" => saw_root = true,
                b"Report" => {
                    report.name = attr_value(&e, b"name")?.unwrap_or_default();
                }
                b"ReportHost" => {
                    let name = attr_value(&e, b"name")?.unwrap_or_default();
                    report.hosts.push(name.clone());
                    current_host = Some(name);
                }
                // Policy configuration and host properties are not results.
                b"Policy" | b"HostProperties" => {
                    let end = e.to_end().into_owned();
                    reader
                        .read_to_end(end.name())
                        .map_err(|e| ReportError::Xml(e.to_string()))?;
                }
                b"ReportItem" => {
                    let host = current_host.clone().unwrap_or_default();
                    report.findings.push(parse_item(&mut reader, &e, host)?);
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"ReportItem" {
                    let host = current_host.clone().unwrap_or_default();
                    report.findings.push(finding_from_attrs(&e, host)?);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"ReportHost" {
                    current_host = None;
                }
            }
            Ok(_) => {}
        }
    }

    if !saw_root {
        return Err(ReportError::Malformed(
            "missing NessusClientData_v2 root element".to_string(),
        ));
    }
    Ok(report)
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ReportError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ReportError::Xml(e.to_string()))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| ReportError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn finding_from_attrs(e: &BytesStart<'_>, host: String) -> Result<Finding, ReportError> {
    let mut finding = Finding {
        host,
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ReportError::Xml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| ReportError::Xml(e.to_string()))?;
        match attr.key.as_ref() {
            b"pluginID" => finding.plugin_id = value.parse().unwrap_or_default(),
            b"pluginName" => finding.plugin_name = value.into_owned(),
            b"pluginFamily" => finding.plugin_family = value.into_owned(),
            b"severity" => finding.severity = value.parse().unwrap_or_default(),
            b"port" => finding.port = value.parse().unwrap_or_default(),
            b"protocol" => finding.protocol = value.into_owned(),
            b"svc_name" => finding.service = value.into_owned(),
            _ => {}
        }
    }
    Ok(finding)
}

fn parse_item(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    host: String,
) -> Result<Finding, ReportError> {
    let mut finding = finding_from_attrs(start, host)?;
    loop {
        match reader.read_event() {
            Err(e) => return Err(ReportError::Xml(e.to_string())),
            Ok(Event::Eof) => {
                return Err(ReportError::Malformed("truncated ReportItem".to_string()))
            }
            Ok(Event::Start(e)) => {
                let tag = e.name().as_ref().to_vec();
                let text = reader
                    .read_text(e.name())
                    .map_err(|e| ReportError::Xml(e.to_string()))?
                    .into_owned();
                assign_child(&mut finding, &tag, text);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"ReportItem" => break,
            Ok(_) => {}
        }
    }
    Ok(finding)
}

fn assign_child(finding: &mut Finding, tag: &[u8], text: String) {
    match tag {
        b"description" => finding.description = text,
        b"solution" => finding.solution = text,
        b"synopsis" => finding.synopsis = text,
        b"plugin_output" => finding.plugin_output = text,
        b"risk_factor" => finding.risk_factor = text,
        b"cve" => finding.cve.push(text),
        b"see_also" => finding.see_also.push(text),
        // CVSSv3 wins over v2 when both are present.
        b"cvss3_base_score" => finding.cvss_score = text.parse().ok(),
        b"cvss_base_score" => {
            if finding.cvss_score.is_none() {
                finding.cvss_score = text.parse().ok();
            }
        }
        b"exploit_available" => {
            finding.exploit_available = matches!(text.as_str(), "true" | "1" | "yes")
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
