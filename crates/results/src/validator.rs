// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Report validation: structural checks, authentication classification,
//! and summary statistics.

use crate::report::{self, Finding, Report};
use sw_core::{AuthenticationStatus, ReportStats, ScanType, Validation};
use tracing::debug;

/// Anything smaller than this cannot be a real export.
const MIN_REPORT_BYTES: usize = 500;

/// The scanner's own scan-information plugin, whose output carries the
/// authoritative "Credentialed checks" verdict.
const SCAN_INFO_PLUGIN: u64 = 19506;

/// Plugins that can only fire when credentials actually worked.
const AUTH_ONLY_PLUGINS: [u64; 6] = [10394, 10400, 12634, 24269, 97993, 141118];

/// Distinct auth-only plugin hits that attest success when the scan-info
/// verdict is missing.
const AUTH_FALLBACK_THRESHOLD: usize = 5;

/// Classify an exported artifact for the declared scan type.
pub fn validate(artifact: &[u8], scan_type: ScanType) -> Validation {
    let mut warnings = Vec::new();

    if artifact.len() < MIN_REPORT_BYTES {
        warnings.push(format!(
            "report is {} bytes, below the {MIN_REPORT_BYTES}-byte structural floor",
            artifact.len()
        ));
        return invalid(artifact.len() as u64, warnings);
    }

    let report = match report::parse(artifact) {
        Ok(report) => report,
        Err(error) => {
            warnings.push(format!("report failed to parse: {error}"));
            return invalid(artifact.len() as u64, warnings);
        }
    };

    let stats = stats_for(&report, artifact.len() as u64);

    if report.hosts.is_empty() {
        warnings.push("report contains no hosts".to_string());
        return Validation {
            is_valid: false,
            authentication_status: match scan_type {
                ScanType::Untrusted => AuthenticationStatus::NotApplicable,
                _ => AuthenticationStatus::Failed,
            },
            warnings,
            stats: Some(stats),
        };
    }

    let authentication_status = classify_authentication(&report, scan_type, &mut warnings);
    let auth_failed =
        scan_type.is_authenticated() && authentication_status == AuthenticationStatus::Failed;
    if auth_failed {
        warnings.push(
            "credentialed checks did not run; results reflect an unauthenticated view".to_string(),
        );
    }

    Validation {
        is_valid: !auth_failed,
        authentication_status,
        warnings,
        stats: Some(stats),
    }
}

/// Concrete checks an operator should walk through after a credentialed
/// scan fails to authenticate.
pub fn troubleshooting_hints() -> Vec<String> {
    vec![
        "verify the scan credentials (username, password or key, and method) are current".to_string(),
        "confirm the targets are reachable from the scanner instance".to_string(),
        "check that firewalls permit the authentication ports (SSH 22 / SMB 445)".to_string(),
        "ensure the account has the privileges required for local checks".to_string(),
    ]
}

fn invalid(artifact_bytes: u64, warnings: Vec<String>) -> Validation {
    Validation {
        is_valid: false,
        authentication_status: AuthenticationStatus::Unknown,
        warnings,
        stats: Some(ReportStats {
            artifact_bytes,
            ..Default::default()
        }),
    }
}

fn classify_authentication(
    report: &Report,
    scan_type: ScanType,
    warnings: &mut Vec<String>,
) -> AuthenticationStatus {
    if scan_type == ScanType::Untrusted {
        return AuthenticationStatus::NotApplicable;
    }

    // The scan-info plugin is authoritative when present.
    if let Some(verdict) = report
        .findings
        .iter()
        .filter(|f| f.plugin_id == SCAN_INFO_PLUGIN)
        .find_map(|f| credentialed_checks_verdict(f))
    {
        debug!(%verdict, "scan-info credentialed checks verdict");
        return match verdict.as_str() {
            "yes" => AuthenticationStatus::Success,
            "partial" => {
                warnings.push("credentialed checks ran partially".to_string());
                AuthenticationStatus::Partial
            }
            _ => AuthenticationStatus::Failed,
        };
    }

    // Fallback: count hits from plugins that need working credentials.
    let auth_hits = report
        .findings
        .iter()
        .filter(|f| AUTH_ONLY_PLUGINS.contains(&f.plugin_id))
        .count();
    debug!(auth_hits, "no scan-info verdict, using plugin fallback");
    if auth_hits >= AUTH_FALLBACK_THRESHOLD {
        AuthenticationStatus::Success
    } else {
        AuthenticationStatus::Failed
    }
}

/// Extract `yes` / `no` / `partial` from a line like
/// `Credentialed checks : yes (as 'root' via ssh)`.
fn credentialed_checks_verdict(finding: &Finding) -> Option<String> {
    for line in finding.plugin_output.lines() {
        let lower = line.to_ascii_lowercase();
        let Some(rest) = lower
            .split_once("credentialed checks")
            .and_then(|(_, rest)| rest.split_once(':'))
            .map(|(_, value)| value.trim())
        else {
            continue;
        };
        for verdict in ["yes", "partial", "no"] {
            if rest.starts_with(verdict) {
                return Some(verdict.to_string());
            }
        }
    }
    None
}

fn stats_for(report: &Report, artifact_bytes: u64) -> ReportStats {
    let mut stats = ReportStats {
        hosts: report.hosts.len() as u64,
        artifact_bytes,
        ..Default::default()
    };
    for finding in &report.findings {
        match finding.severity {
            4 => stats.critical += 1,
            3 => stats.high += 1,
            2 => stats.medium += 1,
            1 => stats.low += 1,
            _ => stats.info += 1,
        }
    }
    stats.total = stats.critical + stats.high + stats.medium + stats.low;
    stats
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
