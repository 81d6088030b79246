// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CIDR-aware matching between a target query and a stored targets string.
//!
//! A stored `targets` value is a comma-separated list of IPs, dash ranges,
//! and CIDRs (hostnames pass through as text). The query matches when any
//! element overlaps it numerically, with case-insensitive substring as the
//! hostname fallback.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    /// A single IP or a CIDR, held as an inclusive numeric interval.
    Interval { v4: bool, start: u128, end: u128 },
    Text(String),
}

fn ip_to_u128(ip: IpAddr) -> (bool, u128) {
    match ip {
        IpAddr::V4(v4) => (true, u128::from(u32::from(v4))),
        IpAddr::V6(v6) => (false, u128::from(v6)),
    }
}

fn net_interval(net: IpNetwork) -> Expr {
    match net {
        IpNetwork::V4(n) => {
            let base = u128::from(u32::from(n.network()));
            let span = if n.prefix() >= 32 {
                0
            } else {
                (1u128 << (32 - u32::from(n.prefix()))) - 1
            };
            Expr::Interval {
                v4: true,
                start: base,
                end: base + span,
            }
        }
        IpNetwork::V6(n) => {
            let base = u128::from(n.network());
            let span = if n.prefix() >= 128 {
                0
            } else {
                (1u128 << (128 - u32::from(n.prefix()))) - 1
            };
            Expr::Interval {
                v4: false,
                start: base,
                end: base + span,
            }
        }
    }
}

fn parse(raw: &str) -> Expr {
    let trimmed = raw.trim();
    if let Ok(net) = trimmed.parse::<IpNetwork>() {
        return net_interval(net);
    }
    if let Some((lo, hi)) = trimmed.split_once('-') {
        if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<IpAddr>(), hi.trim().parse::<IpAddr>()) {
            let (lo_v4, lo_n) = ip_to_u128(lo);
            let (hi_v4, hi_n) = ip_to_u128(hi);
            if lo_v4 == hi_v4 && lo_n <= hi_n {
                return Expr::Interval {
                    v4: lo_v4,
                    start: lo_n,
                    end: hi_n,
                };
            }
        }
    }
    Expr::Text(trimmed.to_ascii_lowercase())
}

fn overlaps(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (
            Expr::Interval {
                v4: af,
                start: a0,
                end: a1,
            },
            Expr::Interval {
                v4: bf,
                start: b0,
                end: b1,
            },
        ) => af == bf && a0.max(b0) <= a1.min(b1),
        (Expr::Text(a), Expr::Text(b)) => a.contains(b.as_str()) || b.contains(a.as_str()),
        _ => false,
    }
}

/// Whether the query (IP, CIDR, range, or hostname fragment) matches any
/// element of the stored targets string.
pub fn target_matches(query: &str, targets: &str) -> bool {
    let query = parse(query);
    targets
        .split(',')
        .filter(|raw| !raw.trim().is_empty())
        .any(|raw| overlaps(&parse(raw), &query))
}

#[cfg(test)]
#[path = "cidr_tests.rs"]
mod tests;
