// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance failure guard with closed / open / half-open states.

use serde::{Deserialize, Serialize};
use std::fmt;
use sw_core::BreakerConfig;
use tracing::{info, warn};

/// Availability gate state for one scanner instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker tunables, converted once from configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub success_threshold: u32,
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            cooldown_ms: config.cooldown_seconds * 1_000,
            success_threshold: config.success_threshold,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

/// Failure guard for one instance.
///
/// Closed counts consecutive failures up to the threshold, then opens.
/// Open rejects until the cooldown elapses, then admits probes in
/// half-open. Half-open closes after enough consecutive successes and
/// reopens on any failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// `pool/instance`, for log lines only.
    label: String,
    settings: BreakerSettings,
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure_ms: u64,
}

impl CircuitBreaker {
    pub fn new(label: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            label: label.into(),
            settings,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure_ms: 0,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Milliseconds since the last recorded failure, if any.
    pub fn ms_since_last_failure(&self, now_ms: u64) -> Option<u64> {
        (self.last_failure_ms > 0).then(|| now_ms.saturating_sub(self.last_failure_ms))
    }

    /// Whether a call would be admitted right now, without mutating.
    pub fn would_allow(&self, now_ms: u64) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => self.cooldown_elapsed(now_ms),
        }
    }

    /// Gate a call. The first admission after the cooldown moves the
    /// breaker to half-open.
    pub fn allow(&mut self, now_ms: u64) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if self.cooldown_elapsed(now_ms) {
                    self.half_open_successes = 0;
                    self.set_state(BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.settings.success_threshold {
                    self.consecutive_failures = 0;
                    self.set_state(BreakerState::Closed);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&mut self, now_ms: u64) {
        self.last_failure_ms = now_ms;
        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.settings.failure_threshold {
                    self.set_state(BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                self.set_state(BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_failure_ms) >= self.settings.cooldown_ms
    }

    fn set_state(&mut self, to: BreakerState) {
        if self.state == to {
            return;
        }
        if to == BreakerState::Open {
            warn!(
                instance = %self.label,
                failures = self.consecutive_failures,
                "circuit opened"
            );
        } else {
            info!(instance = %self.label, from = %self.state, to = %to, "circuit transition");
        }
        self.state = to;
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
