// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: pools, instances, worker, and tunables.
//!
//! A single TOML document describes everything. `${VAR}` references are
//! substituted from the environment at load time, before any consumer
//! sees the tree.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("environment variable not set: {0}")]
    MissingEnv(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One scanner endpoint inside a pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceConfig {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_instance_cap")]
    pub max_concurrent_scans: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub verify_tls: bool,
}

/// A named set of interchangeable instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    /// Pools this worker dequeues from. Empty means every configured pool.
    #[serde(default)]
    pub subscriptions: Vec<String>,
    #[serde(default = "default_worker_cap")]
    pub max_concurrent_scans: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_scan_deadline")]
    pub scan_deadline_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
            max_concurrent_scans: default_worker_cap(),
            poll_interval_seconds: default_poll_interval(),
            scan_deadline_seconds: default_scan_deadline(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_completed_days")]
    pub completed_days: u64,
    #[serde(default = "default_failed_days")]
    pub failed_days: u64,
    #[serde(default = "default_failed_days")]
    pub timeout_days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_days: default_completed_days(),
            failed_days: default_failed_days(),
            timeout_days: default_failed_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdempotencyConfig {
    #[serde(default = "default_idempotency_ttl")]
    pub ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_idempotency_ttl(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_seconds: default_cooldown(),
            success_threshold: default_success_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_pop_timeout")]
    pub pop_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pop_timeout_seconds: default_pop_timeout(),
        }
    }
}

/// The full configuration tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pools: BTreeMap<String, PoolConfig>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Parse a TOML document, substituting `${VAR}` from the environment.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(text)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Pools the worker should dequeue from.
    pub fn subscriptions(&self) -> Vec<String> {
        if self.worker.subscriptions.is_empty() {
            self.pools.keys().cloned().collect()
        } else {
            self.worker.subscriptions.clone()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (pool, pool_config) in &self.pools {
            for (id, instance) in &pool_config.instances {
                if instance.url.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "instance {pool}/{id} has an empty url"
                    )));
                }
                if instance.max_concurrent_scans < 1 {
                    return Err(ConfigError::Invalid(format!(
                        "instance {pool}/{id} must allow at least one concurrent scan"
                    )));
                }
            }
        }
        if self.worker.max_concurrent_scans < 1 {
            return Err(ConfigError::Invalid(
                "worker.max_concurrent_scans must be at least 1".to_string(),
            ));
        }
        if self.worker.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "worker.poll_interval_seconds must be positive".to_string(),
            ));
        }
        for name in &self.worker.subscriptions {
            if !self.pools.contains_key(name) {
                return Err(ConfigError::Invalid(format!(
                    "worker subscribes to unknown pool: {name}"
                )));
            }
        }
        Ok(())
    }
}

/// Replace every `${VAR}` with the environment value.
fn expand_env(text: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let value =
                    std::env::var(name).map_err(|_| ConfigError::MissingEnv(name.to_string()))?;
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn default_instance_cap() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_worker_cap() -> u32 {
    8
}

fn default_poll_interval() -> u64 {
    30
}

fn default_scan_deadline() -> u64 {
    86_400
}

fn default_completed_days() -> u64 {
    7
}

fn default_failed_days() -> u64 {
    30
}

fn default_idempotency_ttl() -> u64 {
    172_800
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown() -> u64 {
    300
}

fn default_success_threshold() -> u32 {
    2
}

fn default_pop_timeout() -> u64 {
    5
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
