// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load-aware scanner instance selection with hot reload.
//!
//! The pool table is replaced atomically on reload; per-instance
//! `active_scans` counters survive the swap for instances that keep their
//! name, so in-flight work stays accounted for.

use crate::breaker::{BreakerSettings, BreakerState, CircuitBreaker};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use sw_core::{BreakerConfig, Clock, InstanceConfig, PoolConfig};
use thiserror::Error;
use tracing::{error, info};

/// Why no instance could be handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    /// Retryable: every instance is busy, disabled, or circuit-broken.
    #[error("no instance with free capacity in pool {0}")]
    NoCapacity(String),
    /// Fatal for the request: the pool does not exist.
    #[error("unknown pool: {0}")]
    UnknownPool(String),
}

/// Read-only view of one instance, for snapshots and metrics.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceView {
    pub pool: String,
    pub id: String,
    pub url: String,
    pub enabled: bool,
    pub active: u32,
    pub cap: u32,
    pub utilization: f64,
    pub breaker: BreakerState,
}

struct Slot {
    config: InstanceConfig,
    active: AtomicU32,
}

type PoolTable = BTreeMap<String, Arc<Slot>>;

/// Declarative pool map overlaid with live capacity accounting.
///
/// The circuit-breaker board lives here too, so selection and the worker
/// consult the same guard per instance.
pub struct ScannerRegistry<C: Clock> {
    pools: RwLock<BTreeMap<String, PoolTable>>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    breaker_settings: BreakerSettings,
    clock: C,
}

impl<C: Clock> ScannerRegistry<C> {
    pub fn new(breaker: &BreakerConfig, clock: C) -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            breakers: Mutex::new(HashMap::new()),
            breaker_settings: BreakerSettings::from(breaker),
            clock,
        }
    }

    /// Replace the pool table atomically.
    ///
    /// Active-scan counts carry over to same-named instances; breakers for
    /// vanished instances are dropped.
    pub fn load(&self, pools: &BTreeMap<String, PoolConfig>) {
        let mut next: BTreeMap<String, PoolTable> = BTreeMap::new();
        {
            let current = self.pools.read();
            for (pool_name, pool_config) in pools {
                let mut table = PoolTable::new();
                for (id, instance) in &pool_config.instances {
                    let carried = current
                        .get(pool_name)
                        .and_then(|t| t.get(id))
                        .map(|slot| slot.active.load(Ordering::SeqCst))
                        .unwrap_or(0);
                    table.insert(
                        id.clone(),
                        Arc::new(Slot {
                            config: instance.clone(),
                            active: AtomicU32::new(carried),
                        }),
                    );
                }
                next.insert(pool_name.clone(), table);
            }
        }

        let instance_count: usize = next.values().map(|t| t.len()).sum();
        *self.pools.write() = next;
        self.breakers
            .lock()
            .retain(|label, _| match label.split_once('/') {
                Some((pool, id)) => pools
                    .get(pool)
                    .is_some_and(|p| p.instances.contains_key(id)),
                None => false,
            });
        info!(pools = pools.len(), instances = instance_count, "registry loaded");
    }

    pub fn contains_pool(&self, pool: &str) -> bool {
        self.pools.read().contains_key(pool)
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }

    /// Whether the pool has any enabled instance at all, busy or not.
    pub fn has_enabled_instances(&self, pool: &str) -> bool {
        self.pools
            .read()
            .get(pool)
            .is_some_and(|table| table.values().any(|slot| slot.config.enabled))
    }

    /// Pick the enabled, non-open-circuit instance with the lowest
    /// utilization ratio; ties break on lexicographic instance id.
    ///
    /// Selection does not reserve. Callers follow up with [`Self::reserve`]
    /// and may re-select if the reservation race is lost.
    pub fn select(&self, pool: &str) -> Result<String, SelectError> {
        let now_ms = self.clock.epoch_ms();
        let pools = self.pools.read();
        let table = pools
            .get(pool)
            .ok_or_else(|| SelectError::UnknownPool(pool.to_string()))?;

        let breakers = self.breakers.lock();
        let mut best: Option<(&str, u32, u32)> = None;
        for (id, slot) in table.iter() {
            if !slot.config.enabled {
                continue;
            }
            let admitted = breakers
                .get(&label(pool, id))
                .map(|b| b.would_allow(now_ms))
                .unwrap_or(true);
            if !admitted {
                continue;
            }
            let cap = slot.config.max_concurrent_scans;
            let active = slot.active.load(Ordering::SeqCst);
            if active >= cap {
                continue;
            }
            // active/cap < best_active/best_cap, cross-multiplied to stay
            // in integers. BTreeMap order makes the first minimum win.
            let better = match best {
                None => true,
                Some((_, best_active, best_cap)) => {
                    (active as u64) * (best_cap as u64) < (best_active as u64) * (cap as u64)
                }
            };
            if better {
                best = Some((id, active, cap));
            }
        }

        best.map(|(id, _, _)| id.to_string())
            .ok_or_else(|| SelectError::NoCapacity(pool.to_string()))
    }

    /// Atomically take one unit of capacity on the instance.
    pub fn reserve(&self, pool: &str, id: &str) -> Result<(), SelectError> {
        let pools = self.pools.read();
        let slot = pools
            .get(pool)
            .ok_or_else(|| SelectError::UnknownPool(pool.to_string()))?
            .get(id)
            .ok_or_else(|| SelectError::NoCapacity(pool.to_string()))?;

        let cap = slot.config.max_concurrent_scans;
        let mut active = slot.active.load(Ordering::SeqCst);
        loop {
            if active >= cap {
                return Err(SelectError::NoCapacity(pool.to_string()));
            }
            match slot.active.compare_exchange(
                active,
                active + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => active = observed,
            }
        }
    }

    /// Return one unit of capacity. Releasing below zero is a programming
    /// error: it is logged and the counter saturates at zero.
    pub fn release(&self, pool: &str, id: &str) {
        let pools = self.pools.read();
        let Some(slot) = pools.get(pool).and_then(|table| table.get(id)) else {
            // Instance removed by a reload while the scan was in flight.
            info!(pool, instance = id, "released capacity on retired instance");
            return;
        };

        let mut active = slot.active.load(Ordering::SeqCst);
        loop {
            if active == 0 {
                error!(pool, instance = id, "excess capacity release");
                return;
            }
            match slot.active.compare_exchange(
                active,
                active - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(observed) => active = observed,
            }
        }
    }

    /// Read-only view over every instance.
    pub fn snapshot(&self) -> Vec<InstanceView> {
        let pools = self.pools.read();
        let breakers = self.breakers.lock();
        let mut views = Vec::new();
        for (pool, table) in pools.iter() {
            for (id, slot) in table.iter() {
                let active = slot.active.load(Ordering::SeqCst);
                let cap = slot.config.max_concurrent_scans;
                views.push(InstanceView {
                    pool: pool.clone(),
                    id: id.clone(),
                    url: slot.config.url.clone(),
                    enabled: slot.config.enabled,
                    active,
                    cap,
                    utilization: f64::from(active) / f64::from(cap.max(1)),
                    breaker: breakers
                        .get(&label(pool, id))
                        .map(|b| b.state())
                        .unwrap_or(BreakerState::Closed),
                });
            }
        }
        views
    }

    /// Declarative config for one instance (for backend construction).
    pub fn instance_config(&self, pool: &str, id: &str) -> Option<InstanceConfig> {
        self.pools
            .read()
            .get(pool)
            .and_then(|table| table.get(id))
            .map(|slot| slot.config.clone())
    }

    /// Gate a scan against the instance's breaker. Admission after the
    /// cooldown moves the breaker to half-open.
    pub fn breaker_allow(&self, pool: &str, id: &str) -> bool {
        let now_ms = self.clock.epoch_ms();
        let mut breakers = self.breakers.lock();
        self.breaker_entry(&mut breakers, pool, id).allow(now_ms)
    }

    pub fn record_success(&self, pool: &str, id: &str) {
        let mut breakers = self.breakers.lock();
        self.breaker_entry(&mut breakers, pool, id).record_success();
    }

    pub fn record_failure(&self, pool: &str, id: &str) {
        let now_ms = self.clock.epoch_ms();
        let mut breakers = self.breakers.lock();
        self.breaker_entry(&mut breakers, pool, id)
            .record_failure(now_ms);
    }

    pub fn breaker_state(&self, pool: &str, id: &str) -> BreakerState {
        self.breakers
            .lock()
            .get(&label(pool, id))
            .map(|b| b.state())
            .unwrap_or(BreakerState::Closed)
    }

    fn breaker_entry<'a>(
        &self,
        breakers: &'a mut HashMap<String, CircuitBreaker>,
        pool: &str,
        id: &str,
    ) -> &'a mut CircuitBreaker {
        breakers
            .entry(label(pool, id))
            .or_insert_with(|| CircuitBreaker::new(label(pool, id), self.breaker_settings))
    }
}

fn label(pool: &str, id: &str) -> String {
    format!("{pool}/{id}")
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
