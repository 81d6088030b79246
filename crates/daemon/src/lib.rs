// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-daemon: process lifecycle for the scanwarden daemon (swd).
//!
//! Wires the registry, queue, store, worker, and housekeeper together;
//! owns signal handling (SIGHUP config reload, SIGTERM/SIGINT graceful
//! shutdown) and logging setup.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use sw_api::Orchestrator;
use sw_backends::NessusBackendFactory;
use sw_core::{Config, ConfigError, CredentialVault, SystemClock};
use sw_engine::{Worker, WorkerSettings};
use sw_queue::{IdempotencyStore, TaskQueue};
use sw_registry::ScannerRegistry;
use sw_store::{Housekeeper, RetentionWindows, TaskManager, TaskStore};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Interval between retention sweeps.
const HOUSEKEEPER_INTERVAL: Duration = Duration::from_secs(3_600);

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] sw_store::StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] sw_queue::QueueError),
    #[error("idempotency store error: {0}")]
    Idempotency(#[from] sw_queue::IdempotencyError),
    #[error("another daemon already holds {0}")]
    LockFailed(PathBuf),
}

/// Filesystem layout for one daemon.
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
}

impl Paths {
    /// Resolve from an explicit config path, the environment, or the
    /// XDG state directory.
    pub fn resolve(config_path: Option<PathBuf>) -> Self {
        let state_dir = std::env::var_os("SCANWARDEN_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);
        let config_path = config_path
            .or_else(|| std::env::var_os("SCANWARDEN_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| state_dir.join("scanwarden.toml"));
        Self {
            log_path: state_dir.join("daemon.log"),
            lock_path: state_dir.join("daemon.pid"),
            state_dir,
            config_path,
        }
    }
}

fn default_state_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("scanwarden");
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/state/scanwarden")
}

/// A fully wired daemon, ready to run.
pub struct Daemon {
    pub orchestrator: Arc<Orchestrator<SystemClock>>,
    registry: Arc<ScannerRegistry<SystemClock>>,
    worker: Arc<Worker<NessusBackendFactory, SystemClock>>,
    housekeeper: Arc<Housekeeper<SystemClock>>,
    config_path: PathBuf,
    // NOTE(lifetime): held to maintain the exclusive daemon lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Build every component from configuration and on-disk state.
pub fn startup(paths: &Paths) -> Result<Daemon, DaemonError> {
    std::fs::create_dir_all(&paths.state_dir)?;
    let lock_file = acquire_lock(&paths.lock_path)?;

    let config = Config::load(&paths.config_path)?;
    let clock = SystemClock;

    let registry = Arc::new(ScannerRegistry::new(&config.breaker, clock));
    registry.load(&config.pools);

    let queue = Arc::new(TaskQueue::open(
        &paths.state_dir.join("queue").join("queue.journal"),
    )?);
    let idempotency = Arc::new(IdempotencyStore::open(
        &paths.state_dir.join("idempotency.json"),
        config.idempotency.ttl_seconds * 1_000,
    )?);
    let manager = Arc::new(TaskManager::new(
        TaskStore::open(&paths.state_dir.join("tasks"))?,
        clock,
    ));
    let vault = Arc::new(CredentialVault::new());

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        queue.clone(),
        idempotency,
        manager.clone(),
        vault.clone(),
        clock,
    ));
    let worker = Arc::new(Worker::new(
        registry.clone(),
        queue,
        manager.clone(),
        vault,
        Arc::new(NessusBackendFactory::new()),
        WorkerSettings::from_config(&config),
        clock,
    ));
    let housekeeper = Arc::new(Housekeeper::new(
        manager,
        RetentionWindows::from(&config.retention),
        clock,
    ));

    Ok(Daemon {
        orchestrator,
        registry,
        worker,
        housekeeper,
        config_path: paths.config_path.clone(),
        lock_file,
    })
}

fn acquire_lock(lock_path: &Path) -> Result<File, DaemonError> {
    let mut file = File::create(lock_path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(DaemonError::LockFailed(lock_path.to_path_buf()));
    }
    let _ = writeln!(file, "{}", std::process::id());
    Ok(file)
}

impl Daemon {
    /// Run until SIGTERM/SIGINT. SIGHUP reloads the scanner pool table.
    pub async fn run(self) -> Result<(), DaemonError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker_handle = tokio::spawn(self.worker.clone().run(shutdown_rx.clone()));

        let housekeeper = self.housekeeper.clone();
        let mut housekeeper_shutdown = shutdown_rx.clone();
        let housekeeper_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HOUSEKEEPER_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = housekeeper.sweep() {
                            warn!(%error, "retention sweep failed");
                        }
                    }
                    _ = housekeeper_shutdown.changed() => break,
                }
            }
        });

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        info!("daemon started");
        loop {
            tokio::select! {
                _ = sighup.recv() => self.reload(),
                _ = sigterm.recv() => break,
                _ = sigint.recv() => break,
            }
        }

        info!("shutting down, waiting for in-flight scans to park");
        let _ = shutdown_tx.send(true);
        let _ = worker_handle.await;
        let _ = housekeeper_handle.await;
        Ok(())
    }

    /// Atomically replace the scanner pool table from the config file.
    /// In-flight scans continue against their assigned instances.
    fn reload(&self) {
        info!(config = %self.config_path.display(), "reloading configuration");
        match Config::load(&self.config_path) {
            Ok(config) => self.registry.load(&config.pools),
            Err(error) => error!(%error, "config reload failed, keeping previous pool table"),
        }
    }
}

/// Install the tracing subscriber: env-filtered, written to the daemon
/// log without blocking the runtime.
pub fn setup_logging(log_path: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard, DaemonError> {
    let directory = log_path.parent().unwrap_or(Path::new("."));
    let file_name = log_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "daemon.log".to_string());
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
