// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scanwarden Daemon (swd)
//!
//! Background process that owns the scan queues and drives the scanner
//! pool. The MCP tool-dispatch layer consumes the orchestrator this
//! daemon exposes as a library.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;

use sw_daemon::{setup_logging, startup, Paths};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("swd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("swd {}", env!("CARGO_PKG_VERSION"));
                println!("Scanwarden Daemon - drives vulnerability scans against a scanner pool");
                println!();
                println!("USAGE:");
                println!("    swd [--config PATH]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config PATH    Configuration file (default: $SCANWARDEN_CONFIG");
                println!("                         or <state-dir>/scanwarden.toml)");
                println!("    -h, --help           Print help information");
                println!("    -v, --version        Print version information");
                println!();
                println!("SIGNALS:");
                println!("    SIGHUP               Reload the scanner pool configuration");
                println!("    SIGTERM, SIGINT      Graceful shutdown");
                return Ok(());
            }
            "--config" | "-c" => {
                let Some(path) = args.next() else {
                    eprintln!("error: --config requires a path");
                    std::process::exit(1);
                };
                config_path = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: swd [--config PATH | --help | --version]");
                std::process::exit(1);
            }
        }
    }

    let paths = Paths::resolve(config_path);
    std::fs::create_dir_all(&paths.state_dir)?;
    let _log_guard = setup_logging(&paths.log_path)?;

    info!(
        state_dir = %paths.state_dir.display(),
        config = %paths.config_path.display(),
        "starting scanwarden daemon"
    );

    let daemon = match startup(&paths) {
        Ok(daemon) => daemon,
        Err(error) => {
            error!(%error, "startup failed");
            eprintln!("swd: startup failed: {error}");
            std::process::exit(1);
        }
    };

    daemon.run().await?;
    info!("daemon exited cleanly");
    Ok(())
}
