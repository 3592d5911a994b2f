// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! castrelay daemon entry point.
//!
//! # Usage
//!
//! ```bash
//! # Default configuration path (./appsettings.json)
//! castrelay
//!
//! # Explicit configuration path
//! castrelay /etc/castrelay/appsettings.json
//! ```
//!
//! A missing configuration file is seeded with a commented example and
//! the process exits non-zero without starting the relay. Verbosity is
//! controlled through `RUST_LOG` (default `info`).

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use clap::Parser;

use castrelay::{Relay, RelayConfig, RelayError};

/// Cross-subnet relay for home audio discovery traffic
#[derive(Parser, Debug)]
#[command(name = "castrelay")]
#[command(version)]
#[command(about = "Relays RAAT/AirPlay/SSDP/Squeezebox discovery across subnets")]
struct Args {
    /// Configuration file path
    #[arg(default_value = "./appsettings.json")]
    config: PathBuf,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    if !args.config.exists() {
        match RelayConfig::write_example(&args.config) {
            Ok(()) => eprintln!(
                "no configuration found; wrote an example to {} - edit it and start again",
                args.config.display()
            ),
            Err(err) => eprintln!(
                "no configuration found and writing an example to {} failed: {}",
                args.config.display(),
                err
            ),
        }
        std::process::exit(2);
    }

    if let Err(err) = run(&args.config) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(config_path: &Path) -> Result<(), RelayError> {
    let settings = RelayConfig::load(config_path)?.resolve()?;
    let site = settings.site_name.clone();

    let relay = Relay::start(settings)?;
    log::info!("[{}] {} worker(s) up", site, relay.worker_count());

    // Workers are daemon-like; the main thread just parks on the
    // signal. On shutdown they terminate with the process.
    let (tx, rx) = mpsc::channel::<()>();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        log::warn!("[{}] could not install signal handler: {}", site, err);
    }

    let _ = rx.recv();
    log::info!("[{}] shutdown signal received, exiting", relay.context().site_name);
    Ok(())
}
