// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod logs;
pub mod proc;
pub mod registry;
pub mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::{ConfigFile, SupervisorOptions};
use crate::registry::ServiceRegistry;
use crate::supervisor::Supervisor;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor
/// - autostart bootstrapping
/// - Ctrl-C -> shutdown of every running service
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let options = SupervisorOptions::from(&cfg.config);
    let registry = ServiceRegistry::new(cfg.service);
    let supervisor = Arc::new(Supervisor::new(registry, options));

    // Log every status transition; this is also the feed a transport layer
    // would consume.
    {
        let mut status_rx = supervisor.subscribe_status();
        tokio::spawn(async move {
            loop {
                match status_rx.recv().await {
                    Ok(event) => {
                        info!(
                            service = %event.service_id,
                            status = ?event.status,
                            pid = event.pid,
                            error = event.error.as_deref(),
                            "status change"
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "status feed lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // Bootstrap: `autostart` is advisory and consumed here, not by the
    // supervisor core.
    let to_start: Vec<String> = supervisor
        .registry()
        .list()
        .into_iter()
        .filter(|svc| args.all || svc.autostart)
        .map(|svc| svc.id)
        .collect();

    if to_start.is_empty() {
        warn!("no services selected to start (use `autostart = true` or --all)");
    }

    for id in &to_start {
        match supervisor.start(id).await {
            Ok(summary) => {
                forward_logs(&supervisor, &summary.config.id)?;
            }
            Err(e) => warn!(service = %id, error = %e, "failed to start service"),
        }
    }

    info!(started = to_start.len(), "procwatch running; Ctrl-C to shut down");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    supervisor.shutdown_all().await?;
    Ok(())
}

/// Mirror a service's output into the supervisor's own log.
fn forward_logs(supervisor: &Supervisor, id: &str) -> Result<()> {
    let mut sub = supervisor.subscribe_logs(id)?;
    let id = id.to_string();
    tokio::spawn(async move {
        while let Some(entry) = sub.recv().await {
            info!(service = %id, stream = ?entry.stream, "{}", entry.data);
        }
    });
    Ok(())
}

/// Simple dry-run output: print services and their commands.
fn print_dry_run(cfg: &ConfigFile) {
    println!("procwatch dry-run");
    println!("  config.grace_period_secs = {}", cfg.config.grace_period_secs);
    println!(
        "  config.log_buffer_capacity = {}",
        cfg.config.log_buffer_capacity
    );
    println!();

    println!("services ({}):", cfg.service.len());
    for svc in cfg.service.iter() {
        println!("  - {} ({})", svc.id, svc.display_name());
        println!("      command: {}", svc.command);
        if let Some(ref dir) = svc.dir {
            println!("      dir: {}", dir.display());
        }
        if !svc.env.is_empty() {
            let mut keys: Vec<&str> = svc.env.keys().map(String::as_str).collect();
            keys.sort_unstable();
            println!("      env: {keys:?}");
        }
        if svc.autostart {
            println!("      autostart: true");
        }
    }
}
