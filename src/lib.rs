// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod deploy;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod process;
pub mod registry;
pub mod retry;
pub mod types;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigFile, LoadOutcome, load_or_scaffold};
use crate::deploy::DeployContext;
use crate::engine::{Engine, EventSource, WorkerReport};
use crate::fs::{FileSystem, RealFileSystem};
use crate::process::{SysinfoTable, SystemProcessController};
use crate::registry::WatchRuleRegistry;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (or scaffolding a template on first run)
/// - rule activation against the real filesystem
/// - the directory workers and the file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = match load_or_scaffold(&args.config)? {
        LoadOutcome::Loaded(cfg) => cfg,
        LoadOutcome::Scaffolded(path) => {
            println!("A default config was written to {}.", path.display());
            println!("Edit the [settings] section to describe your deployments, then run again.");
            return Ok(());
        }
    };

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let settings = Arc::new(cfg.settings.clone());
    let processes = Arc::new(SystemProcessController::new(
        SysinfoTable::new(),
        Arc::clone(&clock),
        settings.kill_retry,
    ));

    let (registry, rejected) = WatchRuleRegistry::activate(cfg.rules.clone(), fs.as_ref());
    let skipped = cfg.skipped.len() + rejected.len();
    if registry.is_empty() {
        warn!(skipped, "no usable rules; nothing to do");
        return Ok(());
    }
    info!(active = registry.len(), skipped, "rules loaded");

    let ctx = DeployContext {
        fs,
        processes,
        clock,
        settings,
    };

    if args.once {
        let engine = Engine::start(&registry, &ctx, EventSource::Closed)?;
        log_summary(&engine.finish().await);
        return Ok(());
    }

    let mut engine = Engine::start(&registry, &ctx, EventSource::Notify)?;
    let interrupted = tokio::select! {
        _ = engine.wait_for_sweep() => {
            info!("startup sweep complete; watching for changes");
            false
        }
        _ = ctrl_c() => true,
    };
    if !interrupted {
        ctrl_c().await;
    }

    log_summary(&engine.shutdown().await);
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; stopping");
        return;
    }
    info!("Ctrl+C received");
}

fn log_summary(reports: &[WorkerReport]) {
    let total = |f: fn(&WorkerReport) -> usize| reports.iter().map(f).sum::<usize>();
    info!(
        deployed = total(|r| r.deployed),
        up_to_date = total(|r| r.up_to_date),
        failed = total(|r| r.failed),
        discarded = total(|r| r.discarded),
        "autodeploy stopped"
    );
}

/// Simple dry-run output: print timings and rules.
fn print_dry_run(cfg: &ConfigFile) {
    let s = &cfg.settings;
    println!("autodeploy dry-run");
    println!("  config.debounce = {:?}", s.debounce);
    println!("  config.settle_delay = {:?}", s.settle_delay);
    println!("  config.lock_wait_timeout = {:?}", s.lock_wait_timeout);
    println!("  config.lock_poll = {:?}", s.lock_poll);
    println!(
        "  config.remove_retry = {} x {:?}",
        s.remove_retry.max_attempts, s.remove_retry.backoff
    );
    println!(
        "  config.kill_retry = {} x {:?}",
        s.kill_retry.max_attempts, s.kill_retry.backoff
    );
    if !s.never_restart.is_empty() {
        println!("  config.never_restart = {:?}", s.never_restart);
    }
    println!();

    println!("rules ({}):", cfg.rules.len());
    for rule in &cfg.rules {
        println!("  - {}", rule.name);
        println!("      process: {}", rule.process_name);
        println!("      source: {}", rule.source_path.display());
        println!("      target: {}", rule.target_path.display());
        if let Some(ref companion) = rule.companion_process {
            println!("      companion: {companion}");
        }
    }

    if !cfg.skipped.is_empty() {
        println!();
        println!("skipped ({}):", cfg.skipped.len());
        for skipped in &cfg.skipped {
            println!("  - {}: {}", skipped.name, skipped.reason);
        }
    }
}
