//! Long-running mode: one tick per poll interval until Ctrl-C.
//!
//! The loop replaces the per-minute listener row, so standbys install a
//! table without it and the two never tick concurrently. RUNNER jobs are
//! still fired by the local cron daemon.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::GlobalOpts;
use crate::commands::print_report;
use crate::context::CliContext;

pub async fn run(opts: &GlobalOpts) -> anyhow::Result<ExitCode> {
    let ctx = CliContext::load(opts)?.polled_in_process();
    let address = ctx.address()?;
    let interval = ctx.timings()?.poll_interval;
    let setup = Arc::new(ctx.setup(&address)?);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!(%address, interval_secs = interval.as_secs(), "watch started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let setup = Arc::clone(&setup);
                let address = address.clone();
                // Store and installer calls block; keep them off the runtime.
                match tokio::task::spawn_blocking(move || setup.orchestrator.activate(&address)).await {
                    Ok(report) => print_report(&report),
                    Err(e) => warn!(error = %e, "tick task failed"),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    info!("watch stopped");
    Ok(ExitCode::SUCCESS)
}
