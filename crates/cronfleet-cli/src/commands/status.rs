use std::process::ExitCode;

use serde::Serialize;

use cronfleet_core::{Clock, LeaseRecord, LedgerEntry};
use cronfleet_store::LeaseStore;

use crate::context::CliContext;
use crate::{GlobalOpts, OutputFormat};

#[derive(Debug, Serialize)]
struct StatusView {
    backend: &'static str,
    lease: Option<LeaseRecord>,
    last_active: Option<String>,
    instances: Vec<LedgerEntry>,
    simultaneous_runners: bool,
}

pub fn run(opts: &GlobalOpts, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let ctx = CliContext::load(opts)?;
    let timings = ctx.timings()?;
    let client = ctx.store_client()?;
    let now = ctx.clock.now_secs();

    let mut ledger = client.load_ledger()?.with_staleness(timings.ledger_staleness);
    ledger.prune(now);

    let view = StatusView {
        backend: client.store().backend_name(),
        lease: client.read_lease()?,
        last_active: client.read_last_active()?,
        simultaneous_runners: ledger.has_simultaneous_runners(),
        instances: ledger.list().cloned().collect(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Text => print!("{}", format_text(&view, now)),
    }
    Ok(ExitCode::SUCCESS)
}

fn format_text(view: &StatusView, now: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("store:        {}\n", view.backend));
    match &view.lease {
        Some(lease) => out.push_str(&format!(
            "lease holder: {} (held {}, renewed {} ago)\n",
            lease.holder,
            age(now, lease.acquired_at),
            age(now, lease.renewed_at)
        )),
        None => out.push_str("lease holder: none\n"),
    }
    out.push_str(&format!(
        "last active:  {}\n",
        view.last_active.as_deref().unwrap_or("unknown")
    ));
    if view.simultaneous_runners {
        out.push_str("warning:      more than one instance reports RUNNER\n");
    }

    out.push_str(&format!("\n{:<18} {:<12} {:>10} {:>5}\n", "INSTANCE", "ROLE", "SEEN", "JOBS"));
    for entry in &view.instances {
        let jobs = entry
            .schedule
            .iter()
            .filter(|line| !line.starts_with('#'))
            .count();
        out.push_str(&format!(
            "{:<18} {:<12} {:>10} {:>5}\n",
            entry.address,
            entry.role.label(),
            format!("{} ago", age(now, entry.observed_at)),
            jobs
        ));
    }
    out
}

/// `1h 2m`, `3m 5s`, `12s`.
fn age(now: u64, then: u64) -> String {
    let secs = now.saturating_sub(then);
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}
