use std::process::ExitCode;

use cronfleet_core::Role;
use cronfleet_schedule::{materialize, render};

use crate::GlobalOpts;
use crate::context::CliContext;

/// Print the table `role` installs on this instance. No store access.
pub fn run(opts: &GlobalOpts, role: Role) -> anyhow::Result<ExitCode> {
    let ctx = CliContext::load(opts)?;
    let registry = ctx.registry()?;
    let environment = match ctx.address() {
        Ok(address) => ctx.environment(&address),
        Err(_) => ctx.config.instance.environment.unwrap_or_default(),
    };
    let layout = ctx.layout(environment);

    let table = render(&materialize(role, &registry, &layout), &layout);
    print!("{}", table.text);
    eprintln!("sha256: {}", table.digest);
    Ok(ExitCode::SUCCESS)
}
