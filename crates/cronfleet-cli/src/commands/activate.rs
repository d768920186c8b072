use std::process::ExitCode;

use crate::GlobalOpts;
use crate::commands::{exit_code, print_preview, print_report};
use crate::context::CliContext;

pub fn run(opts: &GlobalOpts) -> anyhow::Result<ExitCode> {
    let ctx = CliContext::load(opts)?;
    let address = ctx.address()?;
    let setup = ctx.setup(&address)?;

    let report = setup.orchestrator.activate(&address);
    print_report(&report);
    print_preview(&setup);
    Ok(exit_code(&report))
}
