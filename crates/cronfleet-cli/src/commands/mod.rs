pub mod activate;
pub mod deactivate;
pub mod render;
pub mod status;
pub mod watch;

use std::process::ExitCode;

use cronfleet_lease::TickReport;

use crate::context::Setup;

/// One-line summary plus one line per fault.
pub fn print_report(report: &TickReport) {
    println!(
        "{}: {} ({})",
        report.address, report.role, report.transition
    );
    for fault in &report.faults {
        println!("  fault: {fault}");
    }
}

/// For dry runs, the table the tick would have left installed.
pub fn print_preview(setup: &Setup) {
    let Some(preview) = &setup.preview else {
        return;
    };
    match cronfleet_schedule::Installer::installed(preview.as_ref()) {
        Ok(Some(table)) => {
            println!("--- dry run: resulting table ---");
            for line in &table.lines {
                println!("{line}");
            }
        }
        Ok(None) => println!("--- dry run: no table installed ---"),
        Err(e) => eprintln!("dry run: {e}"),
    }
}

pub fn exit_code(report: &TickReport) -> ExitCode {
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
