//! txanomaly CLI: runs the anomaly scenarios and prints a report.
//!
//! ```text
//! txanomaly                                   # every scenario, memory store
//! txanomaly phantom-read --isolation rr       # one family, one level
//! txanomaly --backend postgres --json         # needs the postgres feature
//! ```
//!
//! Exit code 0 only when every scenario matched its expectation and every
//! restoration succeeded; 1 when the run completed with failures; 2 when the
//! harness could not be set up.

mod commands;
mod parse;

use std::process;

use tracing::Level;
use txanomaly::{HarnessBuilder, RunReport};

use commands::build_cli;
use parse::{matches_to_plan, OutputMode, RunPlan};

fn main() {
    let matches = build_cli().get_matches();

    let plan = match matches_to_plan(&matches) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("(error) {}", e);
            process::exit(2);
        }
    };
    init_logging(plan.verbosity);

    let exit_code = run(plan);
    process::exit(exit_code);
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(plan: RunPlan) -> i32 {
    let harness = match HarnessBuilder::from_config(plan.config).build() {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("(error) {}", e);
            return 2;
        }
    };
    let report = harness.run_all(&plan.specs);
    if let Err(e) = print_report(&report, plan.output) {
        eprintln!("(error) {}", e);
        return 2;
    }
    if report.all_passed() {
        0
    } else {
        1
    }
}

fn print_report(report: &RunReport, mode: OutputMode) -> txanomaly::Result<()> {
    match mode {
        OutputMode::Table => print!("{}", report.render_table()),
        OutputMode::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
