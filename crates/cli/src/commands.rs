//! Clap command tree for the `txanomaly` binary.

use clap::{Arg, ArgAction, Command};

/// Every scenario name accepted on the command line, plus `all`.
pub const SCENARIO_NAMES: [&str; 6] = [
    "all",
    "non-repeatable-read",
    "phantom-read",
    "serialization-failure",
    "bulk-adjustment",
    "guarded-archive",
];

/// Build the top-level command.
pub fn build_cli() -> Command {
    Command::new("txanomaly")
        .about("Reproduce transaction-isolation anomalies against a transactional store")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("scenarios")
                .value_name("SCENARIO")
                .num_args(0..)
                .value_parser(SCENARIO_NAMES)
                .help("Scenarios to run (default: all)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_parser(["memory", "postgres"])
                .help("Store backend (default: memory)"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Database host"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("Database port"),
        )
        .arg(
            Arg::new("dbname")
                .long("dbname")
                .value_name("NAME")
                .help("Database name"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("USER")
                .help("Database user"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .value_name("PASSWORD")
                .help("Database password"),
        )
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_name("N")
                .help("Rows to seed the memory store with"),
        )
        .arg(
            Arg::new("isolation")
                .long("isolation")
                .short('i')
                .value_name("LEVEL")
                .help("Pin the level under test: read-committed, repeatable-read, serializable"),
        )
        .arg(
            Arg::new("fast")
                .long("fast")
                .action(ArgAction::SetTrue)
                .help("Short delays and timeouts, as used by the test suite"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Log more (-v info, -vv debug, -vvv trace)"),
        )
}
