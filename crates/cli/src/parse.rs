//! ArgMatches → RunPlan conversion.
//!
//! Loads the configuration file when one is given, applies the flag
//! overrides on top of it, and expands the scenario names into specs.

use clap::ArgMatches;
use txanomaly::{
    Backend, HarnessConfig, HarnessSettings, IsolationLevel, ScenarioKind, ScenarioSpec,
};

/// How the report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Aligned table with per-role detail lines
    Table,
    /// Pretty-printed JSON
    Json,
}

/// Everything `main` needs to run.
#[derive(Debug)]
pub struct RunPlan {
    pub config: HarnessConfig,
    pub specs: Vec<ScenarioSpec>,
    pub output: OutputMode,
    pub verbosity: u8,
}

/// Convert clap ArgMatches into a RunPlan.
pub fn matches_to_plan(matches: &ArgMatches) -> Result<RunPlan, String> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => HarnessConfig::load(path).map_err(|e| e.to_string())?,
        None => HarnessConfig::default(),
    };
    apply_store_overrides(matches, &mut config)?;
    if matches.get_flag("fast") {
        config.harness = HarnessSettings::fast();
    }

    let isolation = matches
        .get_one::<String>("isolation")
        .map(|s| s.parse::<IsolationLevel>())
        .transpose()?;
    let specs = selected_kinds(matches)?
        .into_iter()
        .flat_map(|kind| kind.default_specs(isolation))
        .collect();

    let output = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Table
    };

    Ok(RunPlan {
        config,
        specs,
        output,
        verbosity: matches.get_count("verbose"),
    })
}

// =========================================================================
// Store
// =========================================================================

fn apply_store_overrides(matches: &ArgMatches, config: &mut HarnessConfig) -> Result<(), String> {
    let store = &mut config.store;
    if let Some(backend) = matches.get_one::<String>("backend") {
        store.backend = backend.parse::<Backend>()?;
    }
    if let Some(host) = matches.get_one::<String>("host") {
        store.host = host.clone();
    }
    if let Some(port) = matches.get_one::<String>("port") {
        store.port = port
            .parse::<u16>()
            .map_err(|e| format!("Invalid port '{}': {}", port, e))?;
    }
    if let Some(dbname) = matches.get_one::<String>("dbname") {
        store.dbname = dbname.clone();
    }
    if let Some(user) = matches.get_one::<String>("user") {
        store.user = user.clone();
    }
    if let Some(password) = matches.get_one::<String>("password") {
        store.password = password.clone();
    }
    if let Some(rows) = matches.get_one::<String>("rows") {
        store.seed_rows = rows
            .parse::<usize>()
            .map_err(|e| format!("Invalid row count '{}': {}", rows, e))?;
    }
    Ok(())
}

// =========================================================================
// Scenarios
// =========================================================================

/// Scenario families in the order they were named, without repeats.
/// No names, or `all` anywhere, selects every family.
fn selected_kinds(matches: &ArgMatches) -> Result<Vec<ScenarioKind>, String> {
    let names: Vec<&String> = matches
        .get_many::<String>("scenarios")
        .map(|values| values.collect())
        .unwrap_or_default();
    if names.is_empty() || names.iter().any(|n| n.as_str() == "all") {
        return Ok(ScenarioKind::ALL.to_vec());
    }
    let mut kinds = Vec::new();
    for name in names {
        let kind = name.parse::<ScenarioKind>().map_err(|e| e.to_string())?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
