use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use fintrack_cli::{Scenario, replay};
use fintrack_events::{EventBus, EventEnvelope, InMemoryEventBus};
use fintrack_infra::{InMemoryLedgerStore, LedgerConfig, LedgerService};
use fintrack_ledger::LedgerEvent;
use fintrack_observability::tracing::LogFormat;

#[derive(Parser)]
#[command(name = "fintrack-replay")]
#[command(about = "Replay a ledger scenario against an in-memory store and print the outcome as JSON")]
#[command(version)]
struct Cli {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Pool configuration file; takes precedence over the scenario's own config,
    /// which in turn takes precedence over FINTRACK_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log format on stderr (json or pretty); JSON when omitted
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Include published notifications in the report
    #[arg(long)]
    events: bool,

    /// Single-line JSON output
    #[arg(long)]
    compact: bool,

    /// Exit with status 1 if any step failed
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    match cli.log_format {
        Some(format) => fintrack_observability::tracing::init(format),
        None => fintrack_observability::init(),
    }

    let raw = std::fs::read_to_string(&cli.scenario)
        .with_context(|| format!("failed to read scenario {}", cli.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse scenario {}", cli.scenario.display()))?;

    let config = match (&cli.config, &scenario.config) {
        (Some(path), _) => LedgerConfig::from_path(path)?,
        (None, Some(config)) => {
            config.validate()?;
            config.clone()
        }
        (None, None) => LedgerConfig::from_env()?,
    };
    tracing::info!(pools = config.pools.len(), steps = scenario.steps.len(), "replaying scenario");

    let bus: InMemoryEventBus<EventEnvelope<LedgerEvent>> = InMemoryEventBus::new();
    let subscription = bus.subscribe();
    let service = LedgerService::new(InMemoryLedgerStore::new(), bus, config);

    let mut report = replay(&service, &scenario).context("replay aborted by a storage failure")?;
    if cli.events {
        report.events = subscription.drain();
    }

    let out = if cli.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{out}");

    if cli.strict && !report.all_ok() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
