use clap::Parser;
use iap_reconciler::config::{EngineConfig, UnmatchedPolicy};
use iap_reconciler::interfaces::csv::script_reader::ScriptReader;
use iap_reconciler::interfaces::scenario::ScenarioRunner;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario script CSV file
    script: PathBuf,

    /// Engine configuration JSON file (optional). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to do with purchases the entitlement check cannot match
    /// (leave-unfinished or finish-and-report)
    #[arg(long)]
    unmatched: Option<UnmatchedPolicy>,

    /// Let purchases through even when the storefront reports payments disabled
    #[arg(long)]
    allow_disabled_payments: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    if let Some(policy) = cli.unmatched {
        config.unmatched_purchases = policy;
    }
    if cli.allow_disabled_payments {
        config.require_payments_enabled = false;
    }

    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = ScriptReader::new(file);
    let mut runner = ScenarioRunner::new(config, io::stdout());
    for (row, step) in reader.steps().enumerate() {
        match step {
            Ok(step) => {
                if let Err(e) = runner.step(&step).await {
                    eprintln!("Error running step {}: {}", row + 1, e);
                }
            }
            Err(e) => {
                eprintln!("Error reading step {}: {}", row + 1, e);
            }
        }
    }

    runner.finish().await.into_diagnostic()?;
    Ok(())
}
