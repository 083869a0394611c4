use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use sl_dispatch::{BackendRegistry, TrialDispatcher};
use sl_sweep::{init_logging, Sweep, SweepConfig};

#[derive(Parser)]
#[command(name = "sweepline", version, about = "Asynchronous hyperparameter sweeps over external jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep described by a config file
    Run {
        /// Sweep config (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Override `n_trials` from the config
        #[arg(long)]
        n_trials: Option<usize>,

        /// Print the override sets that would be launched and exit
        #[arg(long)]
        dry_run: bool,

        /// Write the sweep report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            n_trials,
            dry_run,
            output,
        } => run(config, n_trials, dry_run, output).await,
    }
}

async fn run(
    path: PathBuf,
    n_trials: Option<usize>,
    dry_run: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = SweepConfig::load(Some(&path))?;
    if let Some(n) = n_trials {
        config.n_trials = n;
        config.validate()?;
    }
    init_logging(&config.logging)?;

    let mut optimizer = config.optimizer();
    let mut sweep = Sweep::new(config.n_trials);

    if dry_run {
        let sets = sweep.preview(&mut *optimizer, &config.baseline, &config.dispatcher)?;
        for (index, overrides) in sets.iter().enumerate() {
            println!("#{index} : {overrides}");
        }
        return Ok(());
    }

    let registry = BackendRegistry::with_defaults();
    let backend = registry
        .build(&config.backend.kind, &config.backend.params)
        .with_context(|| format!("building backend {:?}", config.backend.kind))?;
    let mut dispatcher = TrialDispatcher::new(backend, &config.baseline, config.dispatcher.clone())?;

    let result = sweep.run(&mut *optimizer, &mut dispatcher).await;
    dispatcher.close().await?;
    let report = result?;

    info!(
        completed = report.trials_completed,
        crashed = report.trials_crashed,
        rejected = report.trials_rejected,
        "sweep finished"
    );

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    match &report.incumbent {
        Some(best) => println!(
            "incumbent: {} (cost {})",
            serde_json::Value::Object(best.trial.configuration.clone()),
            best.cost()
        ),
        None => println!("no successful trial"),
    }
    Ok(())
}
