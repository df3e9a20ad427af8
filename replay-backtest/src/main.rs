//! Replay recorded option-chain snapshots for one symbol.
//!
//! # Usage
//!
//! ```bash
//! # Replay SPX from the default parquet store
//! replay-backtest
//!
//! # Another symbol, a JSON recording and a config file
//! replay-backtest SPY --data data/spy_quotes.json --config config/replay.toml
//!
//! # Verbose logging
//! RUST_LOG=replay_backtest=debug replay-backtest SPX --output results/spx
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use replay_backtest::backtest::{
    BacktestError, JsonReportWriter, ReplayConfig, ReplayEngine, StopSignal,
};
use replay_backtest::data::open_store;

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "replay-backtest")]
#[command(about = "Replay recorded options-chain snapshots and score credit-spread signals")]
#[command(version)]
struct Cli {
    /// Underlying symbol to replay
    #[arg(default_value = "SPX")]
    symbol: String,

    /// Snapshot store: a .parquet file, a directory of them, or a .json recording
    #[arg(short, long, default_value = "data/snapshots.parquet")]
    data: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for the report (overrides the config)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replay_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ReplayConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReplayConfig::default(),
    };
    if let Some(output) = cli.output {
        config.output_dir = output;
    }

    let store = open_store(&cli.data)
        .with_context(|| format!("opening snapshot store {}", cli.data.display()))?;
    let writer = JsonReportWriter::new(config.output_dir.clone());
    let engine = ReplayEngine::with_screener(config, store);

    let stop = StopSignal::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current snapshot");
            ctrl_c_stop.stop();
        }
    });

    let symbol = cli.symbol.to_uppercase();
    info!(symbol = %symbol, data = %cli.data.display(), "Replay starting");

    let run_symbol = symbol.clone();
    let outcome =
        tokio::task::spawn_blocking(move || engine.run_and_write(&run_symbol, &stop, &writer))
            .await
            .context("replay task panicked")?;

    match outcome {
        Ok((report, path)) => {
            println!("\n{}", SEPARATOR);
            println!("{}", report.summary_text());
            println!("{}", SEPARATOR);
            println!("Report: {}", path.display());
            Ok(())
        }
        Err(BacktestError::Cancelled { processed, total }) => {
            println!(
                "Replay of {} cancelled at {}/{} snapshots; no report written.",
                symbol, processed, total
            );
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("replay of {} failed", symbol)),
    }
}
