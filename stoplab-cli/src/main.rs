//! StopLab CLI — replay bar files through the position engine.
//!
//! Commands:
//! - `replay` — run one or more CSV bar files through a configured engine and
//!   print one JSON line per action followed by a summary line per file
//! - `check-config` — validate a TOML engine config and print its fingerprint

mod input;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use stoplab_core::domain::{Action, ScriptedSignals};
use stoplab_core::engine::{run_replay, PaperAccount, PaperGateway, ReplaySummary};
use stoplab_core::{Engine, EngineConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stoplab",
    about = "StopLab CLI — position sizing, protective stops and hedge locks over bar replays"
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay CSV bar files (time,open,high,low,close,volume,signal[,atr]).
    Replay {
        /// Path to a TOML engine config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Starting account balance for the paper gateway.
        #[arg(long, default_value_t = 10_000.0)]
        initial_balance: f64,

        /// Include the per-bar equity curve in the output.
        #[arg(long, default_value_t = false)]
        equity_curve: bool,

        /// Bar files, replayed independently and in parallel.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate a TOML engine config and print its fingerprint.
    CheckConfig {
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Replay {
            config,
            initial_balance,
            equity_curve,
            files,
        } => run_replay_command(config.as_deref(), initial_balance, equity_curve, &files),
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::from_file(p)?,
        None => EngineConfig::default(),
    };
    config.validate().context("invalid engine config")?;
    Ok(config)
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    let fingerprint = config.fingerprint()?;
    println!("{}", config.to_toml_string()?);
    println!("# fingerprint: {fingerprint}");
    Ok(())
}

#[derive(Serialize)]
struct ActionLine<'a> {
    file: &'a str,
    action: Action,
}

/// Summary line printed after a file's actions.
#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    #[serde(flatten)]
    summary: &'a ReplaySummary,
    net_pnl: f64,
    win_rate: Option<f64>,
}

fn run_replay_command(
    config_path: Option<&Path>,
    initial_balance: f64,
    keep_curve: bool,
    files: &[PathBuf],
) -> Result<()> {
    let config = load_config(config_path)?;
    info!(files = files.len(), initial_balance, "starting replay");

    let results: Vec<(PathBuf, Result<ReplaySummary>)> = files
        .par_iter()
        .map(|path| (path.clone(), replay_file(&config, initial_balance, path)))
        .collect();

    let mut failures = 0usize;
    for (path, result) in results {
        match result {
            Ok(mut summary) => {
                let file = path.display().to_string();
                for action in std::mem::take(&mut summary.actions) {
                    let line = ActionLine {
                        file: &file,
                        action,
                    };
                    println!("{}", serde_json::to_string(&line)?);
                }
                if !keep_curve {
                    summary.equity_curve.clear();
                }
                let report = FileReport {
                    file,
                    net_pnl: summary.net_pnl(),
                    win_rate: summary.win_rate(),
                    summary: &summary,
                };
                println!("{}", serde_json::to_string(&report)?);
            }
            Err(e) => {
                failures += 1;
                error!(file = %path.display(), error = ?e, "replay failed");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} replays failed", files.len());
    }
    Ok(())
}

fn replay_file(config: &EngineConfig, initial_balance: f64, path: &Path) -> Result<ReplaySummary> {
    let file = input::load_bar_file(path)?;
    let mut engine = Engine::new(config.clone())?;
    let mut gateway = PaperGateway::new(PaperAccount::new(initial_balance, config.point_value));
    let mut signals = ScriptedSignals::new(file.signals);
    let summary = run_replay(&mut engine, &file.bars, &mut signals, &mut gateway)
        .with_context(|| format!("replay of {}", path.display()))?;
    Ok(summary)
}
