//! predict_repl: drive a prediction session from the terminal.
//!
//! Each stdin line holds whitespace-separated key names (`h e l l o space`,
//! `BackSpace`, `Return`, `KP_2`, `Control+a`). After every line the committed
//! text, the preedit and the menu of the last segment are printed.

use anyhow::{Context as _, Result};
use clap::Parser;
use libpredict_core::{Config, PredictEngineComponent, PredictorComponent, Session};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "predict_repl", about = "Interactive prediction session")]
struct Args {
    /// Schema configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prediction table (TOML, or JSON with a .json extension)
    #[arg(long)]
    table: Option<PathBuf>,

    /// Keep selections in the composition instead of committing them
    #[arg(long)]
    fluid: bool,

    /// Log predictor decisions to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "libpredict_core=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => Config::load_toml(path)?,
        None => Config::default(),
    };
    if args.fluid {
        config.auto_commit = false;
    }

    let component = match &args.table {
        Some(path) => {
            let engines = PredictEngineComponent::load(path)
                .with_context(|| format!("loading prediction table {}", path.display()))?;
            tracing::info!(entries = engines.table().len(), "prediction table loaded");
            PredictorComponent::new(engines)
        }
        None => {
            tracing::warn!("no prediction table given, predictions disabled");
            PredictorComponent::without_engine()
        }
    };

    let mut session = Session::new(config, &component);
    let mut out = io::stdout().lock();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if let Err(err) = session.process_keys(&line) {
            writeln!(out, "error: {err}")?;
        }
        report(&mut session, &mut out)?;
    }
    Ok(())
}

fn report(session: &mut Session, out: &mut impl Write) -> io::Result<()> {
    let commit = session.take_commit();
    if !commit.is_empty() {
        writeln!(out, "commit: {commit}")?;
    }
    writeln!(out, "preedit: {}", session.preedit())?;
    for (i, cand) in session.menu().iter().enumerate() {
        writeln!(out, "  {}. {} ({})", i + 1, cand.text, cand.kind)?;
    }
    out.flush()
}
