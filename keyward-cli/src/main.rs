//! keyward: reconcile declared managed keys against a key-management server.
//!
//! Usage:
//!   keyward --config keyward.json --state keyward.state.json plan --declared keys.json
//!   keyward apply --declared keys.json
//!   keyward refresh
//!   keyward import --family aws --out imported.json
//!
//! Ctrl-C cancels the pass in flight. The remote may be left partially
//! applied; running the same command again converges.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keyward_cli::{KeywardConfig, StateFile};
use keyward_model::{Family, TypeRegistry};
use keyward_sync::{CancellationToken, HttpKeyStore, Reconciler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "keyward")]
#[command(about = "Declarative managed key reconciliation")]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "keyward.json")]
    config: PathBuf,

    /// Path to the last applied state
    #[arg(short, long, default_value = "keyward.state.json")]
    state: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what apply would change, without contacting the server
    Plan {
        #[arg(short, long)]
        declared: PathBuf,
    },
    /// Reconcile the server toward the declared keys
    Apply {
        #[arg(short, long)]
        declared: PathBuf,
    },
    /// Re-read declared keys from the server and report drift
    Refresh,
    /// Adopt keys that already exist on the server
    Import {
        #[arg(short, long = "family", required = true)]
        families: Vec<Family>,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let state = StateFile::load(&args.state)?;

    if let Command::Plan { declared } = &args.command {
        let declared = keyward_cli::load_declared(declared)?;
        let diffs = keyward_cli::plan(&TypeRegistry::builtin(), state.as_ref(), &declared);
        print!("{}", keyward_cli::render_plan(&diffs));
        return Ok(());
    }

    let config = KeywardConfig::load(&args.config)?;
    let ledger = state
        .as_ref()
        .map(|s| s.versions.clone())
        .unwrap_or_default();
    let store = HttpKeyStore::new(config.remote.clone()).context("Failed to set up remote store")?;
    info!("Using remote {}", store.config().address);
    let reconciler = config.reconciler(Arc::new(store), ledger)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the current call");
            on_interrupt.cancel();
        }
    });

    match args.command {
        Command::Plan { .. } => Ok(()),
        Command::Apply { declared } => {
            run_apply(&reconciler, state.as_ref(), &declared, &args.state, &cancel).await
        }
        Command::Refresh => {
            let Some(state) = state else {
                bail!("Nothing to refresh: no state at {}", args.state.display());
            };
            run_refresh(&reconciler, &state, &args.state, &cancel).await
        }
        Command::Import { families, out } => {
            let summary =
                keyward_cli::import(&reconciler, state.as_ref(), &families, &cancel).await?;
            keyward_cli::save_declared(&summary.imported, &out)?;
            summary.state.save(&args.state)?;
            for notice in &summary.drift {
                println!("drift: {notice}");
            }
            println!(
                "Imported {} managed keys into {}",
                summary.imported.len(),
                out.display()
            );
            println!("Add their secret fields before the next apply.");
            Ok(())
        }
    }
}

async fn run_apply(
    reconciler: &Reconciler,
    state: Option<&StateFile>,
    declared: &Path,
    state_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let declared = keyward_cli::load_declared(declared)?;
    let outcome = keyward_cli::apply(reconciler, state, declared, cancel).await;
    outcome.state.save(state_path)?;
    let reports = outcome.result?;

    for report in &reports {
        println!(
            "{}: {} written, {} deleted{}",
            report.family,
            report.written.len(),
            report.deleted.len(),
            if report.skipped_unsupported {
                " (unsupported by server)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

async fn run_refresh(
    reconciler: &Reconciler,
    state: &StateFile,
    state_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let summary = keyward_cli::refresh(reconciler, state, cancel).await?;
    summary.state.save(state_path)?;

    for notice in &summary.drift {
        println!("drift: {notice}");
    }
    for (family, name) in &summary.missing {
        println!("missing: {family}/{name}");
    }
    println!(
        "Refreshed {} managed keys ({} drifted, {} missing)",
        summary.state.declared.len(),
        summary.drift.len(),
        summary.missing.len()
    );
    Ok(())
}
