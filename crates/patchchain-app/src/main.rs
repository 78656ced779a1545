//! patchchain - retry/escalation driver for an external rewriting tool
//!
//! Each run extends a numbered chain of attempt directories under a root,
//! growing the conflict budget when an attempt fails and stopping once a
//! patch is found or the budget is exhausted.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use patchchain_adapters::config::Config;
use patchchain_adapters::invoker::ToolRunner;
use patchchain_core::stats::{self, DEFAULT_THRESHOLD};
use patchchain_core::store::DirStore;
use patchchain_engine::maintenance::{remove_all_but_seed, remove_latest};
use patchchain_engine::Controller;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_SUMMARY_LOG: &str = "_info.log";

#[derive(Parser, Debug)]
#[command(
    name = "patchchain",
    about = "Drive the rewriting tool over a chain of attempt directories",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extend the chain from its latest step until it terminates
    Run(RunArgs),
    /// Delete every step directory except step 0
    Rm(RootArg),
    /// Delete the most recently created step directory
    Rm1(RootArg),
    /// Aggregate per-node solver statistics and bucket them by runtime
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
struct RootArg {
    /// Directory holding the numbered step directories
    root: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    root: PathBuf,

    /// Config file (defaults to <root>/patchchain.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Tree to search for replace_<node>_cec.log files
    root: PathBuf,

    /// Summary log with the `UNSAT (rewritable):` section (defaults to <root>/_info.log)
    #[arg(long)]
    summary_log: Option<PathBuf>,

    /// Runtime threshold in seconds
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_chain(&args),
        Commands::Rm(args) => {
            let mut store = DirStore::new(ensure_root(&args.root)?);
            let removed = remove_all_but_seed(&mut store)?;
            info!("removed {} step(s)", removed.len());
            Ok(())
        }
        Commands::Rm1(args) => {
            let mut store = DirStore::new(ensure_root(&args.root)?);
            match remove_latest(&mut store)? {
                Some(name) => info!("removed step {}", name),
                None => info!("nothing to remove"),
            }
            Ok(())
        }
        Commands::Stats(args) => print_stats(&args),
    }
}

fn ensure_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize()
        .with_context(|| format!("Failed to resolve chain root '{}'", root.display()))
}

fn run_chain(args: &RunArgs) -> Result<()> {
    let root = ensure_root(&args.root)?;
    let config = Config::resolve(&root, args.config.as_deref())?;
    info!(
        tool = %config.tool,
        exit_policy = config.exit_policy.as_str(),
        budget_cap = config.budget_cap,
        "driving chain under {}",
        root.display()
    );

    let runner = ToolRunner::from_config(&config);
    let mut controller = Controller::new(DirStore::new(&root), runner, config.budget_policy());
    let report = controller.run()?;
    info!("{}", report.summary());
    Ok(())
}

fn print_stats(args: &StatsArgs) -> Result<()> {
    let summary_path = args
        .summary_log
        .clone()
        .unwrap_or_else(|| args.root.join(DEFAULT_SUMMARY_LOG));

    let solver = stats::scan_solver_logs(&args.root);
    let summary = stats::scan_summary_log(&summary_path);
    info!(
        attempt_logs = solver.len(),
        summary_nodes = summary.len(),
        "aggregated solver statistics"
    );

    let merged = stats::merge(solver, summary);
    let buckets = stats::classify(&merged, args.threshold);
    print!("{}", buckets.render());
    Ok(())
}
