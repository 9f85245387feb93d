//! dsc: the command-line entry point for Swarm Creator.
//!
//! # Usage
//!
//! ```text
//! dsc                         # uses ./config/dsc.yaml
//! dsc -c /etc/dsc             # custom config directory
//! dsc --dedupe -v             # idempotent config merge, debug logging
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use swarm_creator_core::install::{default_config_dir, ensure_config_dir, load_cluster_config};
use swarm_creator_core::swarm::orchestrator::RunReport;
use swarm_creator_core::types::config::default_machine_storage;
use swarm_creator_core::{tools, Error, ListPolicy, ProcessRunner, SwarmOrchestrator};


/// Create a Docker Swarm cluster with Consul discovery.
#[derive(Debug, Parser)]
#[command(name = "dsc", version, about)]
struct Cli {
    /// Configuration directory holding dsc.yaml (default: ./config)
    #[arg(short, long, env = "DSC_CONFIG_DIR")]
    config: Option<PathBuf>,

    /// docker-machine storage directory (default: ~/.docker/machine/machines)
    #[arg(long, env = "DSC_MACHINE_STORAGE")]
    machine_storage: Option<PathBuf>,

    /// Skip list entries already present when merging machine configs
    #[arg(long)]
    dedupe: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn policy(&self) -> ListPolicy {
        if self.dedupe {
            ListPolicy::Union
        } else {
            ListPolicy::Append
        }
    }
}


fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(report) => print_report(&report),
        Err(e) => {
            error!("{}", failure_message(&e));
            process::exit(1);
        }
    }
}


/// One-line diagnostic for an aborted run. A command failure that escaped the
/// orchestrator is named as such; everything else is a setup problem.
fn failure_message(err: &Error) -> String {
    if err.is_fatal() {
        format!("aborted: {}", err)
    } else {
        format!("aborted, external command failed: {}", err)
    }
}


fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_target(false))
        .init();
}


fn run(cli: &Cli) -> swarm_creator_core::Result<RunReport> {
    let default_dir = default_config_dir();
    let config_dir = resolve_config_dir(cli.config.as_deref(), &default_dir);
    ensure_config_dir(&config_dir, &default_dir)?;

    let tool_paths = tools::discover(&tools::search_dirs())?;
    let storage = cli
        .machine_storage
        .clone()
        .unwrap_or_else(default_machine_storage);
    let config = load_cluster_config(&config_dir, tool_paths, storage)?;
    info!("using configuration in {}", config.config_dir.display());

    let runner = ProcessRunner;
    SwarmOrchestrator::new(&config, &runner)
        .with_policy(cli.policy())
        .run()
}


/// Absolute config directory: the given one (relative to the working
/// directory) or the default.
fn resolve_config_dir(given: Option<&Path>, default_dir: &Path) -> PathBuf {
    match given {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf()),
        None => default_dir.to_path_buf(),
    }
}


fn print_report(report: &RunReport) {
    println!("{}", render_report(report));
}

fn render_report(report: &RunReport) -> String {
    let mut lines = vec![format!("stage: {}", report.stage)];
    for node in &report.nodes {
        lines.push(format!(
            "{:<30} {:<7} {:<15} public={} cluster={}{}",
            node.name,
            node.role.to_string(),
            node.state.to_string(),
            node.public_ip.as_deref().unwrap_or("-"),
            node.cluster_ip.as_deref().unwrap_or("-"),
            if node.is_primary { " (primary)" } else { "" }
        ));
    }
    for issue in &report.issues {
        lines.push(format!("warning: {} {}: {}", issue.node, issue.action, issue.message));
    }
    lines.join("\n")
}
