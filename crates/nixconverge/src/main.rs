//! nixconverge
//!
//! Converges NixOS hosts to the configurations named in a deployment file

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use nixconverge_core::{Engine, Environment};
use nixconverge_exec::LocalExecutor;
use nixconverge_nix::NixToolchain;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod state;

use config::DeploymentFile;
use state::StateFile;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "NIXCONVERGE_LOG";

#[derive(Parser, Debug)]
#[command(name = "nixconverge", version, about = "Converge NixOS hosts to their declared configuration", long_about = None)]
struct Cli {
    /// Deployment file (defaults to $NIXCONVERGE_CONFIG or ./nixconverge.toml)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// State file (defaults to nixconverge.state.json next to the deployment file)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show what apply would change
    Plan {
        /// Deployments to plan (default: all)
        names: Vec<String>,
    },
    /// Converge deployments
    Apply {
        /// Deployments to apply (default: all)
        names: Vec<String>,
    },
    /// Re-read the active system of created deployments
    Refresh {
        /// Deployments to refresh (default: all recorded)
        names: Vec<String>,
    },
    /// Forget deployment records without touching the hosts
    Destroy {
        /// Deployments to release (default: all recorded)
        names: Vec<String>,
    },
}

fn init_tracing(cli: &Cli, configured: Option<&str>) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| cli.log_level.clone())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| "info".to_string());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr);

    if cli.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let loaded = DeploymentFile::discover(cli.file.as_deref())?;
    init_tracing(&cli, loaded.file.settings.log_level.as_deref());

    let state_path = loaded.state_path(cli.state.as_deref());
    let mut state = StateFile::load(&state_path)?;

    let toolchain = Arc::new(NixToolchain::new(Arc::new(LocalExecutor::new())));
    let engine = Arc::new(Engine::new(toolchain, Environment::from_process()));

    tracing::debug!(state = %state_path.display(), "nixconverge starting");

    match &cli.command {
        Commands::Plan { names } => commands::plan(&engine, &loaded, &state, names).await?,
        Commands::Apply { names } => {
            commands::apply(&engine, &loaded, &mut state, &state_path, names).await?;
        }
        Commands::Refresh { names } => {
            commands::refresh(&engine, &mut state, &state_path, names).await?;
        }
        Commands::Destroy { names } => {
            commands::destroy(&engine, &mut state, &state_path, names).await?;
        }
    }

    Ok(())
}
