use agent_eta::config::EtaToml;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod cmd;

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV_VAR: &str = "AGENT_ETA_LOG";

#[derive(Parser)]
#[command(name = "agent-eta")]
#[command(version, about = "Progress and ETA reporting for long-running agent calls")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to agent-eta.toml (defaults to ./agent-eta.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a simulated agent task with progress reporting (default)
    Demo(DemoArgs),
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct DemoArgs {
    /// Name of the simulated task
    #[arg(long)]
    pub task: Option<String>,

    /// Size of the simulated task
    #[arg(long, value_enum)]
    pub complexity: Option<Complexity>,

    /// Multiplier applied to every step's duration
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Fail with an error after this step
    #[arg(long)]
    pub fail_at: Option<u32>,

    /// Also report CPU and memory pressure
    #[arg(long)]
    pub monitor: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default agent-eta.toml file
    Init,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Ok(EtaToml::path_in(&cwd))
        }
    }
}

/// An explicit `--config` must exist; the implicit one is optional.
fn load_config(cli: &Cli, path: &Path) -> Result<EtaToml> {
    if cli.config.is_some() || path.exists() {
        EtaToml::load(path)
    } else {
        Ok(EtaToml::default())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = config_path(&cli)?;

    match &cli.command {
        None => {
            let config = load_config(&cli, &path)?;
            cmd::cmd_demo(&config, &DemoArgs::default())?;
        }
        Some(Commands::Demo(args)) => {
            let config = load_config(&cli, &path)?;
            cmd::cmd_demo(&config, args)?;
        }
        Some(Commands::Config { command }) => cmd::cmd_config(&path, *command)?,
    }

    Ok(())
}
