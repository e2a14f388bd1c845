//! Tandem CLI - inspect and watch a local synchronization endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Stream change events as JSON lines until Ctrl-C
//! tandem watch ~/Sync --sub-path /docs
//!
//! # Dump every node with its identity
//! tandem walk ~/Sync
//!
//! # Content of one leaf
//! tandem cat ~/Sync /docs/readme.txt
//!
//! # Endpoint capabilities
//! tandem info ~/Sync
//!
//! # Configuration
//! tandem config show
//! tandem config init
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tandem_core::TandemConfig;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem - local filesystem synchronization endpoint", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TANDEM_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a root and print change events
    Watch {
        /// Endpoint root (defaults to endpoint.root from the configuration)
        root: Option<PathBuf>,

        /// Sub-path to watch, relative to the root
        #[arg(long, default_value = "/")]
        sub_path: String,
    },

    /// Walk a root and print every node
    Walk {
        /// Endpoint root (defaults to endpoint.root from the configuration)
        root: Option<PathBuf>,

        /// Paths to walk, relative to the root (everything when omitted)
        paths: Vec<String>,
    },

    /// Print the content of a leaf
    Cat {
        /// Endpoint root
        root: PathBuf,

        /// Leaf path, relative to the root
        path: String,
    },

    /// Print endpoint capabilities
    Info {
        /// Endpoint root (defaults to endpoint.root from the configuration)
        root: Option<PathBuf>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    init_logging(cli.verbose, &config.general.log_level);

    match cli.command {
        Commands::Watch { root, sub_path } => {
            let root = resolve_root(root, &config)?;
            commands::watch(&root, &sub_path, &config).await?;
        }
        Commands::Walk { root, paths } => {
            let root = resolve_root(root, &config)?;
            commands::walk(&root, &paths, &config).await?;
        }
        Commands::Cat { root, path } => {
            commands::cat(&root, &path, &config).await?;
        }
        Commands::Info { root } => {
            let root = resolve_root(root, &config)?;
            commands::info(&root, &config).await?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => commands::config_show(&config)?,
            ConfigCommands::Init { force } => {
                let path = match cli.config {
                    Some(path) => path,
                    None => TandemConfig::config_path()?,
                };
                commands::config_init(&path, force).await?;
            }
        },
    }

    Ok(())
}

async fn load_config(path: Option<&std::path::Path>) -> Result<TandemConfig> {
    let config = match path {
        Some(path) if path.exists() => {
            let mut config = TandemConfig::load_from_path(path).await?;
            config.merge_env_vars()?;
            config.validate()?;
            config
        }
        _ => TandemConfig::load_or_default().await?,
    };
    Ok(config)
}

fn resolve_root(root: Option<PathBuf>, config: &TandemConfig) -> Result<PathBuf> {
    root.or_else(|| config.endpoint.root.clone())
        .context("No root given and endpoint.root is not configured")
}

fn init_logging(verbose: bool, level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("tandem=debug,tandem_fs=debug,tandem_core=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("tandem={level},tandem_fs={level},tandem_core={level},warn"))
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
