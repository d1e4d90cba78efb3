use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use checkloop::config::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "checkloop")]
#[command(version, about = "Maker-checker orchestrator for generated documents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to checkloop.toml. Defaults to ./checkloop.toml, then the user config dir.
    #[arg(long, global = true, env = "CHECKLOOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP control plane
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Execute one run locally and print its events
    Run {
        /// JSON file holding the run request
        #[arg(short, long)]
        request: PathBuf,

        /// Emit events as JSON lines instead of progress bars
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default checkloop.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(cli.config.as_deref(), command.clone());
    }

    let (mut config, _) = Config::resolve(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let _log_guard = checkloop::logging::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Serve { host, port } => cmd::cmd_serve(config, host, port).await?,
        Commands::Run { request, json } => cmd::cmd_run(config, &request, json, cli.verbose).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
