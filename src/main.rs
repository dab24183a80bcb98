use anyhow::Result;
use clap::{Parser, Subcommand};

use memos_migrate::cli::{init, resolve, run, status, tags};
use memos_migrate::config::Config;
use memos_migrate::logging;

#[derive(Parser)]
#[command(name = "memos-migrate")]
#[command(about = "Resumable memo migration from Memos v0.21.0 to v0.17.1")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "memos-migrate.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the current store from the init script
    Init {
        /// Remove an existing current store first
        #[arg(long)]
        overwrite: bool,
    },

    /// Migrate memos from the last checkpoint onwards
    Run {
        /// Highest memo id to migrate (default: highest id in the legacy store)
        #[arg(long)]
        to: Option<i64>,

        /// Review and tag every memo before it is written
        #[arg(short, long)]
        interactive: bool,

        /// Also migrate attached resources
        #[arg(long)]
        resources: bool,
    },

    /// Show checkpoint segments
    Status {
        /// Print segments as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the nearest existing legacy memo id
    Resolve {
        /// Requested memo id
        id: i64,

        /// Search downwards instead of upwards
        #[arg(long)]
        backward: bool,
    },

    /// List configured tags
    Tags,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config)?;

    logging::init(&config.log_dir())?;

    match cli.command {
        Commands::Init { overwrite } => {
            init::run(&config, overwrite)?;
        }
        Commands::Run {
            to,
            interactive,
            resources,
        } => {
            run::run(&config, to, interactive, resources)?;
        }
        Commands::Status { json } => {
            status::run(&config, json)?;
        }
        Commands::Resolve { id, backward } => {
            resolve::run(&config, id, backward)?;
        }
        Commands::Tags => {
            tags::run(&config)?;
        }
    }

    Ok(())
}
