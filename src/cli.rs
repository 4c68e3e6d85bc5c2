use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::error::Result;
use crate::server::init_tracing;
use crate::utils::AppConfig;

#[derive(Parser)]
#[command(name = "ashare-rps")]
#[command(about = "A-share snapshot, indicator and RPS ranking service", long_about = None)]
pub struct Cli {
    /// Directory for ranking artifacts (overrides RPS_OUTPUT_DIR)
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one ranking pass and persist the results
    Rank {
        /// Comma-separated windows: 50, 120, 250
        #[arg(short, long, default_value = "50,120,250")]
        windows: String,
    },
    /// Print the price view of one symbol as JSON
    Quote {
        /// Six-digit code, optionally prefixed (sh600000)
        symbol: String,
        /// Include the indicator bundle
        #[arg(long)]
        detail: bool,
        /// Include the latest five-minute bars
        #[arg(long)]
        intraday: bool,
    },
    /// Print the ranking record of one symbol
    Rps {
        symbol: String,
    },
    /// Print the top ranked symbols for a window
    Top {
        /// 50, 120 or 250
        window: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            commands::serve::run(config).await
        }
        Commands::Rank { windows } => commands::rank::run(config, &windows).await,
        Commands::Quote {
            symbol,
            detail,
            intraday,
        } => commands::quote::run(config, &symbol, detail, intraday).await,
        Commands::Rps { symbol } => commands::rps::run(config, &symbol).await,
        Commands::Top { window, limit } => commands::rps::top(config, &window, limit).await,
    }
}
