//! PixelFeed CLI - inspect image datasets the way a training loop sees them.
//!
//! Every command runs the same loader a training job would: discovery,
//! decoding, transforms, geometry and packing into `[N, C, H, W]` tensors.
//!
//! # Usage
//!
//! ```bash
//! # Stream every sample through the prefetch worker
//! pixelfeed scan ./train --format jsonl
//!
//! # Assemble fixed-size batches
//! pixelfeed batch ./train --size 32
//!
//! # View configuration
//! pixelfeed config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// PixelFeed - image-to-tensor loading for training pipelines.
#[derive(Parser, Debug)]
#[command(name = "pixelfeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "PIXELFEED_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Load every sample through the prefetch worker and report per-sample stats
    Scan(cli::scan::ScanArgs),

    /// Assemble batches and report per-batch stats
    Batch(cli::batch::BatchArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `pixelfeed config path`."
            );
            pixelfeed_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("PixelFeed v{}", pixelfeed_core::VERSION);

    match cli.command {
        Commands::Scan(args) => cli::scan::execute(args, config).await,
        Commands::Batch(args) => cli::batch::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, cli.config).await,
    }
}
