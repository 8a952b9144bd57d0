use std::path::PathBuf;

use clap::{Parser, Subcommand};
use transcript_router::Result;
use transcript_router::commands::{reset_stats, route_query, show_stats, show_status, sweep_caches};
use transcript_router::config::{Config, get_config_dir, show_config};

#[derive(Parser)]
#[command(name = "transcript-router")]
#[command(about = "Cost-optimizing context router for video chat assistants")]
#[command(version)]
struct Cli {
    /// Data directory holding config.toml and router.db
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file, or show the current one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Route a query against a transcript JSON file and print the context
    Route {
        /// Transcript file: video_id, duration_seconds and segments
        transcript: PathBuf,
        /// The user's question
        query: String,
        /// JSON file with the prior conversation messages
        #[arg(long)]
        history: Option<PathBuf>,
        /// Record the query in the cost ledger
        #[arg(long)]
        record: bool,
        /// Output tokens to record; defaults to the configured estimate
        #[arg(long, requires = "record")]
        output_tokens: Option<usize>,
    },
    /// Show cost summaries, trends and recommendations
    Stats {
        /// Days of daily trend to show
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Export the current session as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Clear the current session
        #[arg(long, conflicts_with = "reset_all")]
        reset: bool,
        /// Clear all recorded cost history
        #[arg(long)]
        reset_all: bool,
    },
    /// Drop expired cache entries
    Sweep,
    /// Show cache registry status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config);
            } else {
                config.save()?;
                eprintln!("Configuration written to {}", config.config_file_path().display());
            }
        }
        Commands::Route {
            transcript,
            query,
            history,
            record,
            output_tokens,
        } => {
            route_query(
                &config,
                &transcript,
                &query,
                history.as_deref(),
                record,
                output_tokens,
            )
            .await?;
        }
        Commands::Stats {
            days,
            csv,
            reset,
            reset_all,
        } => {
            if reset || reset_all {
                reset_stats(&config, reset_all).await?;
            } else {
                show_stats(&config, days, csv.as_deref()).await?;
            }
        }
        Commands::Sweep => {
            sweep_caches(&config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}
