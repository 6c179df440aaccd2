use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use session_harvest::config::{ApiConfig, RateLimitConfig, ThrottleConfig};
use session_harvest::{Error, Result, RunConfig, RunSummary, harvest, logging};

#[derive(Parser)]
#[command(
    name = "session-harvest",
    about = "Fetch verification decisions and their media for every session in a CSV",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log the crate at debug level (ignored when RUST_LOG is set)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every pending row of a session CSV
    Run {
        /// CSV with `id` and `client_id` columns; rewritten with progress
        input_file: PathBuf,

        /// Root directory for downloaded assets
        #[arg(default_value = "downloads")]
        output_dir: PathBuf,

        /// Number of sessions processed concurrently
        #[arg(default_value_t = 4)]
        worker_count: usize,

        /// API key sent as X-Api-Key
        #[arg(long, env = "SESSION_HARVEST_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Session endpoint base URL
        #[arg(
            long,
            env = "SESSION_HARVEST_BASE_URL",
            default_value = "https://verification.didit.me/v2/session"
        )]
        base_url: String,

        /// Minimum milliseconds between two decision requests
        #[arg(long, default_value_t = 600)]
        interval_ms: u64,

        /// Seconds to wait after a 429 before retrying
        #[arg(long, default_value_t = 60)]
        cooldown_secs: u64,

        /// Persist the CSV after this many finished sessions (0 = only at the end)
        #[arg(long, default_value_t = 25)]
        checkpoint_every: usize,

        /// Retries allowed after a 429 before the session fails (0 = no retry; default: never give up)
        #[arg(long)]
        max_throttle_retries: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = dispatch(cli.command).await {
        eprintln!("session-harvest error: {err}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            input_file,
            output_dir,
            worker_count,
            api_key,
            base_url,
            interval_ms,
            cooldown_secs,
            checkpoint_every,
            max_throttle_retries,
        } => {
            let api_key = api_key
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    Error::config(
                        "api_key",
                        "no API key given; pass --api-key or set SESSION_HARVEST_API_KEY",
                    )
                })?;

            if !input_file.is_file() {
                return Err(Error::InputNotFound(input_file));
            }

            let config = RunConfig {
                api: ApiConfig {
                    base_url,
                    api_key,
                    ..Default::default()
                },
                rate_limit: RateLimitConfig {
                    interval: Duration::from_millis(interval_ms),
                },
                throttle: ThrottleConfig::with_max_retries(
                    Duration::from_secs(cooldown_secs),
                    max_throttle_retries,
                ),
                workers: worker_count,
                checkpoint_every,
                output_dir,
            };

            tracing::info!(
                input = %input_file.display(),
                output = %config.output_dir.display(),
                workers = config.workers,
                "starting harvest"
            );

            let summary = harvest(&config, &input_file).await?;
            print_summary(&summary, &config.output_dir);
            Ok(())
        }
    }
}

fn print_summary(summary: &RunSummary, output_dir: &std::path::Path) {
    let output = std::fs::canonicalize(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());

    println!("Processed {} of {} rows", summary.processed, summary.total_rows);
    println!("  Completed: {}", summary.completed);
    println!("  Failed:    {}", summary.failed);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Output:    {}", output.display());
}
