mod cache;
mod commands;
mod output;
mod problem;

use anyhow::Result;
use benchbox_common::config::EngineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "benchbox")]
#[command(about = "benchbox - test and profile solutions in warm Docker sandboxes", long_about = None)]
struct Cli {
    /// Config file (defaults to ./benchbox.json, then ~/.benchbox.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Problems directory, overriding the config file
    #[arg(long, global = true)]
    problems_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a solution template and testcases.json for a problem
    Init {
        /// Platform the problem comes from (e.g., leetcode)
        platform: String,

        /// Problem name (e.g., two-sum)
        problem: String,

        /// Language name or alias
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Name of the function the driver calls
        #[arg(short, long, default_value = "solve")]
        function: String,
    },

    /// Run test cases and compare results with expected outputs
    Test {
        platform: String,
        problem: String,

        #[arg(short, long, default_value = "python")]
        language: String,

        /// Case selection, e.g. 1,3,5-7 (default: all)
        #[arg(short, long)]
        cases: Option<String>,
    },

    /// Run each selected input repeatedly and report time and memory
    Profile {
        platform: String,
        problem: String,

        #[arg(short, long, default_value = "python")]
        language: String,

        /// Runs per input (default: profile_iterations from config)
        #[arg(short, long)]
        iterations: Option<usize>,

        #[arg(short, long)]
        cases: Option<String>,
    },

    /// Remove warm sandboxes
    Cleanup {
        /// Only remove sandboxes idle for longer than this many seconds
        #[arg(long)]
        idle_secs: Option<u64>,
    },

    /// Inspect or prune the shared toolchain cache (cache_dir)
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List supported languages
    Languages,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache location and size per toolchain
    Show,

    /// Delete cache directories
    Clear {
        /// Only clear this language's caches ("all" for every cache)
        #[arg(short, long)]
        language: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show file counts, types and ages per toolchain
    Stats,

    /// Delete cache files older than a number of days
    Clean {
        #[arg(short, long, default_value_t = 7)]
        days: u64,

        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::discover(cli.config.as_deref())?;
    if let Some(dir) = cli.problems_dir {
        config.problems_dir = dir;
    }

    match cli.command {
        Commands::Init {
            platform,
            problem,
            language,
            function,
        } => {
            commands::init(&config, &platform, &problem, &language, &function)?;
        }
        Commands::Test {
            platform,
            problem,
            language,
            cases,
        } => {
            let passed = commands::test(&config, &platform, &problem, &language, cases.as_deref()).await?;
            if !passed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Profile {
            platform,
            problem,
            language,
            iterations,
            cases,
        } => {
            commands::profile(&config, &platform, &problem, &language, iterations, cases.as_deref())
                .await?;
        }
        Commands::Cleanup { idle_secs } => {
            commands::cleanup(&config, idle_secs).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Show => commands::cache_show(&config)?,
            CacheAction::Clear { language, force } => {
                commands::cache_clear(&config, language.as_deref(), force)?
            }
            CacheAction::Stats => commands::cache_stats(&config)?,
            CacheAction::Clean { days, force } => commands::cache_clean(&config, days, force)?,
        },
        Commands::Languages => commands::languages(),
    }

    Ok(ExitCode::SUCCESS)
}
