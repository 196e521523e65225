//! Jury CLI: scan models and judge recorded outputs from the terminal.
//!
//! The models under test are recorded outputs read from a dataset column,
//! judged by an OpenAI-compatible LLM.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Jury: vulnerability scanning and LLM-as-a-judge testing for ML models
#[derive(Parser, Debug)]
#[command(name = "jury", version, about, long_about = None)]
struct Cli {
    /// Judge LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

/// Options describing the model whose outputs were recorded.
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// Dataset file (JSON array or JSON Lines)
    #[arg(short, long)]
    dataset: PathBuf,

    /// Column holding the recorded model outputs
    #[arg(short, long)]
    output_column: String,

    /// Comma-separated feature columns (default: every other column)
    #[arg(short, long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    /// Model name shown to the judge
    #[arg(long)]
    name: Option<String>,

    /// Model description shown to the judge
    #[arg(long)]
    description: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Judge recorded outputs against a requirement
    #[command(group(
        clap::ArgGroup::new("requirement_source")
            .required(true)
            .args(["requirement", "requirement_column"])
    ))]
    Evaluate {
        #[command(flatten)]
        model: ModelArgs,

        /// Requirement every output must satisfy
        #[arg(short, long)]
        requirement: Option<String>,

        /// Column holding the requirement of each row
        #[arg(long)]
        requirement_column: Option<String>,

        /// Print the test result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scan recorded outputs with the configured detectors
    Scan {
        #[command(flatten)]
        model: ModelArgs,

        /// Only run detectors with this tag (repeatable)
        #[arg(long)]
        only: Vec<String>,

        /// Requirement checked by the output requirement detector (repeatable)
        #[arg(short, long)]
        requirement: Vec<String>,

        /// Write the HTML report to this file
        #[arg(long)]
        html: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Abort on the first detector failure
        #[arg(long)]
        strict: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "jury", "jury")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "jury.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let ok = commands::handle_command(cli.command, &workspace, cli.model).await?;
    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
