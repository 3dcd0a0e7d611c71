mod batch;
mod cli;
mod config;
mod error;
mod export;
mod gemini;
mod invoice;
mod llm_extract;
mod pdf_probe;
mod summary;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Extract GST invoice fields from PDFs with Gemini and export a summary sheet
#[derive(Parser)]
#[command(name = "invoice_extract")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract invoices and write the summary spreadsheet
    Extract(cli::ExtractArgs),

    /// Print the response schema sent to the model
    Schema,

    /// Print the extraction prompt
    Prompt,

    /// Manage configuration
    Config(cli::ConfigArgs),
}

// one thread: concurrent extractions are cooperative, not parallel
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // init tracing
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Extract(args) => cli::run_extract(args, config_path).await,
        Commands::Schema => cli::run_schema(),
        Commands::Prompt => {
            cli::run_prompt();
            Ok(())
        }
        Commands::Config(args) => cli::run_config(args, config_path),
    }
}
