//! Command handlers behind the `extract`, `schema`, `prompt` and `config`
//! subcommands.

use crate::batch::{BatchRequest, BatchSummary, Document, Mode, Outcome, Session};
use crate::config::{self, API_KEY_ENV, Config, DEFAULT_CONFIG_PATH};
use crate::export::{self, ExportFormat};
use crate::gemini::GeminiClient;
use crate::invoice;
use crate::llm_extract::EXTRACTION_PROMPT;
use crate::summary;
use anyhow::Context;
use clap::{Args, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// PDF invoice files to process
    files: Vec<PathBuf>,

    /// Gemini API key (falls back to GEMINI_API_KEY, then the config file)
    #[arg(long)]
    api_key: Option<String>,

    /// Gemini model ID used for extraction
    #[arg(short, long)]
    model: Option<String>,

    /// Process one invoice at a time instead of all at once
    #[arg(long)]
    sequential: bool,

    /// Where to write the summary spreadsheet
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Spreadsheet format
    #[arg(short, long, value_enum)]
    format: Option<ExportFormat>,

    /// Only print the table
    #[arg(long)]
    no_export: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Set one value, e.g. `gemini.model gemini-2.0-flash`
    Set {
        /// Configuration key as <section>.<key>
        key: String,
        /// New value
        value: String,
    },
}

pub async fn run_extract(args: ExtractArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path)?;

    let request = BatchRequest {
        api_key: config.resolve_api_key(args.api_key.clone(), std::env::var(API_KEY_ENV).ok()),
        model: args.model.clone().unwrap_or_else(|| config.gemini.model.clone()),
        files: args.files.clone(),
    };
    let api_key = request.validate()?;

    let client = GeminiClient::new(&config.gemini.base_url, api_key)
        .context("Failed to initialize Gemini client")?;
    println!("{} Gemini client initialized.", style("✓").green());

    let mode = if args.sequential {
        Mode::Sequential
    } else {
        config.processing.mode
    };
    let documents: Vec<Document> = request.files.iter().cloned().map(Document::from_path).collect();

    let progress = ProgressBar::new(documents.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} invoices")?
            .progress_chars("=>-"),
    );

    let mut session = Session::default();
    let outcomes = session
        .process_batch(&client, &request.model, &documents, mode, &progress)
        .await;
    progress.finish_and_clear();

    print_outcomes(&outcomes);

    if session.rows().is_empty() {
        println!(
            "{} No data was extracted from the processed files.",
            style("ℹ").blue()
        );
        return Ok(());
    }

    println!();
    println!("{}", style("Extracted Invoice Summary").bold());
    print!("{}", summary::render_table(session.rows()));

    if !args.no_export {
        let format = args.format.unwrap_or(config.export.format);
        let path = args.output.unwrap_or_else(|| match format {
            ExportFormat::Xlsx => config.export.path.clone(),
            ExportFormat::Csv => config.export.path.with_extension("csv"),
        });
        export::export(session.rows(), format, &path, &config.export.sheet_name)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!();
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            path.display()
        );
    }

    Ok(())
}

fn print_outcomes(outcomes: &[Outcome]) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(_) => println!(
                "{} Successfully extracted data from {}.",
                style("✓").green(),
                style(&outcome.file_name).bold()
            ),
            Err(e) => println!(
                "{} Error processing {}: {}",
                style("⚠").red(),
                style(&outcome.file_name).bold(),
                e
            ),
        }
    }

    let closing = BatchSummary::from_outcomes(outcomes);
    let line = match closing {
        BatchSummary::AllSucceeded { .. } => style(closing.to_string()).green(),
        BatchSummary::Partial { .. } => style(closing.to_string()).blue(),
        BatchSummary::NoneSucceeded => style(closing.to_string()).yellow(),
        BatchSummary::Empty => style(closing.to_string()).dim(),
    };
    println!("{line}");
}

pub fn run_schema() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&invoice::response_schema())?);
    Ok(())
}

pub fn run_prompt() {
    println!("{EXTRACTION_PROMPT}");
}

pub fn run_config(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    match args.command {
        ConfigCommand::Show => {
            let config = if path.exists() {
                Config::load(path)?
            } else {
                println!(
                    "{} No config file at {}, showing defaults.",
                    style("ℹ").blue(),
                    path.display()
                );
                Config::default()
            };
            print!("{}", toml::to_string_pretty(&config.masked())?);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Config::default().save(path)?;
            info!(path = %path.display(), "Wrote default config");
            println!(
                "{} Created configuration file at {}",
                style("✓").green(),
                path.display()
            );
        }
        ConfigCommand::Set { key, value } => {
            Config::set_value(path, &key, &value)?;
            println!(
                "{} Set {} = {}",
                style("✓").green(),
                key,
                display_value(&key, &value)
            );
        }
    }
    Ok(())
}

const SECRET_KEYS: &[&str] = &["gemini.api_key"];

fn display_value(key: &str, value: &str) -> String {
    if SECRET_KEYS.contains(&key) {
        config::mask_key(value)
    } else {
        value.to_string()
    }
}
