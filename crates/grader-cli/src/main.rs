//! `grader` command line.
//!
//! Offline commands (`normalize`, `preview`) work on rubric files without a
//! provider. `parse`, `score` and `evaluate` call the configured LLM
//! provider; `providers` reports which ones are usable. Results go to stdout
//! as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grader_core::{ParsingPreview, Rubric};
use grader_runtime::{
    GraderConfig, GraderError, GraderService, InMemoryRepository, PlainTextExtractor,
    ProviderKind, RubricSource,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grader", version, about = "Rubric parsing and transcript grading")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,

    /// YAML or JSON config file; GRADER_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider for LLM-backed commands (openai or anthropic)
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Normalize a rubric file and print the canonical rubric
    Normalize { rubric: PathBuf },

    /// Print the parsing preview of a rubric file
    Preview { rubric: PathBuf },

    /// Extract a rubric from a text document with the LLM
    Parse { document: PathBuf },

    /// Score a transcript against a rubric file
    Score {
        #[arg(long)]
        rubric: PathBuf,
        #[arg(long)]
        transcript: PathBuf,
        /// Mark the evaluation as visible to the student
        #[arg(long)]
        share: bool,
    },

    /// Extract a rubric from a document, then score a transcript against it
    Evaluate {
        #[arg(long)]
        rubric_document: PathBuf,
        #[arg(long)]
        transcript: PathBuf,
        #[arg(long)]
        share: bool,
    },

    /// Show compiled-in providers and whether each is configured and healthy
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match &cli.cmd {
        Cmd::Normalize { rubric } => emit(&load_rubric(rubric)?, cli.pretty),
        Cmd::Preview { rubric } => emit(&ParsingPreview::build(&load_rubric(rubric)?), cli.pretty),
        Cmd::Parse { document } => {
            let service = service(&cli)?;
            let bytes = read_bytes(document)?;
            let parsed = service
                .parse_rubric_document(&bytes, cli.provider)
                .await
                .map_err(report)?;
            emit(&parsed, cli.pretty)
        }
        Cmd::Score {
            rubric,
            transcript,
            share,
        } => {
            let service = service(&cli)?;
            let rubric = load_rubric(rubric)?;
            let transcript = read_text(transcript)?;
            let stored = service
                .score_transcript(RubricSource::Inline(rubric), &transcript, cli.provider, *share)
                .await
                .map_err(report)?;
            emit(&stored, cli.pretty)
        }
        Cmd::Evaluate {
            rubric_document,
            transcript,
            share,
        } => {
            let service = service(&cli)?;
            let bytes = read_bytes(rubric_document)?;
            let transcript = read_text(transcript)?;
            let result = service
                .evaluate_with_rubric_document(&bytes, &transcript, cli.provider, *share)
                .await
                .map_err(report)?;
            emit(&result, cli.pretty)
        }
        Cmd::Providers => {
            let service = service(&cli)?;
            emit(&service.provider_status().await, cli.pretty)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn service(cli: &Cli) -> Result<GraderService> {
    let mut config = match &cli.config {
        Some(path) => GraderConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GraderConfig::default(),
    };
    config.apply_env_overrides().context("Invalid GRADER_* override")?;

    let service = GraderService::from_config(
        config,
        Arc::new(InMemoryRepository::new()),
        Arc::new(PlainTextExtractor),
    );
    tracing::debug!(
        provider = %cli.provider.unwrap_or(service.config().llm_provider),
        "Grader service ready"
    );
    Ok(service)
}

fn report(error: GraderError) -> anyhow::Error {
    tracing::error!(error = %error, status = ?error.status(), "Command failed");
    anyhow::anyhow!("{} ({:?} error)", error.user_message(), error.status())
}

fn load_rubric(path: &Path) -> Result<Rubric> {
    Rubric::from_file(path).with_context(|| format!("Failed to load rubric {}", path.display()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
