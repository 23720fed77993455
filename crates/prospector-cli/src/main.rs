mod wiring;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use prospector_client::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use prospector_core::config::Settings;
use prospector_core::{OutcomeSummary, PipelineOutcome};

use crate::wiring::{Overrides, build_pipeline};

#[derive(Parser)]
#[command(name = "prospector", version, about = "Automated company prospect research")]
struct Cli {
    /// Path to the JSON settings file (missing file = defaults)
    #[arg(short, long, env = "PROSPECTOR_CONFIG", default_value = "prospector.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Research one company from its website URL
    Research {
        /// Company website URL
        #[arg(short, long)]
        url: String,

        /// Company name (derived from the URL host if omitted)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Research every company listed in a CSV file (`url` column, optional `name`)
    Batch {
        /// CSV input file
        #[arg(short, long)]
        input: PathBuf,

        /// Companies researched at the same time
        #[arg(long, env = "PROSPECTOR_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// OpenAI API key (overrides api_keys.openai in the settings file)
    #[arg(long, env = "PROSPECTOR_OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LLM model used for analysis and profiles
    #[arg(short, long, env = "PROSPECTOR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "PROSPECTOR_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Directory for generated reports
    #[arg(long, env = "PROSPECTOR_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    /// Overall per-company deadline in seconds (0 disables it)
    #[arg(long, env = "PROSPECTOR_TIMEOUT")]
    timeout: Option<u64>,

    /// Requests allowed per dependency within the rate-limit window
    #[arg(long, env = "PROSPECTOR_MAX_REQUESTS")]
    max_requests: Option<usize>,

    /// Fetch pages even when robots.txt disallows it
    #[arg(long, default_value_t = false)]
    ignore_robots: bool,
}

impl From<RunArgs> for Overrides {
    fn from(args: RunArgs) -> Self {
        Self {
            api_key: args.api_key,
            model: args.model,
            base_url: args.base_url,
            reports_dir: args.reports_dir,
            timeout_secs: args.timeout,
            max_requests: args.max_requests,
            ignore_robots: args.ignore_robots,
        }
    }
}

/// One row of the batch input file.
#[derive(Debug, Deserialize)]
struct BatchRow {
    url: String,
    #[serde(default)]
    name: Option<String>,
}

/// One line of batch output.
#[derive(Serialize)]
struct BatchLine<'a> {
    url: &'a str,
    #[serde(flatten)]
    summary: OutcomeSummary<'a>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("prospector=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    match cli.command {
        Commands::Research { url, name, run } => {
            cmd_research(&settings, &url, name.as_deref(), run.into()).await
        }
        Commands::Batch {
            input,
            concurrency,
            run,
        } => cmd_batch(&settings, &input, concurrency, run.into()).await,
    }
}

async fn cmd_research(
    settings: &Settings,
    url: &str,
    name: Option<&str>,
    overrides: Overrides,
) -> Result<ExitCode> {
    let pipeline = build_pipeline(settings, &overrides)?;
    let outcome = pipeline.process_company_named(url, name).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&OutcomeSummary::from(&outcome))?
    );

    Ok(exit_code(&outcome))
}

async fn cmd_batch(
    settings: &Settings,
    input: &Path,
    concurrency: usize,
    overrides: Overrides,
) -> Result<ExitCode> {
    let rows = read_batch(input)?;
    if rows.is_empty() {
        tracing::warn!(input = %input.display(), "No companies in input file");
        return Ok(ExitCode::SUCCESS);
    }

    // One pipeline, so every company draws on the same rate-limit windows.
    let pipeline = build_pipeline(settings, &overrides)?;
    let concurrency = concurrency.max(1);
    tracing::info!(companies = rows.len(), concurrency, "Starting batch");

    // Ctrl-C stops scheduling new companies; in-flight ones finish.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing in-flight companies");
                cancel.cancel();
            }
        }
    });

    let pipeline = &pipeline;
    let total = rows.len();
    let outcomes = futures::stream::iter(rows)
        .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
        .map(|row| async move {
            let outcome = pipeline
                .process_company_named(&row.url, row.name.as_deref())
                .await;
            (row, outcome)
        })
        .buffer_unordered(concurrency);
    let mut outcomes = std::pin::pin!(outcomes);

    let mut tally = Tally::default();
    while let Some((row, outcome)) = outcomes.next().await {
        tally.add(&outcome);
        let line = BatchLine {
            url: &row.url,
            summary: OutcomeSummary::from(&outcome),
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    tracing::info!(
        total,
        completed = tally.completed,
        degraded = tally.degraded,
        failed = tally.failed,
        skipped = total - tally.processed(),
        "Batch finished"
    );

    Ok(if tally.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn read_batch(path: &Path) -> Result<Vec<BatchRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<BatchRow>, _>>()
        .with_context(|| format!("Invalid CSV in {}", path.display()))
}

fn exit_code(outcome: &PipelineOutcome) -> ExitCode {
    if outcome.is_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    degraded: usize,
    failed: usize,
}

impl Tally {
    fn add(&mut self, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Completed(_) => self.completed += 1,
            PipelineOutcome::Degraded(_) => self.degraded += 1,
            PipelineOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn processed(&self) -> usize {
        self.completed + self.degraded + self.failed
    }
}
