//! `roster-avail`: expand recurring availability and dry-run batch
//! submission against an in-memory store.
//!
//! Input is JSON on a file path or `-` for stdin. Results go to stdout as
//! JSON; logs go to stderr.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use availability_engine::{
    sort_chronologically, AvailabilityTemplate, BatchPhase, BatchSession, Conflict, EngineConfig,
    MemoryStore, PersistedAvailability, RecurrenceExpander, RecurrenceRule, ResolutionAction,
    SessionReport,
};

#[derive(Parser)]
#[command(name = "roster-avail", version)]
#[command(about = "Expand recurring availability and dry-run conflict resolution")]
struct Cli {
    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a template and rule into dated drafts
    Expand {
        /// Input file, or `-` for stdin
        #[arg(short, long)]
        input: String,

        /// Sort drafts by date instead of generation order
        #[arg(long)]
        sort: bool,
    },

    /// Submit the expansion to an in-memory store seeded with existing records
    Submit {
        /// Input file, or `-` for stdin
        #[arg(short, long)]
        input: String,

        /// Resolve every `choose` conflict with this action instead of stopping
        #[arg(long)]
        on_conflict: Option<ResolutionAction>,

        /// Confirm that `keep_both` may leave overlapping records
        #[arg(long)]
        consent: bool,
    },
}

#[derive(Deserialize)]
struct BatchInput {
    template: AvailabilityTemplate,
    #[serde(default)]
    rule: Option<RecurrenceRule>,
    #[serde(default)]
    existing: Vec<PersistedAvailability>,
}

#[derive(Serialize)]
struct SubmitOutput<'a> {
    phase: BatchPhase,
    summary: String,
    report: &'a SessionReport,
    pending_conflict: Option<&'a Conflict>,
    records: Vec<PersistedAvailability>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("roster_avail=info,availability_engine=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Expand { input, sort } => {
            let batch = read_batch(&input)?;
            let mut drafts = RecurrenceExpander::new(&config)
                .expand_all(&batch.template, batch.rule.as_ref())
                .context("Failed to expand template")?;
            if sort {
                sort_chronologically(&mut drafts);
            }
            println!("{}", serde_json::to_string_pretty(&drafts)?);
        }
        Command::Submit {
            input,
            on_conflict,
            consent,
        } => {
            let batch = read_batch(&input)?;
            let store = MemoryStore::with_records(batch.existing)
                .context("Invalid existing records")?;
            let mut session = BatchSession::new(store, config);
            session
                .expand(&batch.template, batch.rule.as_ref())
                .context("Failed to expand template")?;

            let mut phase = session.run().await?;
            while phase == BatchPhase::Conflicted {
                let Some(action) = on_conflict else {
                    break;
                };
                phase = if consent {
                    session.resolve_with_consent(action).await?
                } else {
                    session.resolve(action).await?
                };
                // Done here means the config stops the batch after a resolution.
                if phase == BatchPhase::Submitting {
                    phase = session.run().await?;
                }
            }

            let records = session.refresh().await?;
            let output = SubmitOutput {
                phase: session.phase(),
                summary: session.report().summary(),
                report: session.report(),
                pending_conflict: session.pending_conflict(),
                records,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn read_batch(input: &str) -> Result<BatchInput> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))?
    };
    serde_json::from_str(&text).context("Failed to parse batch input")
}
