//! Batch chat completions from the command line.
//!
//! Reads one prompt per line (`{"messages": [...], "metadata": {...}}`) and
//! writes one JSON line per prompt, in input order. Prompts that exhausted
//! their retries, or were cancelled by the batch timeout, are written as
//! `null`.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use chat_dispatch::chat::{BatchOptions, CallOptions, ChatModel};
use chat_dispatch::completion::{CallOverrides, Prompt};
use chat_dispatch::config::Config;
use chat_dispatch::dispatch::{BarProgress, CompletionResult, TracingProgress};
use chat_dispatch::error::{ChatError, DispatchError};
use chat_dispatch::format::OutputFormat;
use chat_dispatch::observability::init_observability;

#[derive(Parser)]
#[command(name = "chat-dispatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSONL file of prompts
    input: PathBuf,

    /// Write results here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML config file; environment variables prefixed CHAT_DISPATCH__ override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    concurrency: Option<usize>,

    /// Fail the batch if it has not finished after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(short, long)]
    retries: Option<u32>,

    /// raw, text or bundle
    #[arg(short, long)]
    format: Option<OutputFormat>,

    #[arg(short, long)]
    model: Option<String>,

    /// Run prompts one at a time
    #[arg(long)]
    sequential: bool,

    /// Show a progress bar on stderr
    #[arg(long)]
    progress: bool,
}

fn load_prompts(path: &Path) -> Result<Vec<Prompt>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Prompt>(line)
                .with_context(|| format!("{}:{}: invalid prompt", path.display(), i + 1))
        })
        .collect()
}

/// One JSON line per prompt, in input order
fn write_results(output: Option<&Path>, results: &[Option<CompletionResult>]) -> Result<()> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    for result in results {
        serde_json::to_writer(&mut writer, result)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let config = Config::default_config();
            config.validate().context("Set OPENAI_API_KEY or pass --config")?;
            config
        }
    };

    init_observability(&config.logging.level, &config.logging.format);

    let prompts = load_prompts(&cli.input)?;
    info!(count = prompts.len(), input = %cli.input.display(), "Loaded prompts");

    let mut model = ChatModel::from_config(&config)?;
    model = if cli.progress {
        model.with_progress(Arc::new(BarProgress::new()))
    } else {
        model.with_progress(Arc::new(TracingProgress))
    };

    let mut overrides = CallOverrides::new();
    if let Some(name) = &cli.model {
        overrides = overrides.model(name.clone());
    }
    let mut call = CallOptions::new().overrides(overrides);
    if let Some(format) = cli.format {
        call = call.output_format(format);
    }
    if let Some(retries) = cli.retries {
        call = call.num_retries(retries);
    }

    let results: Vec<Option<CompletionResult>> = if cli.sequential {
        model.chat_completions(&prompts, &call).await.into_iter().map(Some).collect()
    } else {
        let mut batch = BatchOptions::new(call);
        if let Some(limit) = cli.concurrency {
            batch = batch.concurrency_limit(limit);
        }
        if let Some(secs) = cli.timeout_secs {
            batch = batch.timeout(Duration::from_secs(secs));
        }
        match model.async_chat_completions(prompts, &batch).await {
            Ok(results) => results.into_iter().map(Some).collect(),
            Err(ChatError::Dispatch(DispatchError::BatchTimeout { completed, total, elapsed, partial })) => {
                // keep what finished; unfinished prompts are written as null
                write_results(cli.output.as_deref(), &partial)?;
                anyhow::bail!(
                    "Batch timed out after {:?}: {} of {} prompts finished",
                    elapsed,
                    completed,
                    total
                );
            }
            Err(e) => return Err(e.into()),
        }
    };

    let absent = results
        .iter()
        .filter(|r| r.as_ref().map_or(true, CompletionResult::is_absent))
        .count();
    if absent > 0 {
        warn!(absent, total = results.len(), "Some prompts produced no response");
    }

    write_results(cli.output.as_deref(), &results)?;

    let snapshot = model.metrics().snapshot();
    info!(
        attempts = snapshot.attempts,
        successes = snapshot.successes,
        abandoned = snapshot.abandoned,
        "Batch complete"
    );

    Ok(())
}
