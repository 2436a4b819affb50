// Copyright 2025 CineMetric Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CineMetric CLI
//!
//! Command-line interface for persona-based conversation evaluation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cinemetric_core::{
    Conversation, EvalStatus, EvaluationResult, MetricCatalog, PersonaRegistry, Settings, Turn,
};
use cinemetric_evals::{GroqClient, Orchestrator};
use cinemetric_storage::{ResultFilter, ResultLog, ResultStore};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cinemetric")]
#[command(about = "CineMetric - persona-based conversation evaluation", long_about = None)]
struct Cli {
    /// Result log directory (overrides CINEMETRIC_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available personas
    Personas {
        /// Merge additional personas from a JSON file before listing
        #[arg(long)]
        import: Option<PathBuf>,
    },

    /// List available metrics
    Metrics,

    /// Evaluate a conversation
    Evaluate {
        /// Persona id to evaluate with (repeatable; defaults to all)
        #[arg(short, long = "persona")]
        personas: Vec<String>,

        /// Metric id to score (repeatable; defaults to all)
        #[arg(short, long = "metric")]
        metrics: Vec<String>,

        /// Read the conversation from a file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Merge additional personas from a JSON file
        #[arg(long)]
        import: Option<PathBuf>,

        /// Do not persist results to the result log
        #[arg(long)]
        no_store: bool,
    },

    /// Stored result commands
    Results {
        #[command(subcommand)]
        command: ResultCommands,
    },
}

#[derive(Subcommand)]
enum ResultCommands {
    /// List stored results
    List {
        /// Filter by persona id
        #[arg(long)]
        persona: Option<String>,

        /// Filter by requested metric id
        #[arg(long)]
        metric: Option<String>,

        /// Show at most this many results, newest last
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show one stored result by id
    Show {
        /// Result id
        id: String,
    },

    /// Aggregate statistics over stored results
    Stats,

    /// Rewrite the result log dropping corrupt entries
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let data_dir = cli.data_dir.clone();
    let json = cli.json;

    match cli.command {
        Commands::Personas { import } => {
            let mut registry = PersonaRegistry::builtin();
            if let Some(path) = import {
                import_personas(&mut registry, &path)?;
            }
            if json {
                let personas = registry.all();
                println!("{}", serde_json::to_string_pretty(&personas)?);
            } else {
                for persona in registry.all() {
                    println!("{}  {}", persona.id, persona.name);
                    println!("    {}", persona.description);
                }
            }
        }

        Commands::Metrics => {
            let catalog = MetricCatalog::builtin();
            if json {
                let metrics = catalog.all();
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                for metric in catalog.all() {
                    println!("{}  {} ({})", metric.id, metric.name, metric.scale.describe());
                    println!("    {}", metric.rubric);
                }
            }
        }

        Commands::Evaluate {
            personas,
            metrics,
            file,
            import,
            no_store,
        } => {
            evaluate(data_dir, json, personas, metrics, file, import, no_store).await?;
        }

        Commands::Results { command } => {
            let store = open_store(data_dir)?;
            handle_result_command(command, &store, json)?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn evaluate(
    data_dir: Option<PathBuf>,
    json: bool,
    persona_ids: Vec<String>,
    metric_ids: Vec<String>,
    file: Option<PathBuf>,
    import: Option<PathBuf>,
    no_store: bool,
) -> Result<()> {
    let mut settings = Settings::from_env().context("Failed to load settings")?;
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }

    let mut registry = PersonaRegistry::builtin();
    if let Some(path) = import {
        import_personas(&mut registry, &path)?;
    }
    let catalog = MetricCatalog::builtin();

    let persona_ids = if persona_ids.is_empty() {
        registry.all().iter().map(|p| p.id.clone()).collect()
    } else {
        persona_ids
    };
    let metric_ids = if metric_ids.is_empty() {
        catalog.all().iter().map(|m| m.id.clone()).collect()
    } else {
        metric_ids
    };

    let conversation = read_conversation(file)?;
    if conversation.is_empty() {
        bail!("Conversation is empty; provide text on stdin or with --file");
    }
    info!(
        turns = conversation.len(),
        personas = persona_ids.len(),
        metrics = metric_ids.len(),
        "starting evaluation"
    );

    let client = Arc::new(GroqClient::from_settings(&settings));
    let mut orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(catalog), client)
        .with_retry(settings.retry.clone());
    if !no_store {
        let log = ResultLog::open(&settings.data_dir).context("Failed to open result log")?;
        orchestrator = orchestrator.with_store(Arc::new(log));
    }

    let outcomes = orchestrator
        .evaluate_many(&conversation, &persona_ids, &metric_ids)
        .await;

    if json {
        let report: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|(persona, outcome)| match outcome {
                Ok(result) => serde_json::json!({ "persona": persona, "result": result }),
                Err(e) => serde_json::json!({
                    "persona": persona,
                    "error": { "kind": e.kind(), "message": e.to_string() },
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (persona, outcome) in &outcomes {
            match outcome {
                Ok(result) => print_result(persona, result),
                Err(e) => println!("✗ {}: {}", persona, e),
            }
        }
    }

    if outcomes.iter().all(|(_, o)| o.is_err()) {
        bail!("All evaluations failed");
    }
    Ok(())
}

fn print_result(persona: &str, result: &EvaluationResult) {
    let marker = match result.status {
        EvalStatus::Success => "✓",
        _ => "~",
    };
    println!(
        "{} {} ({}, {} attempt{})",
        marker,
        persona,
        result.model,
        result.attempts,
        if result.attempts == 1 { "" } else { "s" }
    );
    for metric in &result.results {
        println!("    {}: {}", metric.metric_id, metric.score);
        if !metric.justification.is_empty() {
            println!("        {}", metric.justification);
        }
    }
    for failure in &result.failures {
        println!("    {}: no score ({})", failure.metric_id, failure.failure.describe());
    }
    println!("    id: {}", result.id);
}

fn handle_result_command(
    command: ResultCommands,
    store: &ResultLog,
    json: bool,
) -> Result<()> {
    match command {
        ResultCommands::List {
            persona,
            metric,
            limit,
        } => {
            let filter = ResultFilter {
                persona_id: persona,
                metric_id: metric,
                ..Default::default()
            };
            let mut results = store.list(&filter)?;
            if results.len() > limit {
                results = results.split_off(results.len() - limit);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No stored results match");
            } else {
                for result in &results {
                    let scores = result
                        .results
                        .iter()
                        .map(|r| format!("{}={}", r.metric_id, r.score))
                        .collect::<Vec<_>>()
                        .join(" ");
                    println!(
                        "{}  {}  {}  {}",
                        result.id,
                        result.created_at.format("%Y-%m-%d %H:%M:%S"),
                        result.persona_id,
                        scores
                    );
                }
            }
        }

        ResultCommands::Show { id } => {
            let id: Uuid = id.parse().context("Invalid result id")?;
            match store.get(id)? {
                Some(result) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&result)?);
                    } else {
                        print_result(&result.persona_id, &result);
                    }
                }
                None => bail!("No result with id {id}"),
            }
        }

        ResultCommands::Stats => {
            let stats = store.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Results:          {}", stats.total_results);
                println!("  successes:      {}", stats.successes);
                println!("  partial:        {}", stats.partial_failures);
                println!("Metric scores:    {}", stats.total_metric_scores);
            }
        }

        ResultCommands::Compact => {
            store.compact()?;
            println!("✓ Result log compacted");
        }
    }
    Ok(())
}

fn open_store(data_dir: Option<PathBuf>) -> Result<ResultLog> {
    let data_dir = data_dir.unwrap_or_else(|| {
        std::env::var(cinemetric_core::config::DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./cinemetric-data"))
    });
    ResultLog::open(&data_dir).context("Failed to open result log")
}

fn import_personas(registry: &mut PersonaRegistry, path: &PathBuf) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read persona file {}", path.display()))?;
    let imported = registry
        .import_json(&json)
        .context("Failed to import personas")?;
    info!(imported, file = %path.display(), "imported personas");
    Ok(())
}

/// Read conversation text from a file or stdin. JSON input is decoded as
/// structured turns, input with speaker prefixes is parsed as a
/// transcript, and anything else becomes a single user turn.
fn read_conversation(file: Option<PathBuf>) -> Result<Conversation> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read conversation file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read conversation from stdin")?;
            buffer
        }
    };
    parse_conversation(&text)
}

fn parse_conversation(text: &str) -> Result<Conversation> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Conversation>(trimmed)
            .context("Failed to parse JSON conversation");
    }
    if trimmed.starts_with('[') {
        let turns: Vec<Turn> =
            serde_json::from_str(trimmed).context("Failed to parse JSON turns")?;
        return Ok(Conversation::new(turns));
    }
    if looks_like_transcript(trimmed) {
        Ok(Conversation::from_transcript(trimmed))
    } else {
        Ok(Conversation::from_plain_text(trimmed))
    }
}

fn looks_like_transcript(text: &str) -> bool {
    text.lines().any(|line| {
        line.split_once(':').is_some_and(|(speaker, _)| {
            matches!(
                speaker.trim().to_ascii_lowercase().as_str(),
                "user" | "human" | "customer" | "persona" | "assistant" | "agent" | "bot"
            )
        })
    })
}
