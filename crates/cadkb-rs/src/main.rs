//! Command-line access to the operation knowledge store.

use anyhow::{Context, bail};
use cadkb_rs::{
    KnowledgeBase, KnowledgeConfig, KnowledgeTools, OperationParameters, ResetConfirmation,
    init_logging,
};
use cadkb_rs_core::{format_for_prompt, format_solutions_for_prompt};
use cadkb_rs_store::{ParamValue, SimilarityFilter};
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line options for the knowledge store CLI.
#[derive(Parser)]
#[command(name = "cadkb", version, about = "Operation knowledge store for CAD automation")]
struct Cli {
    /// Optional path to a cadkb.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Storage directory override
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one automation attempt
    Record {
        /// Operation type, e.g. modify_dimension
        operation_type: String,
        /// Parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        /// Error message; marks the operation as failed
        #[arg(long)]
        error: Option<String>,
    },
    /// Find recorded operations similar to a description
    Similar {
        query: String,
        #[arg(short = 'n', long)]
        n_results: Option<usize>,
        /// Only consider this operation type
        #[arg(long = "type")]
        operation_type: Option<String>,
        /// Only consider successful operations
        #[arg(long, conflicts_with = "failed_only")]
        success_only: bool,
        /// Only consider failed operations
        #[arg(long)]
        failed_only: bool,
        /// Print the prompt context block instead of JSON
        #[arg(long)]
        prompt: bool,
    },
    /// Store a known fix for an error message
    AddSolution {
        /// Error message the fix applies to
        error: String,
        /// One-line description of the fix
        solution: String,
        /// Ordered step of the fix (repeatable)
        #[arg(short, long = "step")]
        steps: Vec<String>,
        /// Context as key=value, e.g. operation=export_model (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
    },
    /// Find stored fixes for errors similar to this one
    Solutions {
        error: String,
        #[arg(short = 'n', long)]
        n_results: Option<usize>,
        /// Print the prompt context block instead of JSON
        #[arg(long)]
        prompt: bool,
    },
    /// Aggregate statistics over all records
    Analyze,
    /// Most recent records
    History {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        success_only: bool,
    },
    /// Write all records and error solutions to a JSON file
    Export { destination: PathBuf },
    /// Load records and error solutions from a JSON export
    Import { source: PathBuf },
    /// Embed records and error solutions stored without a vector
    Reindex,
    /// Delete every record and error solution
    Reset {
        /// Confirm the irreversible wipe
        #[arg(long)]
        yes: bool,
    },
    /// Call an assistant tool with JSON arguments, or list tools
    Tool {
        name: Option<String>,
        #[arg(default_value = "{}")]
        args: String,
    },
}

/// Entry point for the knowledge store CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    info!(
        "starting cadkb (config_set={}, data_dir_set={})",
        cli.config.is_some(),
        cli.data_dir.is_some()
    );

    let config = load_config(&cli)?;
    let kb = match cli.data_dir.as_ref() {
        Some(dir) => KnowledgeBase::open_at(&config, dir),
        None => KnowledgeBase::open(&config),
    }
    .context("failed to open knowledge base")?;

    let outcome = run(&kb, cli.command).await;
    kb.close().await.context("failed to close knowledge base")?;
    outcome
}

fn load_config(cli: &Cli) -> anyhow::Result<KnowledgeConfig> {
    if let Some(path) = cli.config.as_ref() {
        return KnowledgeConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let layered = KnowledgeConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

async fn run(kb: &KnowledgeBase, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Record {
            operation_type,
            params,
            error,
        } => {
            let parameters = params.into_iter().collect::<OperationParameters>();
            let success = error.is_none();
            let record = kb
                .record(&operation_type, parameters, success, error)
                .await
                .context("failed to record operation")?;
            print_json(&record)
        }
        Command::Similar {
            query,
            n_results,
            operation_type,
            success_only,
            failed_only,
            prompt,
        } => {
            let filter = SimilarityFilter {
                operation_type,
                success: match (success_only, failed_only) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            let n_results = n_results.unwrap_or(kb.options().default_results);
            let similar = kb
                .find_similar_filtered(&query, n_results, &filter)
                .await
                .context("similarity query failed")?;
            if prompt {
                println!("{}", format_for_prompt(&similar));
                Ok(())
            } else {
                print_json(&similar)
            }
        }
        Command::AddSolution {
            error,
            solution,
            steps,
            params,
        } => {
            let context = params.into_iter().collect::<OperationParameters>();
            let entry = kb
                .record_error_solution(&error, context, &solution, steps)
                .await
                .context("failed to record error solution")?;
            print_json(&entry)
        }
        Command::Solutions {
            error,
            n_results,
            prompt,
        } => {
            let n_results = n_results.unwrap_or(kb.options().default_results);
            let solutions = kb
                .find_error_solutions(&error, n_results)
                .await
                .context("solution query failed")?;
            if prompt {
                println!("{}", format_solutions_for_prompt(&solutions));
                Ok(())
            } else {
                print_json(&solutions)
            }
        }
        Command::Analyze => print_json(&kb.analyze_patterns().await),
        Command::History {
            limit,
            success_only,
        } => {
            let records = kb
                .operation_history(limit, success_only)
                .await
                .context("failed to read history")?;
            print_json(&records)
        }
        Command::Export { destination } => {
            let summary = kb
                .export_knowledge(&destination)
                .await
                .with_context(|| format!("failed to export to {}", destination.display()))?;
            print_json(&summary)
        }
        Command::Import { source } => {
            let summary = kb
                .import_knowledge(&source)
                .await
                .with_context(|| format!("failed to import {}", source.display()))?;
            print_json(&summary)
        }
        Command::Reindex => {
            let updated = kb.reindex().await.context("reindex failed")?;
            println!("reindexed {updated} entries");
            Ok(())
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("reset deletes every record and error solution; pass --yes to confirm");
            }
            let removed = kb
                .reset(ResetConfirmation::DeleteAllRecords)
                .await
                .context("reset failed")?;
            println!("removed {removed} entries");
            Ok(())
        }
        Command::Tool { name, args } => {
            let tools = KnowledgeTools::new(kb.clone());
            let Some(name) = name else {
                return print_json(&tools.specs());
            };
            let args = serde_json::from_str(&args).context("tool arguments must be JSON")?;
            print_json(&tools.call(&name, args).await)
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `key=value`, typing the value as bool, integer, float or text.
fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    let value = if let Ok(flag) = value.parse::<bool>() {
        ParamValue::Bool(flag)
    } else if let Ok(int) = value.parse::<i64>() {
        ParamValue::Integer(int)
    } else if let Ok(float) = value.parse::<f64>() {
        ParamValue::Float(float)
    } else {
        ParamValue::Text(value.to_string())
    };
    Ok((key.to_string(), value))
}
