//! CLI command definitions for insight_forge.
//!
//! Two commands: `run` executes the full pipeline against a metrics snapshot
//! and writes the report artifacts; `plan` prints the task plan a query would
//! produce without running the rest of the pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::llm::HttpInvoker;
use crate::metrics::SnapshotFile;
use crate::pipeline::{Coordinator, PipelineConfig};
use crate::stages::PlannerStage;

/// Agentic marketing-analytics pipeline.
#[derive(Parser)]
#[command(name = "insight_forge")]
#[command(about = "Analyze ad performance snapshots into hypotheses, evaluations and creatives")]
#[command(version)]
#[command(
    long_about = "insight_forge runs an analyst pipeline over a precomputed metrics snapshot:\n\
                  plan, summarize, hypothesize, evaluate and propose new creatives, then write\n\
                  report.md, insights.json and creatives.json.\n\n\
                  Example usage:\n  insight_forge run \"Analyze ROAS drop in the last 7 days\" --snapshot snapshot.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline for a query and write report artifacts.
    Run(RunArgs),

    /// Print the task plan for a query without running the pipeline.
    Plan(PlanArgs),
}

/// Arguments for `insight_forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The analysis query, e.g. "Analyze ROAS drop in the last 7 days".
    pub query: String,

    /// Path to the metrics snapshot JSON file.
    #[arg(short, long, env = "INSIGHT_FORGE_SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Output directory for report artifacts.
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Optional YAML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable the model path (requires INSIGHT_FORGE_API_KEY).
    #[arg(long)]
    pub llm: bool,

    /// Model name override for model-backed stages.
    #[arg(short, long)]
    pub model: Option<String>,
}

/// Arguments for `insight_forge plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// The analysis query to decompose.
    pub query: String,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI to its command handler.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Plan(args) => print_plan(args).await,
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides();

    if let Some(out_dir) = args.out_dir {
        config.out_dir = out_dir;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    config.llm_enabled = args.llm;
    config.validate()?;

    let provider = SnapshotFile::new(&args.snapshot);
    let coordinator = if config.llm_enabled {
        let invoker = HttpInvoker::from_env()?;
        Coordinator::with_invoker(config, Arc::new(invoker))
    } else {
        Coordinator::new(config)
    };

    let run = coordinator.run(&args.query, &provider).await?;
    info!(
        run_id = %run.run_id,
        hypotheses = run.stats.hypotheses,
        accepted = run.stats.accepted,
        needs_review = run.stats.needs_review,
        rejected = run.stats.rejected,
        ideas = run.stats.ideas,
        "run complete"
    );
    println!("Report written to {}", run.paths.report_md.display());
    Ok(())
}

async fn print_plan(args: PlanArgs) -> anyhow::Result<()> {
    let tasks = PlannerStage::offline().decompose(&args.query).await?;
    for task in &tasks {
        println!(
            "{:<4} {:<24} [{}] inputs: {}",
            task.id,
            task.title,
            task.priority,
            if task.required_inputs.is_empty() {
                "-".to_string()
            } else {
                task.required_inputs.join(", ")
            }
        );
    }
    Ok(())
}
