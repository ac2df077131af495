//! CLI entry point: run a pipeline specification against a dataset.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::process::ExitCode;
use tabml_learning::{
    Experiment, LearningError, Metrics, ModelOutcome, PipelineSpec, RunConfig, RunReport,
};
use tabml_processing::load_dataset;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(
    name = "tabml",
    version,
    about = "Build, search and evaluate tabular modeling pipelines from a JSON specification",
    long_about = "Reads a pipeline specification (target, per-feature imputation, feature \
                  reduction, candidate models with hyperparameter grids) and a dataset, then \
                  grid-searches every selected model and reports test metrics.\n\n\
                  EXAMPLES:\n  \
                  tabml spec.json housing.csv\n  \
                  tabml spec.json housing.parquet --seed 7 --cv-folds 5\n  \
                  tabml spec.json housing.csv --json | jq '.models[].metrics'"
)]
struct Args {
    /// Path to the JSON pipeline specification
    spec: String,

    /// Path to the dataset (.csv or .parquet)
    data: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print the run report as JSON on stdout instead of a summary
    ///
    /// Disables all logging so stdout only carries the report.
    #[arg(long)]
    json: bool,

    /// Seed for the train/test split, fold shuffling and seeded strategies
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fraction of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    test_size: f64,

    /// Number of cross-validation folds
    #[arg(long, default_value_t = 3)]
    cv_folds: usize,

    /// Search threads: -1 for all cores, or a positive count
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    n_jobs: i32,
}

/// Initialize the tracing subscriber.
///
/// Logging stays off under `--json` so stdout only contains the report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, args.json);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = RunConfig::builder()
        .test_size(args.test_size)
        .cv_folds(args.cv_folds)
        .random_seed(args.seed)
        .n_jobs(args.n_jobs)
        .build()?;

    info!("Loading specification from: {}", args.spec);
    let spec = PipelineSpec::from_path(&args.spec)
        .with_context(|| format!("reading specification '{}'", args.spec))?;

    info!("Loading dataset from: {}", args.data);
    let data = load_dataset(&args.data)
        .map_err(LearningError::from)
        .with_context(|| format!("reading dataset '{}'", args.data))?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    let experiment = Experiment::builder()
        .config(config)
        .on_progress(|update| {
            if update.stage.is_terminal() {
                info!(stage = %update.stage, "{}", update.message);
            } else {
                debug!(
                    stage = %update.stage,
                    progress = update.progress,
                    "{}",
                    update.message
                );
            }
        })
        .build();
    let report = experiment.run(&spec, &data)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn report_error(err: &anyhow::Error, json_output: bool) {
    let learning = err.downcast_ref::<LearningError>();
    if json_output {
        let code = learning.map_or("ERROR", LearningError::error_code);
        let body = serde_json::json!({ "code": code, "message": format!("{err:#}") });
        println!("{body}");
        return;
    }

    match learning {
        Some(e) if e.is_configuration_error() => {
            error!(code = e.error_code(), "Configuration error: {err:#}")
        }
        _ => error!("{err:#}"),
    }
    eprintln!("Error: {err:#}");
}

/// Human-readable report.
///
/// Uses `println!` on purpose: the summary is the program's output and must
/// show regardless of the log level.
fn print_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(80));
    println!("RUN SUMMARY");
    println!("{}\n", "=".repeat(80));

    println!("  Target:       {} ({})", report.target, report.problem_type);
    println!("  Reduction:    {}", report.reduction);
    println!(
        "  Rows:         {} train / {} test",
        report.train_rows, report.test_rows
    );
    if let Some(classes) = &report.classes {
        println!("  Classes:      {}", classes.join(", "));
    }
    println!("  Duration:     {:.2}s", report.duration_seconds);
    println!();

    if report.models.is_empty() {
        println!("  No models were selected.");
        return;
    }

    println!(
        "{:<22} {:<9} {:<36} {:<10}",
        "Model", "Status", "Test metrics", "CV score"
    );
    println!("{}", "-".repeat(80));
    for model in &report.models {
        match &model.outcome {
            ModelOutcome::Trained {
                cv_score,
                metrics,
                best_params,
                features,
            } => {
                println!(
                    "{:<22} {:<9} {:<36} {:<10.4}",
                    model.name,
                    "trained",
                    format_metrics(metrics),
                    cv_score
                );
                if !best_params.is_empty() {
                    let params: Vec<String> =
                        best_params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    println!("{:<22} best: {}", "", params.join(", "));
                }
                println!("{:<22} features: {}", "", features.join(", "));
            }
            ModelOutcome::Skipped { reason } => {
                println!("{:<22} {:<9} {}", model.name, "skipped", reason);
            }
            ModelOutcome::Failed { code, message } => {
                println!("{:<22} {:<9} [{code}] {message}", model.name, "failed");
            }
        }
    }
    println!();
}

fn format_metrics(metrics: &Metrics) -> String {
    metrics
        .entries()
        .iter()
        .map(|(name, value)| format!("{name}={value:.4}"))
        .collect::<Vec<_>>()
        .join("  ")
}
