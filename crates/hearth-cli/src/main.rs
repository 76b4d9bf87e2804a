//! CLI binary for running and checking Hearth training pipelines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use hearth_models::ModelArtifact;
use hearth_pipeline::{PipelineExecutor, PromotionDecision};
use hearth_store::{store_from_config, tracker_from_config};
use hearth_types::PipelineConfig;

#[derive(Parser)]
#[command(name = "hearth", version, about = "Train, compare, and promote housing-price models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: ingest, validate, split, train, report drift, evaluate, promote
    Run {
        /// Path to the YAML configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Directory that relative artifact paths are resolved against
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Print every pipeline event to stdout as a JSON line
        #[arg(long)]
        events: bool,
    },

    /// Load and validate a configuration without running anything
    Check {
        /// Path to the YAML configuration
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Score one record with a saved model artifact
    Predict {
        /// Path to a model artifact written by `hearth run`
        #[arg(short, long)]
        model: PathBuf,

        /// Feature values as a JSON object, e.g. '{"rooms": 5, "ocean": "INLAND"}'
        #[arg(short, long)]
        features: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            workdir,
            events,
        } => {
            cmd_run(&config, workdir.as_deref(), events).await?;
        }
        Commands::Check { config } => {
            cmd_check(&config)?;
        }
        Commands::Predict { model, features } => {
            cmd_predict(&model, &features)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path, workdir: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = PipelineConfig::load(path)?;
    Ok(match workdir {
        Some(dir) => {
            let abs = std::fs::canonicalize(dir)?;
            config.rooted_at(&abs)
        }
        None => config,
    })
}

fn print_summary(config: &PipelineConfig) {
    println!("Experiment: {}", config.mlflow.experiment_name);
    println!("Source: {}", config.data.url);
    println!("Target: {}", config.data.target);
    println!("Test fraction: {}", config.data.test_size);
    println!("Candidates:");
    for candidate in &config.model.candidates {
        let params: Vec<String> = candidate
            .params()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("  {} {}", candidate.name(), params.join(" "));
    }
    println!("Model: {}", config.model_path().display());
    println!("Tracking: {}", config.mlflow.tracking_uri);
    println!("Production store: {}", config.s3.location());
}

fn cmd_check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path, None)?;
    print_summary(&config);
    println!("\nConfiguration is valid");
    Ok(())
}

async fn cmd_run(path: &Path, workdir: Option<&Path>, print_events: bool) -> anyhow::Result<()> {
    let config = load_config(path, workdir)?;
    print_summary(&config);

    let store = store_from_config(&config.s3)?;
    let tracker = tracker_from_config(&config.mlflow)?;
    let executor = PipelineExecutor::new(Arc::new(config), store, tracker);

    let printer = print_events.then(|| {
        let mut rx = executor.events().subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "Unprintable event"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let outcome = executor.run().await;
    drop(executor);
    if let Some(handle) = printer {
        handle.await?;
    }
    let result = outcome?;

    println!("\nPipeline completed in {} ms", result.duration_ms);
    let visited: Vec<&str> = result.visited_states.iter().map(|s| s.as_str()).collect();
    println!("States: {}", visited.join(" -> "));
    println!("Best model: {}", result.best_model);
    println!("New model R2: {:.4}", result.metrics.new_model_r2);
    match result.metrics.old_model_r2 {
        Some(old) => println!("Production model R2: {:.4}", old),
        None => println!("Production model R2: (none)"),
    }
    match result.decision {
        PromotionDecision::Promoted => {
            let version = result.pushed_version.as_deref().unwrap_or("(unversioned)");
            println!("Decision: promoted (version {version})");
        }
        PromotionDecision::Retained => println!("Decision: retained production model"),
    }
    println!("Drift report: {}", result.artifacts.drift_report.display());
    println!("Evaluation: {}", result.artifacts.evaluation.display());

    Ok(())
}

fn cmd_predict(model: &Path, features: &str) -> anyhow::Result<()> {
    let artifact = ModelArtifact::load(model)?;
    let record = record_from_json(features)?;
    let prediction = artifact.predict_record(&record);
    tracing::debug!(model = artifact.model_name(), fields = record.len(), "Scored record");
    println!("{prediction}");
    Ok(())
}

/// Flatten a JSON object into the string cells the encoder expects.
/// `null` becomes an empty (missing) cell.
fn record_from_json(source: &str) -> anyhow::Result<HashMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(source)?;
    let serde_json::Value::Object(map) = value else {
        anyhow::bail!("--features must be a JSON object of column name to value");
    };
    map.into_iter()
        .map(|(key, value)| {
            let cell = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => anyhow::bail!("feature '{key}' must be a scalar, got {other}"),
            };
            Ok((key, cell))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_flattens_scalars() {
        let record =
            record_from_json(r#"{"rooms": 5, "ocean": "INLAND", "age": null, "new": true}"#)
                .unwrap();
        assert_eq!(record["rooms"], "5");
        assert_eq!(record["ocean"], "INLAND");
        assert_eq!(record["age"], "");
        assert_eq!(record["new"], "true");
    }

    #[test]
    fn record_rejects_non_objects() {
        assert!(record_from_json("[1, 2]").is_err());
        assert!(record_from_json(r#"{"rooms": [1]}"#).is_err());
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::parse_from(["hearth", "run", "--config", "c.yaml", "--workdir", "/tmp"]);
        match cli.command {
            Commands::Run {
                config,
                workdir,
                events,
            } => {
                assert_eq!(config, PathBuf::from("c.yaml"));
                assert_eq!(workdir, Some(PathBuf::from("/tmp")));
                assert!(!events);
            }
            _ => panic!("expected run"),
        }
    }
}
